//! Collaborator seams: referral-hierarchy and org-identity lookups.
//!
//! The ledger core never walks the org tree itself; it consumes these traits.
//! Implementations are allowed to serve from an eventually-consistent cache,
//! since referral relationships change far less often than billing events.

use crate::domain::UserId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod mock;

pub use mock::{MockHierarchy, MockOrgDirectory};

/// An ancestor agent found on a buyer's referral chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentAncestor {
    pub user_id: UserId,
    /// Referral-chain distance, 1 = nearest ancestor agent.
    pub level: u8,
}

/// Read-only "who reports to whom" oracle over the referral tree.
#[async_trait]
pub trait HierarchyResolver: Send + Sync + fmt::Debug {
    /// Direct parent of a user, if any.
    async fn find_parent_id(&self, user_id: UserId) -> Result<Option<UserId>, HierarchyError>;

    /// All descendants of a user (any depth).
    async fn find_descendant_ids(&self, user_id: UserId) -> Result<Vec<UserId>, HierarchyError>;

    /// Ancestor agents of a buyer by referral level, nearest first, at most
    /// `max_levels` entries. Non-agent ancestors do not consume a level.
    async fn agent_ancestors(
        &self,
        user_id: UserId,
        max_levels: u8,
    ) -> Result<Vec<AgentAncestor>, HierarchyError>;
}

/// Identity/org lookups: dependent ("sub") accounts and agent tiers.
#[async_trait]
pub trait OrgDirectory: Send + Sync + fmt::Debug {
    /// The account that actually holds balance for `user_id`.
    ///
    /// Returns `user_id` itself for main accounts; for a dependent account,
    /// returns its root ("main") account. Dependent accounts never hold their
    /// own balance.
    async fn root_account_id(&self, user_id: UserId) -> Result<UserId, HierarchyError>;

    /// Whether the user is a referring agent.
    async fn is_agent(&self, user_id: UserId) -> Result<bool, HierarchyError>;
}

/// Error type for hierarchy/org collaborator calls.
#[derive(Debug, Clone, Error)]
pub enum HierarchyError {
    #[error("Hierarchy service unavailable: {0}")]
    Unavailable(String),
    #[error("Unknown user: {0}")]
    UnknownUser(UserId),
    #[error("Hierarchy error: {0}")]
    Other(String),
}
