//! In-memory hierarchy/org implementations for tests and local runs.

use super::{AgentAncestor, HierarchyError, HierarchyResolver, OrgDirectory};
use crate::domain::UserId;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

/// Mock referral tree built from explicit parent edges.
#[derive(Debug, Clone, Default)]
pub struct MockHierarchy {
    parent_of: HashMap<UserId, UserId>,
    agents: HashSet<UserId>,
}

impl MockHierarchy {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parent edge: `child` reports to `parent`.
    pub fn with_parent(mut self, child: UserId, parent: UserId) -> Self {
        self.parent_of.insert(child, parent);
        self
    }

    /// Mark a user as a referring agent.
    pub fn with_agent(mut self, user_id: UserId) -> Self {
        self.agents.insert(user_id);
        self
    }
}

#[async_trait]
impl HierarchyResolver for MockHierarchy {
    async fn find_parent_id(&self, user_id: UserId) -> Result<Option<UserId>, HierarchyError> {
        Ok(self.parent_of.get(&user_id).copied())
    }

    async fn find_descendant_ids(&self, user_id: UserId) -> Result<Vec<UserId>, HierarchyError> {
        let mut found = Vec::new();
        let mut frontier = vec![user_id];
        while let Some(current) = frontier.pop() {
            for (child, parent) in &self.parent_of {
                if *parent == current {
                    found.push(*child);
                    frontier.push(*child);
                }
            }
        }
        found.sort();
        Ok(found)
    }

    async fn agent_ancestors(
        &self,
        user_id: UserId,
        max_levels: u8,
    ) -> Result<Vec<AgentAncestor>, HierarchyError> {
        let mut ancestors = Vec::new();
        let mut current = user_id;
        let mut level: u8 = 0;
        while level < max_levels {
            match self.parent_of.get(&current) {
                Some(parent) => {
                    current = *parent;
                    if self.agents.contains(parent) {
                        level += 1;
                        ancestors.push(AgentAncestor {
                            user_id: *parent,
                            level,
                        });
                    }
                }
                None => break,
            }
        }
        Ok(ancestors)
    }
}

/// Mock org directory mapping dependent accounts to their main account.
#[derive(Debug, Clone, Default)]
pub struct MockOrgDirectory {
    root_of: HashMap<UserId, UserId>,
    agents: HashSet<UserId>,
}

impl MockOrgDirectory {
    /// Create a directory where every user is its own root.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `sub` as a dependent account of `main`.
    pub fn with_sub_account(mut self, sub: UserId, main: UserId) -> Self {
        self.root_of.insert(sub, main);
        self
    }

    /// Mark a user as an agent.
    pub fn with_agent(mut self, user_id: UserId) -> Self {
        self.agents.insert(user_id);
        self
    }
}

#[async_trait]
impl OrgDirectory for MockOrgDirectory {
    async fn root_account_id(&self, user_id: UserId) -> Result<UserId, HierarchyError> {
        Ok(self.root_of.get(&user_id).copied().unwrap_or(user_id))
    }

    async fn is_agent(&self, user_id: UserId) -> Result<bool, HierarchyError> {
        Ok(self.agents.contains(&user_id))
    }
}
