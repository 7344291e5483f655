//! Domain primitives: UserId, BillNo, ResourceId.

use serde::{Deserialize, Serialize};

/// Platform user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl UserId {
    /// Create a UserId from its numeric value.
    pub fn new(id: i64) -> Self {
        UserId(id)
    }

    /// Get the underlying numeric id.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Globally unique billing record number.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BillNo(pub String);

impl BillNo {
    /// Create a BillNo from a string.
    pub fn new(no: String) -> Self {
        BillNo(no)
    }

    /// Generate a fresh unique bill number.
    pub fn generate() -> Self {
        BillNo(format!("BILL-{}", uuid::Uuid::new_v4().simple()))
    }

    /// Get the bill number as a string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BillNo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a billable resource (e.g. a marketing instance).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId(pub String);

impl ResourceId {
    /// Create a ResourceId from a string.
    pub fn new(id: String) -> Self {
        ResourceId(id)
    }

    /// Get the resource id as a string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
