//! Tenant scope
//!
//! Every catalog read and every unit of work takes a [`TenantScope`], so tenant
//! isolation is an explicit parameter at each call site instead of an implicit
//! query filter.

use std::fmt;
use uuid::Uuid;

/// Identifies the tenant an operation runs on behalf of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TenantScope(Uuid);

impl TenantScope {
    pub fn new(tenant_id: Uuid) -> Self {
        Self(tenant_id)
    }

    pub fn tenant_id(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for TenantScope {
    fn from(tenant_id: Uuid) -> Self {
        Self(tenant_id)
    }
}

impl fmt::Display for TenantScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
