use serde::Serialize;

use crate::models::Role;

/// Who is calling, resolved once per request by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActorScope {
    pub role: Role,
    pub home_branch: String,
}

impl ActorScope {
    pub fn new(role: Role, home_branch: impl Into<String>) -> Self {
        Self {
            role,
            home_branch: home_branch.into(),
        }
    }

    pub fn is_master(&self) -> bool {
        self.role == Role::MasterAdmin
    }

    /// Queue work: any role at its home branch, masters everywhere.
    pub fn may_act_on(&self, branch: &str) -> bool {
        self.is_master() || self.home_branch == branch
    }

    /// Catalog and identity work: branch admins at home, masters everywhere.
    pub fn may_administer(&self, branch: &str) -> bool {
        match self.role {
            Role::MasterAdmin => true,
            Role::BranchAdmin => self.home_branch == branch,
            Role::Staff => false,
        }
    }
}
