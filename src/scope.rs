use std::collections::BTreeMap;

pub const BRANCH_HEADER: &str = "x-branch-id";
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Tenant isolation boundary for one request.
///
/// Resolved once from the request headers and passed by reference into every
/// data-layer call. `branch_id == None` means the request runs unscoped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchScope {
    pub branch_id: Option<String>,
}

impl BranchScope {
    pub fn branch(id: impl Into<String>) -> Self {
        Self {
            branch_id: Some(id.into()),
        }
    }

    pub fn unscoped() -> Self {
        Self { branch_id: None }
    }

    /// `X-Branch-Id` wins over `X-Tenant-Id`; header names match case-insensitively.
    pub fn from_headers(headers: &BTreeMap<String, String>, default_branch: Option<&str>) -> Self {
        let lookup = |name: &str| {
            headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let branch_id = lookup(BRANCH_HEADER)
            .or_else(|| lookup(TENANT_HEADER))
            .or_else(|| default_branch.map(str::to_string));
        Self { branch_id }
    }

    pub fn is_scoped(&self) -> bool {
        self.branch_id.is_some()
    }
}
