//! Explicit tenant scoping for store queries.
//!
//! Every repository function touching brand-owned rows takes a
//! [`TenantScope`] parameter; there is no implicit request-global tenant
//! state. Forgetting the scope is a compile error, not a data leak.
//!
//! Activation rows carry no `brand_id` column; scoping them traverses the
//! owning license (see the joins in `db::queries`).

/// The tenant a store operation acts on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantScope {
    /// Constrain every query to rows owned by this brand.
    Brand(String),
    /// No tenant constraint. Reserved for the super-admin role and
    /// maintenance jobs (expiry sweep, CLI commands).
    All,
}

impl TenantScope {
    pub fn brand(id: impl Into<String>) -> Self {
        TenantScope::Brand(id.into())
    }

    /// Parameter value for `(?n IS NULL OR brand_id = ?n)` SQL filters.
    pub fn brand_param(&self) -> Option<&str> {
        match self {
            TenantScope::Brand(id) => Some(id.as_str()),
            TenantScope::All => None,
        }
    }

    /// Whether a row owned by `brand_id` is visible under this scope.
    pub fn allows(&self, brand_id: &str) -> bool {
        match self {
            TenantScope::Brand(id) => id == brand_id,
            TenantScope::All => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brand_scope_filters() {
        let scope = TenantScope::brand("b-1");
        assert_eq!(scope.brand_param(), Some("b-1"));
        assert!(scope.allows("b-1"));
        assert!(!scope.allows("b-2"));
    }

    #[test]
    fn all_scope_is_unconstrained() {
        assert_eq!(TenantScope::All.brand_param(), None);
        assert!(TenantScope::All.allows("anything"));
    }
}
