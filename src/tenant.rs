//! Tenant resolution. The resolver is the only place a [`TenantNamespace`] can be built,
//! so every warehouse and source access is scoped to a registered tenant.

use std::collections::BTreeSet;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::common::constants::{normalize_code, NAMESPACE_PREFIX};
use crate::common::error::{ConfigError, SyncError};

static TENANT_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9_]+$").expect("tenant code pattern is valid"));

/// Isolated warehouse namespace of one tenant, e.g. `dwh_bank001` for `BANK001`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TenantNamespace {
    tenant_code: String,
    name: String,
}

impl TenantNamespace {
    fn for_code(tenant_code: &str) -> Self {
        Self {
            tenant_code: tenant_code.to_string(),
            name: format!("{}{}", NAMESPACE_PREFIX, tenant_code.to_lowercase()),
        }
    }

    pub fn tenant_code(&self) -> &str {
        &self.tenant_code
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for TenantNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone)]
pub struct TenantResolver {
    tenants: BTreeSet<String>,
}

impl TenantResolver {
    /// Build a resolver over the registered tenant codes.
    ///
    /// Codes are trimmed and upper-cased and must match `[A-Z0-9_]+`, which keeps the
    /// code-to-namespace mapping injective.
    pub fn new<I, S>(codes: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tenants = BTreeSet::new();
        for code in codes {
            let code = normalize_code(code.as_ref());
            if !TENANT_CODE.is_match(&code) {
                return Err(ConfigError::Invalid(format!("invalid tenant code '{}'", code)));
            }
            tenants.insert(code);
        }
        Ok(Self { tenants })
    }

    pub fn resolve(&self, tenant_id: &str) -> Result<TenantNamespace, SyncError> {
        let code = normalize_code(tenant_id);
        if !self.tenants.contains(&code) {
            debug!(tenant = %code, "Rejecting unknown tenant");
            return Err(SyncError::UnknownTenant(code));
        }
        Ok(TenantNamespace::for_code(&code))
    }

    pub fn tenant_codes(&self) -> impl Iterator<Item = &str> {
        self.tenants.iter().map(String::as_str)
    }
}
