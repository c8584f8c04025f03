use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Permission names used by the invoicing screens.
pub mod permissions {
    pub const INVOICE_CREATE: &str = "invoices.create";
    pub const INVOICE_VIEW: &str = "invoices.view";
    pub const INVOICE_CANCEL: &str = "invoices.cancel";
    pub const FEL_RETRY: &str = "invoices.fel_retry";
    pub const PAYMENT_RECORD: &str = "payments.record";
    pub const ORDER_MANAGE: &str = "orders.manage";
    pub const INVENTORY_MANAGE: &str = "inventory.manage";
    pub const USER_MANAGE: &str = "users.manage";
    pub const COMPANY_SETTINGS: &str = "company.settings";
}

/// Roles and permissions of the signed-in user, as loaded from the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    #[serde(default)]
    pub is_superuser: bool,
    #[serde(default)]
    pub roles: HashSet<String>,
    #[serde(default)]
    pub permissions: HashSet<String>,
}

impl PermissionSet {
    pub fn has_permission(&self, name: &str) -> bool {
        self.permissions.contains(name)
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.roles.contains(name)
    }
}

/// One evaluated predicate, named for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedCheck {
    pub name: String,
    pub granted: bool,
}

/// Checks requested by a guarded operation.
///
/// Built by the caller from a loaded [`PermissionSet`] and handed to [`evaluate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuardRequest {
    pub checks: Vec<NamedCheck>,
    /// AND instead of the default OR.
    pub require_all: bool,
    /// Denies non-superusers outright and stops superusers from bypassing `checks`.
    pub require_superuser: bool,
}

impl GuardRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require_all(mut self) -> Self {
        self.require_all = true;
        self
    }

    pub fn require_superuser(mut self) -> Self {
        self.require_superuser = true;
        self
    }

    pub fn check(mut self, name: impl Into<String>, granted: bool) -> Self {
        self.checks.push(NamedCheck {
            name: name.into(),
            granted,
        });
        self
    }

    pub fn permission(self, set: &PermissionSet, name: &str) -> Self {
        let granted = set.has_permission(name);
        self.check(format!("permission:{name}"), granted)
    }

    pub fn role(self, set: &PermissionSet, name: &str) -> Self {
        let granted = set.has_role(name);
        self.check(format!("role:{name}"), granted)
    }
}

/// Decides whether access is granted.
///
/// Fails closed when permissions have not been loaded yet. An empty check list
/// means no restriction was configured and grants access.
pub fn evaluate(loaded: Option<&PermissionSet>, request: &GuardRequest) -> bool {
    let Some(set) = loaded else {
        return false;
    };

    if request.require_superuser && !set.is_superuser {
        return false;
    }

    if set.is_superuser && !request.require_superuser {
        return true;
    }

    if request.checks.is_empty() {
        return true;
    }

    let granted = if request.require_all {
        request.checks.iter().all(|c| c.granted)
    } else {
        request.checks.iter().any(|c| c.granted)
    };

    if !granted {
        tracing::debug!(
            denied = ?request
                .checks
                .iter()
                .filter(|c| !c.granted)
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>(),
            "permission guard denied access"
        );
    }

    granted
}
