use super::invoice::{CreateInvoiceRequest, PaymentMethod};
use super::permission::{self, GuardRequest, PermissionSet};
use super::ports::TokenStoreRef;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanySettings {
    pub name: String,
    #[serde(default)]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub fel_enabled: bool,
    #[serde(default)]
    pub default_certifier: Option<String>,
}

/// Per-user session data: token, permissions and company settings.
///
/// Populated on sign-in and dropped as a whole by [`SessionContext::clear`].
pub struct SessionContext {
    tokens: TokenStoreRef,
    permissions: Option<PermissionSet>,
    company: Option<CompanySettings>,
}

impl SessionContext {
    pub fn new(tokens: TokenStoreRef) -> Self {
        Self {
            tokens,
            permissions: None,
            company: None,
        }
    }

    pub fn sign_in(
        &mut self,
        token: &str,
        permissions: PermissionSet,
        company: Option<CompanySettings>,
    ) {
        self.tokens.set(token);
        self.permissions = Some(permissions);
        self.company = company;
        tracing::info!("session started");
    }

    pub fn sign_out(&mut self) {
        self.clear();
        tracing::info!("session closed");
    }

    /// Drops the token and every cached value. Also used when the token expires.
    pub fn clear(&mut self) {
        self.tokens.remove();
        self.permissions = None;
        self.company = None;
    }

    pub fn token(&self) -> Option<String> {
        self.tokens.get()
    }

    pub fn is_authenticated(&self) -> bool {
        self.tokens.get().is_some()
    }

    pub fn permissions(&self) -> Option<&PermissionSet> {
        self.permissions.as_ref()
    }

    pub fn company(&self) -> Option<&CompanySettings> {
        self.company.as_ref()
    }

    /// Certifier configured for the company, if any.
    pub fn certifier(&self) -> Option<&str> {
        self.company
            .as_ref()
            .filter(|c| c.fel_enabled)
            .and_then(|c| c.default_certifier.as_deref())
    }

    /// Invoice request for `order_id`, submitted through the company's certifier
    /// when one is configured.
    pub fn invoice_request(
        &self,
        order_id: i64,
        payment_method: PaymentMethod,
    ) -> CreateInvoiceRequest {
        CreateInvoiceRequest {
            certifier: self.certifier().map(str::to_owned),
            ..CreateInvoiceRequest::new(order_id, payment_method)
        }
    }

    pub fn guard(&self, request: &GuardRequest) -> bool {
        permission::evaluate(self.permissions.as_ref(), request)
    }
}
