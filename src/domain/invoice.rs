use super::money::Money;
use super::status::FelStatus;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    #[default]
    Draft,
    Issued,
    Paid,
    Overdue,
    Cancelled,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    CreditCard,
    DebitCard,
    BankTransfer,
    Check,
    Other,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::DebitCard => "debit_card",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Check => "check",
            PaymentMethod::Other => "other",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(PaymentMethod::Cash),
            "credit_card" => Ok(PaymentMethod::CreditCard),
            "debit_card" => Ok(PaymentMethod::DebitCard),
            "bank_transfer" => Ok(PaymentMethod::BankTransfer),
            "check" => Ok(PaymentMethod::Check),
            "other" => Ok(PaymentMethod::Other),
            other => Err(format!("unknown payment method: {other}")),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Default)]
pub struct ClientSummary {
    pub name: String,
    #[serde(default)]
    pub tax_id: Option<String>,
}

/// FEL sub-record of an invoice, as last reported by the server.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Default)]
pub struct FelRecord {
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub status: FelStatus,
    #[serde(default)]
    pub authorized_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub attempt_count: u32,
    #[serde(default)]
    pub max_attempts: u32,
    #[serde(default = "default_requires_fel")]
    pub requires_fel: bool,
}

fn default_requires_fel() -> bool {
    true
}

/// Snapshot of an invoice owned by the remote system.
///
/// Never mutated locally; a newer server response replaces it whole.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct FelInvoice {
    pub id: i64,
    pub invoice_number: String,
    pub order_id: i64,
    pub total: Money,
    pub client: ClientSummary,
    #[serde(default)]
    pub fel: FelRecord,
    pub balance_due: Money,
    #[serde(default)]
    pub status: InvoiceStatus,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct CreateInvoiceRequest {
    pub order_id: i64,
    pub payment_method: PaymentMethod,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    /// Certifier that submits the document; the configured default when `None`.
    #[serde(skip)]
    pub certifier: Option<String>,
}

impl CreateInvoiceRequest {
    pub fn new(order_id: i64, payment_method: PaymentMethod) -> Self {
        Self {
            order_id,
            payment_method,
            due_date: None,
            notes: None,
            certifier: None,
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct ReceiptRequest {
    pub order_id: i64,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    #[serde(skip)]
    pub invoice_id: i64,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub payment_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl PaymentRequest {
    /// Fills a missing payment date with today's local date.
    pub fn dated_today_if_missing(mut self) -> Self {
        self.payment_date
            .get_or_insert_with(|| chrono::Local::now().date_naive());
        self
    }
}

/// Response of the create and retry endpoints.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct FelSubmission {
    pub invoice: FelInvoice,
    pub status: FelStatus,
    #[serde(default)]
    pub fel_uuid: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    /// Retry eligibility as judged by the server.
    #[serde(default)]
    pub can_retry: Option<bool>,
}

/// Response of the status endpoint.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct StatusResponse {
    pub status: FelStatus,
    #[serde(default, alias = "fel_uuid")]
    pub uuid: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub invoice: Option<FelInvoice>,
}

/// A binary document returned by the receipt endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptDocument {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ReceiptDocument {
    /// Writes the document into `dir` under its file name and returns the full path.
    pub fn save_to(&self, dir: &Path) -> std::io::Result<PathBuf> {
        let path = dir.join(&self.file_name);
        std::fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}
