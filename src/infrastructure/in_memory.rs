use crate::domain::invoice::{
    CreateInvoiceRequest, FelInvoice, FelSubmission, InvoiceStatus, PaymentRequest,
    ReceiptDocument, ReceiptRequest, StatusResponse,
};
use crate::domain::money::Money;
use crate::domain::ports::{FelGateway, TokenStore};
use crate::domain::status::FelStatus;
use crate::error::{FelError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::Semaphore;

/// A thread-safe in-memory token store.
///
/// Uses `Arc<RwLock<Option<String>>>` so clones share the same token.
/// Used by the CLI, where the token comes from the environment, and in tests.
#[derive(Default, Clone)]
pub struct InMemoryTokenStore {
    token: Arc<RwLock<Option<String>>>,
}

impl InMemoryTokenStore {
    /// Creates a new, empty token store.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Arc::new(RwLock::new(Some(token.into()))),
        }
    }
}

impl TokenStore for InMemoryTokenStore {
    fn get(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set(&self, token: &str) {
        *self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(token.to_string());
    }

    fn remove(&self) {
        *self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }
}

/// A scripted, in-memory stand-in for the invoicing API.
///
/// Create and retry calls pop from one queue of submissions, status checks from
/// another. An empty status queue keeps answering `processing`. Payments are
/// applied to the invoices registered with [`ScriptedFelGateway::with_invoice`].
#[derive(Default, Clone)]
pub struct ScriptedFelGateway {
    script: Arc<Mutex<Script>>,
    status_gate: Option<Arc<Semaphore>>,
}

#[derive(Default)]
struct Script {
    submissions: VecDeque<Result<FelSubmission>>,
    statuses: VecDeque<Result<StatusResponse>>,
    receipts: VecDeque<Result<ReceiptDocument>>,
    invoices: HashMap<i64, FelInvoice>,
    certifiers: Vec<String>,
    retries: Vec<(i64, bool)>,
    payments: Vec<PaymentRequest>,
    status_checks: u32,
}

impl ScriptedFelGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Status checks wait for a permit from `gate` before answering.
    pub fn with_status_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.status_gate = Some(gate);
        self
    }

    pub fn with_invoice(self, invoice: FelInvoice) -> Self {
        self.lock().invoices.insert(invoice.id, invoice);
        self
    }

    pub fn push_submission(&self, submission: Result<FelSubmission>) {
        self.lock().submissions.push_back(submission);
    }

    pub fn push_status(&self, status: Result<StatusResponse>) {
        self.lock().statuses.push_back(status);
    }

    pub fn push_receipt(&self, receipt: Result<ReceiptDocument>) {
        self.lock().receipts.push_back(receipt);
    }

    pub fn status_checks(&self) -> u32 {
        self.lock().status_checks
    }

    pub fn certifiers(&self) -> Vec<String> {
        self.lock().certifiers.clone()
    }

    pub fn retries(&self) -> Vec<(i64, bool)> {
        self.lock().retries.clone()
    }

    pub fn payments(&self) -> Vec<PaymentRequest> {
        self.lock().payments.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_submission(&self) -> Result<FelSubmission> {
        self.lock()
            .submissions
            .pop_front()
            .unwrap_or_else(|| Err(FelError::Transport("no scripted submission".into())))
    }
}

#[async_trait]
impl FelGateway for ScriptedFelGateway {
    async fn create_invoice(
        &self,
        _request: &CreateInvoiceRequest,
        certifier: &str,
    ) -> Result<FelSubmission> {
        self.lock().certifiers.push(certifier.to_string());
        self.next_submission()
    }

    async fn retry_invoice(&self, invoice_id: i64, force: bool) -> Result<FelSubmission> {
        self.lock().retries.push((invoice_id, force));
        self.next_submission()
    }

    async fn check_status(&self, _invoice_id: i64) -> Result<StatusResponse> {
        self.lock().status_checks += 1;
        if let Some(gate) = &self.status_gate {
            gate.acquire()
                .await
                .map_err(|e| FelError::Transport(e.to_string()))?
                .forget();
        }
        self.lock().statuses.pop_front().unwrap_or_else(|| {
            Ok(StatusResponse {
                status: FelStatus::Processing,
                uuid: None,
                error_message: None,
                invoice: None,
            })
        })
    }

    async fn create_receipt(&self, _request: &ReceiptRequest) -> Result<ReceiptDocument> {
        self.lock()
            .receipts
            .pop_front()
            .unwrap_or_else(|| Err(FelError::Transport("no scripted receipt".into())))
    }

    async fn record_payment(&self, request: &PaymentRequest) -> Result<FelInvoice> {
        let mut script = self.lock();
        script.payments.push(request.clone());
        let invoice = script
            .invoices
            .get_mut(&request.invoice_id)
            .ok_or_else(|| FelError::Remote {
                status: 404,
                message: format!("invoice {} not found", request.invoice_id),
            })?;
        invoice.balance_due -= Money::new(request.amount);
        if invoice.balance_due <= Money::ZERO {
            invoice.status = InvoiceStatus::Paid;
        }
        Ok(invoice.clone())
    }

    async fn fetch_invoice(&self, invoice_id: i64) -> Result<FelInvoice> {
        self.lock()
            .invoices
            .get(&invoice_id)
            .cloned()
            .ok_or_else(|| FelError::Remote {
                status: 404,
                message: format!("invoice {invoice_id} not found"),
            })
    }
}
