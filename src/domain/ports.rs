use super::invoice::{
    CreateInvoiceRequest, FelInvoice, FelSubmission, PaymentRequest, ReceiptDocument,
    ReceiptRequest, StatusResponse,
};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Remote invoicing API.
#[async_trait]
pub trait FelGateway: Send + Sync {
    async fn create_invoice(
        &self,
        request: &CreateInvoiceRequest,
        certifier: &str,
    ) -> Result<FelSubmission>;
    async fn retry_invoice(&self, invoice_id: i64, force: bool) -> Result<FelSubmission>;
    async fn check_status(&self, invoice_id: i64) -> Result<StatusResponse>;
    async fn create_receipt(&self, request: &ReceiptRequest) -> Result<ReceiptDocument>;
    async fn record_payment(&self, request: &PaymentRequest) -> Result<FelInvoice>;
    async fn fetch_invoice(&self, invoice_id: i64) -> Result<FelInvoice>;
}

/// Persistence for the API token (cookie, keyring, file...).
pub trait TokenStore: Send + Sync {
    fn get(&self) -> Option<String>;
    fn set(&self, token: &str);
    fn remove(&self);
}

pub type FelGatewayRef = Arc<dyn FelGateway>;
pub type TokenStoreRef = Arc<dyn TokenStore>;
