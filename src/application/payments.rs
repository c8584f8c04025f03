use crate::domain::invoice::{FelInvoice, PaymentRequest};
use crate::domain::payment::{PaymentValidation, validate_payment};
use crate::domain::ports::FelGatewayRef;
use crate::error::{FelError, Result};
use tracing::info;

/// Records payments against invoices after checking them locally.
pub struct PaymentService {
    gateway: FelGatewayRef,
}

impl PaymentService {
    pub fn new(gateway: FelGatewayRef) -> Self {
        Self { gateway }
    }

    /// Validates the request against `invoice` and, if it passes, records it.
    ///
    /// A payment that fails validation is never sent. Returns the invoice as
    /// updated by the server, with the new balance due.
    pub async fn record_payment(
        &self,
        invoice: &FelInvoice,
        request: PaymentRequest,
    ) -> Result<FelInvoice> {
        if request.invoice_id != invoice.id {
            return Err(FelError::Validation(format!(
                "payment targets invoice {} but invoice {} was loaded",
                request.invoice_id, invoice.id
            )));
        }

        let PaymentValidation { is_valid, error } = validate_payment(
            invoice,
            request.amount,
            Some(request.payment_method),
            request.payment_date,
        );
        if !is_valid {
            return Err(FelError::Validation(error.unwrap_or_default()));
        }

        info!(
            invoice_id = invoice.id,
            amount = %request.amount,
            method = %request.payment_method,
            "recording payment"
        );
        self.gateway.record_payment(&request).await
    }

    /// Fetches the invoice and records the payment against its current balance.
    pub async fn pay(&self, request: PaymentRequest) -> Result<FelInvoice> {
        let invoice = self.gateway.fetch_invoice(request.invoice_id).await?;
        self.record_payment(&invoice, request).await
    }
}
