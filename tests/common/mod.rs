#![allow(dead_code)]

use fel_client::config::ProcessingConfig;
use fel_client::domain::invoice::{
    ClientSummary, FelInvoice, FelRecord, FelSubmission, InvoiceStatus, StatusResponse,
};
use fel_client::domain::money::Money;
use fel_client::domain::status::FelStatus;
use rust_decimal::Decimal;
use std::time::Duration;

pub fn invoice(id: i64, order_id: i64, balance_due: Decimal) -> FelInvoice {
    FelInvoice {
        id,
        invoice_number: format!("FEL-{id:06}"),
        order_id,
        total: Money::new(balance_due),
        client: ClientSummary {
            name: "Distribuidora La Ceiba".to_string(),
            tax_id: Some("4521378-1".to_string()),
        },
        fel: FelRecord::default(),
        balance_due: Money::new(balance_due),
        status: InvoiceStatus::Issued,
    }
}

pub fn submission(invoice: FelInvoice, raw_status: &str, uuid: Option<&str>) -> FelSubmission {
    FelSubmission {
        invoice,
        status: FelStatus::from(raw_status),
        fel_uuid: uuid.map(str::to_string),
        error_message: None,
        can_retry: None,
    }
}

pub fn status(raw_status: &str, uuid: Option<&str>) -> StatusResponse {
    StatusResponse {
        status: FelStatus::from(raw_status),
        uuid: uuid.map(str::to_string),
        error_message: None,
        invoice: None,
    }
}

pub fn config(max_attempts: u32) -> ProcessingConfig {
    ProcessingConfig {
        poll_interval: Duration::from_secs(3),
        max_attempts,
        display_timeout: Duration::from_secs(60),
        ..Default::default()
    }
}
