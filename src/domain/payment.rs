use super::invoice::{FelInvoice, PaymentMethod};
use chrono::{Local, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;

/// Outcome of a local payment check. `error` is set only when `is_valid` is false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentValidation {
    pub is_valid: bool,
    pub error: Option<String>,
}

impl PaymentValidation {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            error: None,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            error: Some(message.into()),
        }
    }
}

/// Validates a payment against the invoice's current balance, using today's local date.
pub fn validate_payment(
    invoice: &FelInvoice,
    amount: Decimal,
    method: Option<PaymentMethod>,
    date: Option<NaiveDate>,
) -> PaymentValidation {
    validate_payment_on(invoice, amount, method, date, Local::now().date_naive())
}

/// Same as [`validate_payment`] with an explicit "today".
///
/// Rules are checked in order and the first failure wins: positive amount,
/// amount within the balance due, date not in the future, method present.
pub fn validate_payment_on(
    invoice: &FelInvoice,
    amount: Decimal,
    method: Option<PaymentMethod>,
    date: Option<NaiveDate>,
    today: NaiveDate,
) -> PaymentValidation {
    if amount <= Decimal::ZERO {
        return PaymentValidation::invalid("amount must be greater than 0");
    }

    if amount > invoice.balance_due.value() {
        return PaymentValidation::invalid(format!(
            "amount exceeds the balance due ({})",
            invoice.balance_due
        ));
    }

    if let Some(date) = date
        && date > today
    {
        return PaymentValidation::invalid("date cannot be in the future");
    }

    if method.is_none() {
        return PaymentValidation::invalid("a payment method is required");
    }

    PaymentValidation::valid()
}
