//! Application layer orchestrating the remote invoicing API.
//!
//! `FelProcessor` drives one invoice to an FEL outcome, polling the status
//! endpoint on `tokio` timers. `PaymentService` validates payments before they
//! are recorded.

pub mod payments;
pub mod processor;
