mod common;

use common::{config, invoice, status, submission};
use fel_client::application::processor::{FelProcessor, TIMEOUT_MESSAGE};
use fel_client::domain::invoice::{CreateInvoiceRequest, PaymentMethod};
use fel_client::domain::permission::PermissionSet;
use fel_client::domain::session::{CompanySettings, SessionContext};
use fel_client::domain::status::FelStatus;
use fel_client::error::FelError;
use fel_client::infrastructure::in_memory::{InMemoryTokenStore, ScriptedFelGateway};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::sleep;

fn processor(gateway: &ScriptedFelGateway, max_attempts: u32) -> FelProcessor {
    FelProcessor::new(Arc::new(gateway.clone()), config(max_attempts)).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_order_42_authorized_immediately() {
    let gateway = ScriptedFelGateway::new();
    gateway.push_submission(Ok(submission(
        invoice(100, 42, dec!(500.00)),
        "authorized",
        Some("ABC123-DEF456-789"),
    )));
    let processor = processor(&gateway, 20);

    let invoice = processor
        .create_fel_invoice(CreateInvoiceRequest::new(42, PaymentMethod::Cash))
        .await;

    assert_eq!(invoice.map(|i| i.order_id), Some(42));
    let state = processor.state();
    assert!(!state.is_processing);
    assert_eq!(state.current_status, Some(FelStatus::Authorized));
    assert_eq!(state.progress_percent, 100);
    assert!(!state.can_retry);
    assert_eq!(gateway.status_checks(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_order_7_authorized_on_fourth_poll() {
    let gateway = ScriptedFelGateway::new();
    gateway.push_submission(Ok(submission(invoice(7, 7, dec!(80)), "processing", None)));
    for _ in 0..3 {
        gateway.push_status(Ok(status("processing", None)));
    }
    gateway.push_status(Ok(status("authorized", Some("X"))));
    let processor = processor(&gateway, 20);

    let invoice = processor
        .create_fel_invoice(CreateInvoiceRequest::new(7, PaymentMethod::Cash))
        .await;
    assert!(invoice.is_some());
    assert!(processor.state().is_processing);

    let state = processor.settled().await;
    assert_eq!(state.current_status, Some(FelStatus::Authorized));
    assert_eq!(state.progress_percent, 100);
    assert_eq!(state.attempts, 4);
    assert!(!state.can_retry);
    assert_eq!(gateway.status_checks(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_attempt_budget_forces_timeout() {
    let gateway = ScriptedFelGateway::new();
    gateway.push_submission(Ok(submission(invoice(5, 5, dec!(10)), "processing", None)));
    let processor = processor(&gateway, 4);

    processor
        .create_fel_invoice(CreateInvoiceRequest::new(5, PaymentMethod::Cash))
        .await;

    // Three polls (at 3s, 6s, 9s) keep the session alive.
    sleep(Duration::from_millis(9500)).await;
    let state = processor.state();
    assert!(state.is_processing);
    assert_eq!(state.attempts, 3);

    let state = processor.settled().await;
    assert_eq!(state.current_status, Some(FelStatus::Timeout));
    assert_eq!(state.error_message.as_deref(), Some(TIMEOUT_MESSAGE));
    assert!(state.can_retry);
    assert_eq!(state.attempts, 4);

    sleep(Duration::from_secs(60)).await;
    assert_eq!(gateway.status_checks(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_server_rejection_during_polling() {
    let gateway = ScriptedFelGateway::new();
    gateway.push_submission(Ok(submission(invoice(8, 8, dec!(10)), "processing", None)));
    let mut rejected = status("rejected", None);
    rejected.error_message = Some("NIT del receptor no válido".to_string());
    gateway.push_status(Ok(rejected));
    let processor = processor(&gateway, 20);

    processor
        .create_fel_invoice(CreateInvoiceRequest::new(8, PaymentMethod::Cash))
        .await;
    let state = processor.settled().await;

    assert_eq!(state.current_status, Some(FelStatus::Rejected));
    assert_eq!(
        state.error_message.as_deref(),
        Some("NIT del receptor no válido")
    );
    assert!(state.can_retry);
    assert!(state.invoice.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_immediate_rejection_returns_none() {
    let gateway = ScriptedFelGateway::new();
    let mut rejected = submission(invoice(9, 9, dec!(10)), "fel_rejected", None);
    rejected.error_message = Some("certifier unavailable".to_string());
    gateway.push_submission(Ok(rejected));
    let processor = processor(&gateway, 20);

    let result = processor
        .create_fel_invoice(CreateInvoiceRequest::new(9, PaymentMethod::Cash))
        .await;

    assert!(result.is_none());
    let state = processor.state();
    assert!(!state.is_processing);
    assert_eq!(state.current_status, Some(FelStatus::Error));
    assert_eq!(state.error_message.as_deref(), Some("certifier unavailable"));
    assert!(state.can_retry);
}

#[tokio::test(start_paused = true)]
async fn test_retry_uses_server_retry_eligibility() {
    let gateway = ScriptedFelGateway::new();
    let mut rejected = submission(invoice(11, 11, dec!(10)), "rejected", None);
    rejected.can_retry = Some(false);
    gateway.push_submission(Ok(rejected));
    let processor = processor(&gateway, 20);

    let result = processor.retry_fel(11, true).await;

    assert!(result.is_none());
    let state = processor.state();
    assert_eq!(state.current_status, Some(FelStatus::Rejected));
    assert!(!state.can_retry);
    assert_eq!(gateway.retries(), vec![(11, true)]);
}

#[tokio::test(start_paused = true)]
async fn test_failed_retry_without_server_verdict_stays_retryable() {
    let gateway = ScriptedFelGateway::new();
    let mut failed = submission(invoice(12, 12, dec!(10)), "error", None);
    failed.error_message = Some("firma no válida".to_string());
    gateway.push_submission(Ok(failed));
    let processor = processor(&gateway, 20);

    let result = processor.retry_fel(12, false).await;

    assert!(result.is_none());
    let state = processor.state();
    assert!(!state.is_processing);
    assert_eq!(state.current_status, Some(FelStatus::Error));
    assert_eq!(state.error_message.as_deref(), Some("firma no válida"));
    assert!(state.can_retry);
    assert_eq!(gateway.retries(), vec![(12, false)]);
}

#[tokio::test(start_paused = true)]
async fn test_retry_polls_until_authorized() {
    let gateway = ScriptedFelGateway::new();
    gateway.push_submission(Ok(submission(invoice(13, 13, dec!(10)), "fel_processing", None)));
    gateway.push_status(Ok(status("processing", None)));
    gateway.push_status(Ok(status("fel_authorized", Some("UUID-13"))));
    let processor = processor(&gateway, 20);

    let invoice = processor.retry_fel(13, false).await;
    assert_eq!(invoice.map(|i| i.id), Some(13));
    let state = processor.state();
    assert!(state.is_processing);
    assert_eq!(state.current_status, Some(FelStatus::Processing));

    let state = processor.settled().await;
    assert_eq!(state.current_status, Some(FelStatus::Authorized));
    assert_eq!(state.attempts, 2);
    assert_eq!(state.progress_percent, 100);
    assert!(!state.can_retry);
    assert_eq!(gateway.status_checks(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_server_reported_timeout_during_polling() {
    let gateway = ScriptedFelGateway::new();
    gateway.push_submission(Ok(submission(invoice(14, 14, dec!(10)), "processing", None)));
    let mut timed_out = status("fel_timeout", None);
    timed_out.error_message = Some("el certificador no respondió".to_string());
    gateway.push_status(Ok(timed_out));
    let processor = processor(&gateway, 20);

    processor
        .create_fel_invoice(CreateInvoiceRequest::new(14, PaymentMethod::Cash))
        .await;
    let state = processor.settled().await;

    assert_eq!(state.current_status, Some(FelStatus::Timeout));
    assert_eq!(
        state.error_message.as_deref(),
        Some("el certificador no respondió")
    );
    assert_eq!(state.attempts, 1);
    assert!(state.can_retry);

    sleep(Duration::from_secs(30)).await;
    assert_eq!(gateway.status_checks(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_server_reported_error_during_polling() {
    let gateway = ScriptedFelGateway::new();
    gateway.push_submission(Ok(submission(invoice(15, 15, dec!(10)), "processing", None)));
    gateway.push_status(Ok(status("processing", None)));
    gateway.push_status(Ok(status("fel_error", None)));
    let processor = processor(&gateway, 20);

    processor
        .create_fel_invoice(CreateInvoiceRequest::new(15, PaymentMethod::Cash))
        .await;
    let state = processor.settled().await;

    assert_eq!(state.current_status, Some(FelStatus::Error));
    assert_eq!(
        state.error_message.as_deref(),
        Some("FEL processing ended with status error")
    );
    assert_eq!(state.attempts, 2);
    assert!(state.can_retry);
    assert!(state.invoice.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_create_transport_error_is_captured() {
    let gateway = ScriptedFelGateway::new();
    gateway.push_submission(Err(FelError::Transport("connection reset".into())));
    let processor = processor(&gateway, 20);

    let result = processor
        .create_fel_invoice(CreateInvoiceRequest::new(1, PaymentMethod::CreditCard))
        .await;

    assert!(result.is_none());
    let state = processor.state();
    assert_eq!(state.current_status, Some(FelStatus::Error));
    assert!(state.can_retry);
    assert!(state.error_message.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_request_certifier_overrides_default() {
    let gateway = ScriptedFelGateway::new();
    gateway.push_submission(Ok(submission(invoice(1, 1, dec!(1)), "authorized", Some("U"))));
    let processor = processor(&gateway, 20);

    let mut request = CreateInvoiceRequest::new(1, PaymentMethod::Cash);
    request.certifier = Some("infile".to_string());
    processor.create_fel_invoice(request).await;

    assert_eq!(gateway.certifiers(), vec!["infile".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_company_certifier_reaches_the_gateway() {
    let gateway = ScriptedFelGateway::new();
    gateway.push_submission(Ok(submission(invoice(2, 2, dec!(1)), "authorized", Some("U"))));
    let processor = processor(&gateway, 20);

    let mut session = SessionContext::new(Arc::new(InMemoryTokenStore::new()));
    session.sign_in(
        "tok",
        PermissionSet::default(),
        Some(CompanySettings {
            name: "Ferretería El Martillo".to_string(),
            tax_id: None,
            fel_enabled: true,
            default_certifier: Some("megaprint".to_string()),
        }),
    );
    processor
        .create_fel_invoice(session.invoice_request(2, PaymentMethod::Cash))
        .await;

    assert_eq!(gateway.certifiers(), vec!["megaprint".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_all_further_changes() {
    let gate = Arc::new(Semaphore::new(0));
    let gateway = ScriptedFelGateway::new().with_status_gate(gate.clone());
    gateway.push_submission(Ok(submission(invoice(3, 3, dec!(10)), "processing", None)));
    gateway.push_status(Ok(status("authorized", Some("TOO-LATE"))));
    let processor = Arc::new(processor(&gateway, 20));

    processor
        .create_fel_invoice(CreateInvoiceRequest::new(3, PaymentMethod::Cash))
        .await;
    let mut updates = processor.subscribe();

    sleep(Duration::from_millis(3500)).await;
    processor.cancel_process();
    updates.mark_unchanged();
    let cancelled = processor.state();

    gate.add_permits(1);
    sleep(Duration::from_secs(120)).await;

    assert!(!updates.has_changed().unwrap());
    assert_eq!(processor.state(), cancelled);
    assert!(!cancelled.is_processing);
    assert_eq!(cancelled.current_status, None);
    assert!(cancelled.can_retry);
}
