use crate::config::ProcessingConfig;
use crate::domain::invoice::{
    CreateInvoiceRequest, FelInvoice, FelSubmission, ReceiptDocument, ReceiptRequest,
    StatusResponse,
};
use crate::domain::ports::FelGatewayRef;
use crate::domain::status::FelStatus;
use crate::error::{FelError, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const TIMEOUT_MESSAGE: &str = "processing is taking longer than expected";
pub const CONNECTION_ERROR_MESSAGE: &str = "could not connect to the invoicing service";

const PROGRESS_TICK: Duration = Duration::from_secs(1);

/// Observable state of the operation driven by a [`FelProcessor`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessingState {
    pub is_processing: bool,
    pub current_status: Option<FelStatus>,
    pub invoice: Option<FelInvoice>,
    pub error_message: Option<String>,
    /// 0..=100, never decreases within a polling session.
    pub progress_percent: u8,
    pub elapsed_seconds: u64,
    pub can_retry: bool,
    /// Status checks made by the current polling session.
    pub attempts: u32,
}

impl ProcessingState {
    fn started(invoice: Option<FelInvoice>) -> Self {
        Self {
            is_processing: true,
            current_status: Some(FelStatus::Pending),
            invoice,
            ..Default::default()
        }
    }
}

/// State plus the generation of the session allowed to change it.
///
/// Every mutation runs inside the watch sender's lock and first compares the
/// caller's generation with the active one, so a callback from a finished or
/// cancelled session never touches the state.
struct Shared {
    generation: AtomicU64,
    state: watch::Sender<ProcessingState>,
}

impl Shared {
    fn new() -> Self {
        Self {
            generation: AtomicU64::new(0),
            state: watch::Sender::new(ProcessingState::default()),
        }
    }

    fn is_active(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }

    /// Replaces the state and opens a new session.
    fn begin(&self, initial: ProcessingState) -> u64 {
        let mut generation = 0;
        self.state.send_modify(|state| {
            generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
            *state = initial;
        });
        generation
    }

    /// Applies a non-terminal update to the active session.
    fn apply(&self, generation: u64, update: impl FnOnce(&mut ProcessingState)) -> bool {
        self.state.send_if_modified(|state| {
            if !self.is_active(generation) {
                return false;
            }
            update(state);
            true
        })
    }

    /// Applies a terminal update and closes the session. Only the first caller wins.
    fn finish(&self, generation: u64, update: impl FnOnce(&mut ProcessingState)) -> bool {
        self.state.send_if_modified(|state| {
            if !self.is_active(generation) {
                return false;
            }
            update(state);
            self.generation.fetch_add(1, Ordering::AcqRel);
            true
        })
    }

    /// Closes whatever session is active and applies `update` unconditionally.
    fn interrupt(&self, update: impl FnOnce(&mut ProcessingState)) {
        self.state.send_modify(|state| {
            self.generation.fetch_add(1, Ordering::AcqRel);
            update(state);
        });
    }
}

struct PollTimers {
    cancel: CancellationToken,
    progress: JoinHandle<()>,
    poll: JoinHandle<()>,
}

impl PollTimers {
    fn stop(self) {
        self.cancel.cancel();
        self.progress.abort();
        self.poll.abort();
    }
}

/// Drives FEL invoice creation and authorization to a terminal outcome.
///
/// One processor owns one [`ProcessingState`]. Failures never escape as errors:
/// they end up in `error_message` with `can_retry` set accordingly. Share it
/// behind an `Arc` to cancel from another task.
pub struct FelProcessor {
    gateway: FelGatewayRef,
    config: ProcessingConfig,
    shared: Arc<Shared>,
    timers: Mutex<Option<PollTimers>>,
}

impl FelProcessor {
    /// Fails with [`FelError::Config`] when `config` does not validate.
    pub fn new(gateway: FelGatewayRef, config: ProcessingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            gateway,
            config,
            shared: Arc::new(Shared::new()),
            timers: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> ProcessingState {
        self.shared.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProcessingState> {
        self.shared.state.subscribe()
    }

    /// Waits until no operation is in progress and returns the state at that point.
    pub async fn settled(&self) -> ProcessingState {
        let mut rx = self.subscribe();
        let settled = rx.wait_for(|state| !state.is_processing).await;
        match settled {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        }
    }

    /// Creates an invoice for an order and submits it to FEL.
    ///
    /// Returns the invoice when it was authorized right away, when it is still
    /// being processed (polling continues in the background), or when it does
    /// not need FEL yet. Returns `None` on failure.
    pub async fn create_fel_invoice(&self, request: CreateInvoiceRequest) -> Option<FelInvoice> {
        self.stop_timers();
        let generation = self.shared.begin(ProcessingState::started(None));
        let certifier = request
            .certifier
            .clone()
            .unwrap_or_else(|| self.config.default_certifier.clone());

        info!(order_id = request.order_id, %certifier, "creating FEL invoice");
        let result = self.gateway.create_invoice(&request, &certifier).await;
        self.handle_submission(generation, result, false)
    }

    /// Resubmits an existing invoice to FEL.
    pub async fn retry_fel(&self, invoice_id: i64, force: bool) -> Option<FelInvoice> {
        self.stop_timers();
        let previous = self
            .state()
            .invoice
            .filter(|invoice| invoice.id == invoice_id);
        let generation = self.shared.begin(ProcessingState::started(previous));

        info!(invoice_id, force, "retrying FEL submission");
        let result = self.gateway.retry_invoice(invoice_id, force).await;
        self.handle_submission(generation, result, true)
    }

    /// Requests a non-fiscal receipt. No FEL and no polling involved.
    pub async fn create_receipt(&self, request: ReceiptRequest) -> Option<ReceiptDocument> {
        self.stop_timers();
        let generation = self.shared.begin(ProcessingState {
            is_processing: true,
            ..Default::default()
        });

        info!(order_id = request.order_id, "creating receipt");
        match self.gateway.create_receipt(&request).await {
            Ok(document) => {
                let applied = self.shared.finish(generation, |state| {
                    state.is_processing = false;
                    state.progress_percent = 100;
                });
                applied.then_some(document)
            }
            Err(err) => {
                warn!(error = %err, "receipt request failed");
                self.shared.finish(generation, |state| {
                    state.is_processing = false;
                    state.error_message = Some(failure_message(&err));
                });
                None
            }
        }
    }

    /// Stops the active operation. The invoice snapshot, if any, is kept and can be retried.
    pub fn cancel_process(&self) {
        self.stop_timers();
        self.shared.interrupt(|state| {
            state.is_processing = false;
            state.current_status = None;
            state.can_retry = state.invoice.is_some();
        });
        info!("FEL processing cancelled");
    }

    /// Stops the active operation and clears the state.
    pub fn reset(&self) {
        self.stop_timers();
        self.shared.interrupt(|state| *state = ProcessingState::default());
    }

    fn handle_submission(
        &self,
        generation: u64,
        result: Result<FelSubmission>,
        is_retry: bool,
    ) -> Option<FelInvoice> {
        let submission = match result {
            Ok(submission) => submission,
            Err(err) => {
                warn!(error = %err, "FEL submission failed");
                self.shared.finish(generation, |state| {
                    state.is_processing = false;
                    state.current_status = Some(FelStatus::Error);
                    state.error_message = Some(failure_message(&err));
                    state.can_retry = true;
                });
                return None;
            }
        };

        let FelSubmission {
            invoice,
            status,
            fel_uuid,
            error_message,
            can_retry,
        } = submission;
        let has_uuid = fel_uuid
            .as_deref()
            .or(invoice.fel.uuid.as_deref())
            .is_some_and(|uuid| !uuid.is_empty());

        match status {
            FelStatus::Authorized if has_uuid => {
                info!(invoice_id = invoice.id, "FEL invoice authorized");
                let snapshot = invoice.clone();
                let applied = self.shared.finish(generation, |state| {
                    state.is_processing = false;
                    state.current_status = Some(FelStatus::Authorized);
                    state.invoice = Some(snapshot);
                    state.error_message = None;
                    state.progress_percent = 100;
                    state.can_retry = false;
                });
                applied.then_some(invoice)
            }
            status if status.is_failure() => {
                let message = error_message
                    .or_else(|| invoice.fel.error_message.clone())
                    .unwrap_or_else(|| format!("FEL submission ended with status {status}"));
                warn!(invoice_id = invoice.id, %status, %message, "FEL submission failed");
                let can_retry = if is_retry {
                    can_retry.unwrap_or(true)
                } else {
                    true
                };
                self.shared.finish(generation, |state| {
                    state.is_processing = false;
                    state.current_status = Some(status);
                    state.invoice = Some(invoice);
                    state.error_message = Some(message);
                    state.can_retry = can_retry;
                });
                None
            }
            FelStatus::Pending => {
                debug!(invoice_id = invoice.id, "invoice created without FEL submission");
                let snapshot = invoice.clone();
                let applied = self.shared.finish(generation, |state| {
                    state.is_processing = false;
                    state.current_status = Some(FelStatus::Pending);
                    state.invoice = Some(snapshot);
                });
                applied.then_some(invoice)
            }
            // Processing, or authorized but still waiting for the UUID.
            _ => {
                let snapshot = invoice.clone();
                let applied = self.shared.apply(generation, |state| {
                    state.current_status = Some(FelStatus::Processing);
                    state.invoice = Some(snapshot);
                });
                if !applied {
                    return None;
                }
                self.start_polling(generation, invoice.id);
                Some(invoice)
            }
        }
    }

    fn start_polling(&self, generation: u64, invoice_id: i64) {
        info!(
            invoice_id,
            interval_ms = self.config.poll_interval.as_millis() as u64,
            max_attempts = self.config.max_attempts,
            "polling FEL status"
        );
        let cancel = CancellationToken::new();
        let started_at = Instant::now();

        let progress = tokio::spawn(progress_loop(
            self.shared.clone(),
            generation,
            cancel.clone(),
            started_at,
            self.config.display_timeout,
        ));
        let poll = tokio::spawn(poll_loop(
            self.shared.clone(),
            self.gateway.clone(),
            generation,
            cancel.clone(),
            invoice_id,
            self.config.poll_interval,
            self.config.max_attempts,
        ));

        let timers = PollTimers {
            cancel,
            progress,
            poll,
        };
        if let Some(previous) = self.lock_timers().replace(timers) {
            previous.stop();
        }
    }

    fn stop_timers(&self) {
        if let Some(timers) = self.lock_timers().take() {
            timers.stop();
        }
    }

    fn lock_timers(&self) -> std::sync::MutexGuard<'_, Option<PollTimers>> {
        self.timers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for FelProcessor {
    fn drop(&mut self) {
        self.stop_timers();
    }
}

fn failure_message(err: &FelError) -> String {
    match err {
        FelError::Transport(_) => CONNECTION_ERROR_MESSAGE.to_string(),
        FelError::Remote { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

fn progress_percent(elapsed: Duration, budget: Duration) -> u8 {
    let budget = budget.as_millis().max(1);
    (elapsed.as_millis() * 100 / budget).min(100) as u8
}

async fn progress_loop(
    shared: Arc<Shared>,
    generation: u64,
    cancel: CancellationToken,
    started_at: Instant,
    budget: Duration,
) {
    let mut ticker = interval_at(started_at + PROGRESS_TICK, PROGRESS_TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let elapsed = started_at.elapsed();
        let percent = progress_percent(elapsed, budget);
        let applied = shared.apply(generation, |state| {
            state.elapsed_seconds = elapsed.as_secs();
            state.progress_percent = state.progress_percent.max(percent);
        });
        if !applied {
            return;
        }
    }
}

async fn poll_loop(
    shared: Arc<Shared>,
    gateway: FelGatewayRef,
    generation: u64,
    cancel: CancellationToken,
    invoice_id: i64,
    poll_interval: Duration,
    max_attempts: u32,
) {
    // `interval_at` panics on a zero period.
    let period = poll_interval.max(Duration::from_millis(1));
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut attempts = 0u32;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }
        if !shared.is_active(generation) {
            return;
        }

        attempts += 1;
        debug!(invoice_id, attempts, "checking FEL status");
        let response = tokio::select! {
            _ = cancel.cancelled() => return,
            response = gateway.check_status(invoice_id) => response,
        };

        if !apply_poll_result(&shared, generation, response, attempts, max_attempts) {
            break;
        }
    }

    // Stops the progress ticker as well.
    cancel.cancel();
}

/// Applies one status check. Returns `false` once the session is over.
fn apply_poll_result(
    shared: &Shared,
    generation: u64,
    response: Result<StatusResponse>,
    attempts: u32,
    max_attempts: u32,
) -> bool {
    let StatusResponse {
        status,
        uuid,
        error_message,
        invoice,
    } = match response {
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, attempts, "FEL status check failed");
            shared.finish(generation, |state| {
                state.is_processing = false;
                state.current_status = Some(FelStatus::Error);
                state.error_message = Some(failure_message(&err));
                state.can_retry = true;
                state.attempts = attempts;
            });
            return false;
        }
    };

    match status {
        FelStatus::Authorized => {
            info!(attempts, uuid = uuid.as_deref().unwrap_or(""), "FEL invoice authorized");
            shared.finish(generation, |state| {
                state.is_processing = false;
                state.current_status = Some(FelStatus::Authorized);
                state.error_message = None;
                state.progress_percent = 100;
                state.can_retry = false;
                state.attempts = attempts;
                if invoice.is_some() {
                    state.invoice = invoice;
                }
            });
            false
        }
        status if status.is_failure() => {
            let message = error_message
                .unwrap_or_else(|| format!("FEL processing ended with status {status}"));
            warn!(attempts, %status, %message, "FEL processing failed");
            shared.finish(generation, |state| {
                state.is_processing = false;
                state.current_status = Some(status);
                state.error_message = Some(message);
                state.can_retry = true;
                state.attempts = attempts;
                if invoice.is_some() {
                    state.invoice = invoice;
                }
            });
            false
        }
        _ if attempts >= max_attempts => {
            warn!(attempts, "FEL status still not final, giving up");
            shared.finish(generation, |state| {
                state.is_processing = false;
                state.current_status = Some(FelStatus::Timeout);
                state.error_message = Some(TIMEOUT_MESSAGE.to_string());
                state.can_retry = true;
                state.attempts = attempts;
            });
            false
        }
        status => shared.apply(generation, |state| {
            state.current_status = Some(status);
            state.attempts = attempts;
            if invoice.is_some() {
                state.invoice = invoice;
            }
        }),
    }
}
