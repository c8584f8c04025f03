use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use fel_client::application::payments::PaymentService;
use fel_client::application::processor::{FelProcessor, ProcessingState};
use fel_client::config::{ApiConfig, DEFAULT_CERTIFIER, ProcessingConfig};
use fel_client::domain::invoice::{
    CreateInvoiceRequest, PaymentMethod, PaymentRequest, ReceiptRequest,
};
use fel_client::domain::ports::{FelGatewayRef, TokenStore};
use fel_client::domain::status::FelStatus;
use fel_client::infrastructure::http::HttpFelGateway;
use fel_client::infrastructure::in_memory::InMemoryTokenStore;
use fel_client::interfaces::json::state_writer::StateWriter;
use miette::{IntoDiagnostic, Result, miette};
use rust_decimal::Decimal;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Base URL of the invoicing API
    #[arg(
        long,
        env = "FEL_API_URL",
        default_value = "http://localhost:8000/api/",
        global = true
    )]
    api_url: String,

    /// API token, sent as a bearer token
    #[arg(long, env = "FEL_API_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,

    /// Seconds between two FEL status checks
    #[arg(long, env = "FEL_POLL_INTERVAL_SECS", default_value_t = 3, global = true)]
    poll_interval: u64,

    /// Status checks before giving up on an authorization
    #[arg(long, env = "FEL_MAX_ATTEMPTS", default_value_t = 20, global = true)]
    max_attempts: u32,

    /// Seconds shown as the progress budget
    #[arg(long, env = "FEL_TIMEOUT_SECS", default_value_t = 60, global = true)]
    timeout: u64,

    /// Certifier used when submitting to FEL
    #[arg(long, env = "FEL_CERTIFIER", default_value = DEFAULT_CERTIFIER, global = true)]
    certifier: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an invoice for an order and wait for its FEL authorization
    Create {
        #[arg(long)]
        order: i64,
        #[arg(long, default_value = "cash")]
        method: PaymentMethod,
        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due_date: Option<NaiveDate>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Resubmit an invoice to FEL and wait for the outcome
    Retry {
        #[arg(long)]
        invoice: i64,
        /// Resubmit even if the server considers the invoice final
        #[arg(long)]
        force: bool,
    },
    /// Show the FEL status of an invoice once
    Status {
        #[arg(long)]
        invoice: i64,
    },
    /// Download a non-fiscal receipt for an order
    Receipt {
        #[arg(long)]
        order: i64,
        #[arg(long, default_value = "cash")]
        method: PaymentMethod,
        #[arg(long)]
        notes: Option<String>,
        /// Directory the document is saved into
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Record a payment against an invoice
    Pay {
        #[arg(long)]
        invoice: i64,
        #[arg(long)]
        amount: Decimal,
        #[arg(long)]
        method: PaymentMethod,
        /// Payment date (YYYY-MM-DD), today when omitted
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        notes: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let processing = ProcessingConfig {
        poll_interval: Duration::from_secs(cli.poll_interval),
        max_attempts: cli.max_attempts,
        display_timeout: Duration::from_secs(cli.timeout),
        default_certifier: cli.certifier,
    };
    processing.validate().into_diagnostic()?;
    let api = ApiConfig::new(&cli.api_url).into_diagnostic()?;

    let tokens = InMemoryTokenStore::new();
    if let Some(token) = &cli.token {
        tokens.set(token);
    }
    let gateway: FelGatewayRef =
        Arc::new(HttpFelGateway::new(&api, Arc::new(tokens)).into_diagnostic()?);

    let stdout = io::stdout();
    let mut writer = StateWriter::new(stdout.lock());

    match cli.command {
        Command::Create {
            order,
            method,
            due_date,
            notes,
        } => {
            let processor = FelProcessor::new(gateway, processing).into_diagnostic()?;
            let request = CreateInvoiceRequest {
                due_date,
                notes,
                ..CreateInvoiceRequest::new(order, method)
            };
            let state = run_until_settled(&processor, async {
                processor.create_fel_invoice(request).await;
            })
            .await;
            writer.write(&state).into_diagnostic()?;
            outcome(&state)
        }
        Command::Retry { invoice, force } => {
            let processor = FelProcessor::new(gateway, processing).into_diagnostic()?;
            let state = run_until_settled(&processor, async {
                processor.retry_fel(invoice, force).await;
            })
            .await;
            writer.write(&state).into_diagnostic()?;
            outcome(&state)
        }
        Command::Status { invoice } => {
            let status = gateway.check_status(invoice).await.into_diagnostic()?;
            writer.write(&status).into_diagnostic()?;
            Ok(())
        }
        Command::Receipt {
            order,
            method,
            notes,
            out,
        } => {
            let processor = FelProcessor::new(gateway, processing).into_diagnostic()?;
            let request = ReceiptRequest {
                order_id: order,
                payment_method: method,
                notes,
            };
            let Some(document) = processor.create_receipt(request).await else {
                let state = processor.state();
                return Err(miette!(
                    "receipt request failed: {}",
                    state.error_message.unwrap_or_default()
                ));
            };
            let path = document.save_to(&out).into_diagnostic()?;
            println!("{}", path.display());
            Ok(())
        }
        Command::Pay {
            invoice,
            amount,
            method,
            date,
            notes,
        } => {
            let service = PaymentService::new(gateway);
            let request = PaymentRequest {
                invoice_id: invoice,
                amount,
                payment_method: method,
                payment_date: date,
                notes,
            }
            .dated_today_if_missing();
            let updated = service.pay(request).await.into_diagnostic()?;
            writer.write(&updated).into_diagnostic()?;
            Ok(())
        }
    }
}

/// Runs `start` and waits for the processor to settle. Ctrl-C cancels the session.
async fn run_until_settled(
    processor: &FelProcessor,
    start: impl Future<Output = ()>,
) -> ProcessingState {
    let run = async {
        start.await;
        processor.settled().await
    };

    tokio::select! {
        state = run => state,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Cancelled");
            processor.cancel_process();
            processor.state()
        }
    }
}

fn outcome(state: &ProcessingState) -> Result<()> {
    match state.current_status {
        Some(FelStatus::Authorized) | Some(FelStatus::Pending) => Ok(()),
        status => Err(miette!(
            "FEL processing ended with status {}: {}",
            status.map(|s| s.as_str()).unwrap_or("cancelled"),
            state.error_message.as_deref().unwrap_or("no details")
        )),
    }
}
