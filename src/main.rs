use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use crowdpay::application::engine::{Payer, PaymentRequest, ReconciliationEngine};
use crowdpay::application::report::DateRange;
use crowdpay::application::scheduler::SweepScheduler;
use crowdpay::config::{Settings, hours_to_duration};
use crowdpay::domain::phone;
use crowdpay::domain::ports::SharedPaymentStore;
use crowdpay::domain::provider::ProviderId;
use crowdpay::domain::transaction::TransactionStatus;
use crowdpay::infrastructure::http::ReqwestTransport;
use crowdpay::infrastructure::in_memory::InMemoryPaymentStore;
use crowdpay::infrastructure::notifier::{DEFAULT_LOG_FILTER, TracingNotificationSink};
#[cfg(feature = "storage-rocksdb")]
use crowdpay::infrastructure::rocksdb::RocksDBStore;
use crowdpay::interfaces::csv::{ProjectReader, ReportWriter};
use crowdpay::interfaces::http::router;
use crowdpay::providers::ProviderRegistry;
use miette::{IntoDiagnostic, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fs::File;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// TOML settings file; environment variables override it.
    #[arg(long, global = true, env = "CROWDPAY_CONFIG")]
    config: Option<PathBuf>,

    /// Projects CSV (`id, title, owner_id, target_amount`) loaded into the store.
    #[arg(long, global = true)]
    projects: Option<PathBuf>,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Plain,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportFormat {
    Json,
    Csv,
}

#[derive(Subcommand)]
enum Command {
    /// Serve provider webhooks and run the periodic reconciliation sweep.
    Serve {
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: SocketAddr,
        /// Do not start the background sweep.
        #[arg(long)]
        no_sweep: bool,
    },
    /// Open a payment with a provider.
    Initiate {
        provider: ProviderId,
        #[arg(long)]
        amount: Decimal,
        #[arg(long)]
        project: u64,
        #[arg(long)]
        user: u64,
        /// Payer phone number, required for mobile money.
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        currency: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Apply a provider callback given as a JSON document.
    Callback { provider: ProviderId, payload: String },
    /// Show a transaction, polling the provider while it is pending.
    Status { transaction_id: String },
    /// Cancel a pending transaction.
    Cancel { transaction_id: String },
    /// Poll pending transactions older than the given age.
    Reconcile {
        #[arg(long)]
        older_than_hours: Option<u64>,
    },
    /// Aggregate transactions created in `[from, to]` (RFC 3339).
    Report {
        #[arg(long)]
        from: DateTime<Utc>,
        #[arg(long)]
        to: Option<DateTime<Utc>>,
        #[arg(long)]
        status: Option<TransactionStatus>,
        #[arg(long, value_enum, default_value_t = ReportFormat::Json)]
        format: ReportFormat,
    },
    /// Print a phone number in international digits-only form.
    Normalize {
        phone: String,
        #[arg(long)]
        country_code: Option<String>,
    },
    /// Guess the mobile-money operator of a phone number.
    Identify {
        phone: String,
        #[arg(long)]
        country_code: Option<String>,
    },
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    match format {
        LogFormat::Plain => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[cfg(feature = "storage-rocksdb")]
fn open_store(db_path: Option<PathBuf>) -> Result<SharedPaymentStore> {
    match db_path {
        Some(path) => Ok(Arc::new(RocksDBStore::open(path).into_diagnostic()?)),
        None => Ok(Arc::new(InMemoryPaymentStore::new())),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_store(db_path: Option<PathBuf>) -> Result<SharedPaymentStore> {
    if db_path.is_some() {
        warn!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(Arc::new(InMemoryPaymentStore::new()))
}

async fn load_projects(store: &SharedPaymentStore, path: PathBuf) -> Result<()> {
    let file = File::open(path).into_diagnostic()?;
    for project in ProjectReader::new(file).projects() {
        match project {
            Ok(project) => store.store_project(project).await.into_diagnostic()?,
            Err(e) => warn!(error = %e, "Skipping unreadable project row"),
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    Ok(())
}

async fn build_engine(cli: &Cli, settings: &Settings) -> Result<ReconciliationEngine> {
    let store = open_store(cli.db_path.clone())?;
    if let Some(path) = cli.projects.clone() {
        load_projects(&store, path).await?;
    }
    let transport = ReqwestTransport::new(settings.engine.provider_timeout()).into_diagnostic()?;
    let registry = ProviderRegistry::from_settings(settings, Arc::new(transport));
    Ok(ReconciliationEngine::new(
        store,
        Arc::new(TracingNotificationSink),
        registry,
        settings.engine.clone(),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);
    let settings = Settings::load(cli.config.as_deref()).into_diagnostic()?;
    let default_cc = settings.engine.default_country_code.clone();

    match &cli.command {
        Command::Normalize {
            phone: raw,
            country_code,
        } => {
            println!("{}", phone::normalize(raw, country_code.as_deref().unwrap_or(&default_cc)));
            return Ok(());
        }
        Command::Identify {
            phone: raw,
            country_code,
        } => {
            let normalized = phone::normalize(raw, country_code.as_deref().unwrap_or(&default_cc));
            match phone::identify_provider(&normalized) {
                Some(provider) => println!("{provider}"),
                None => println!("unidentified"),
            }
            return Ok(());
        }
        _ => {}
    }

    let engine = build_engine(&cli, &settings).await?;

    match cli.command {
        Command::Serve { bind, no_sweep } => {
            let scheduler = (!no_sweep).then(|| {
                SweepScheduler::start(
                    engine.clone(),
                    settings.engine.sweep_interval(),
                    settings.engine.sweep_older_than(),
                )
            });
            let listener = tokio::net::TcpListener::bind(bind).await.into_diagnostic()?;
            info!(%bind, "Webhook server listening");
            axum::serve(listener, router(engine))
                .with_graceful_shutdown(async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await
                .into_diagnostic()?;
            if let Some(scheduler) = scheduler {
                scheduler.stop().await;
            }
        }
        Command::Initiate {
            provider,
            amount,
            project,
            user,
            phone,
            currency,
            description,
        } => {
            let initiated = engine
                .initiate_payment(PaymentRequest {
                    provider,
                    payer: phone.map(Payer::Phone).unwrap_or(Payer::Checkout),
                    amount,
                    project_id: project,
                    user_id: user,
                    description,
                    currency,
                })
                .await
                .into_diagnostic()?;
            print_json(&initiated)?;
        }
        Command::Callback { provider, payload } => {
            let payload: serde_json::Value = serde_json::from_str(&payload).into_diagnostic()?;
            let tx = engine
                .handle_callback(provider, &payload)
                .await
                .into_diagnostic()?;
            print_json(&tx)?;
        }
        Command::Status { transaction_id } => {
            print_json(&engine.check_status(&transaction_id).await.into_diagnostic()?)?;
        }
        Command::Cancel { transaction_id } => {
            print_json(&engine.cancel_transaction(&transaction_id).await.into_diagnostic()?)?;
        }
        Command::Reconcile { older_than_hours } => {
            let older_than = match older_than_hours {
                Some(hours) => hours_to_duration(hours).into_diagnostic()?,
                None => settings.engine.sweep_older_than(),
            };
            print_json(&engine.reconcile_pending(older_than).await.into_diagnostic()?)?;
        }
        Command::Report {
            from,
            to,
            status,
            format,
        } => {
            let period = DateRange::new(from, to.unwrap_or_else(Utc::now)).into_diagnostic()?;
            let report = engine
                .generate_report(period, status)
                .await
                .into_diagnostic()?;
            match format {
                ReportFormat::Json => print_json(&report)?,
                ReportFormat::Csv => {
                    let stdout = io::stdout();
                    ReportWriter::new(stdout.lock())
                        .write_projects(&report)
                        .into_diagnostic()?;
                }
            }
        }
        Command::Normalize { .. } | Command::Identify { .. } => {}
    }

    Ok(())
}
