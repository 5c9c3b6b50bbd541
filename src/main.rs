use clap::{Parser, ValueEnum};
use miette::{IntoDiagnostic, Result};
use session_ledger::application::Services;
use session_ledger::application::events::EventPublisher;
use session_ledger::config::Settings;
use session_ledger::domain::ports::{BookingFilter, PaymentFilter, StoreRef};
use session_ledger::infrastructure::in_memory::{
    InMemoryCatalog, InMemoryProofStore, InMemoryStore,
};
use session_ledger::infrastructure::log_notifier;
use session_ledger::interfaces::csv::command_reader::CommandReader;
use session_ledger::interfaces::csv::replay::Replayer;
use session_ledger::interfaces::csv::report_writer::ReportWriter;
use session_ledger::interfaces::csv::tutor_reader::TutorReader;
use std::fs::File;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Report {
    Payments,
    Bookings,
    Stats,
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Command journal CSV file
    input: PathBuf,

    /// Tutor catalog CSV file (tutor, name, rate)
    #[arg(long)]
    tutors: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Report written to stdout once the journal has been replayed
    #[arg(long, value_enum, default_value_t = Report::Payments)]
    report: Report,

    /// Settings file (TOML, JSON or YAML)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("session_ledger=info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).into_diagnostic()?;

    let store = open_store(cli.db_path)?;

    let catalog = InMemoryCatalog::new();
    let file = File::open(&cli.tutors).into_diagnostic()?;
    for tutor in TutorReader::new(file).tutors() {
        match tutor {
            Ok(profile) => catalog.upsert(profile).await,
            Err(e) => warn!(error = %e, "skipping tutor row"),
        }
    }

    let (events, stream) = EventPublisher::channel();
    let notifier = log_notifier::spawn(stream);
    let services = Services::new(
        &settings,
        store,
        Arc::new(catalog),
        Arc::new(InMemoryProofStore::permissive()),
        events,
    )
    .into_diagnostic()?;

    // Replay the journal
    let mut replayer = Replayer::new(services);
    let file = File::open(&cli.input).into_diagnostic()?;
    let summary = replayer.replay(CommandReader::new(file).entries()).await;
    info!(
        applied = summary.applied,
        rejected = summary.rejected,
        "journal replayed"
    );

    let labels = replayer.labels();
    let services = replayer.services().clone();
    drop(replayer);

    let stdout = io::stdout();
    let mut writer = ReportWriter::new(stdout.lock());
    match cli.report {
        Report::Payments => {
            let payments = services
                .payments
                .payments(&PaymentFilter::default())
                .await
                .into_diagnostic()?;
            writer.write_payments(&payments, &labels).into_diagnostic()?;
        }
        Report::Bookings => {
            let bookings = services
                .bookings
                .bookings(&BookingFilter::default())
                .await
                .into_diagnostic()?;
            writer.write_bookings(&bookings, &labels).into_diagnostic()?;
        }
        Report::Stats => {
            let stats = services.statistics.dashboard().await.into_diagnostic()?;
            writer.write_stats(&stats).into_diagnostic()?;
        }
    }

    // The notifier stops once the last publisher is gone.
    drop(services);
    let delivered = notifier.await.into_diagnostic()?;
    info!(events = delivered, "notifier drained");

    Ok(())
}

#[cfg(feature = "storage-rocksdb")]
fn open_store(db_path: Option<PathBuf>) -> Result<StoreRef> {
    use session_ledger::infrastructure::rocksdb::RocksDBStore;

    match db_path {
        Some(path) => Ok(Arc::new(RocksDBStore::open(path).into_diagnostic()?)),
        None => Ok(Arc::new(InMemoryStore::new())),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_store(db_path: Option<PathBuf>) -> Result<StoreRef> {
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(Arc::new(InMemoryStore::new()))
}
