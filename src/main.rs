use clap::Parser;
use funds_worker::application::consumer::ConsumptionLoop;
use funds_worker::application::workflow::BalanceUpdateWorkflow;
use funds_worker::config::WorkerConfig;
use funds_worker::domain::account::BankAccount;
use funds_worker::domain::ports::{BalanceStore, BalanceStoreBox, DeadLetterSinkRef, SleeperRef};
use funds_worker::infrastructure::in_memory::{
    InMemoryBalanceStore, InMemoryDeadLetterSink, InMemoryQueue,
};
use funds_worker::infrastructure::jsonl::JsonlDeadLetterSink;
use funds_worker::infrastructure::sleeper::TokioSleeper;
use funds_worker::interfaces::csv::account_reader::AccountReader;
use funds_worker::interfaces::csv::account_writer::AccountWriter;
use funds_worker::interfaces::jsonl::message_reader::MessageReader;
use funds_worker::logging::init_logging;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON-lines file with one queue message body per line
    #[arg(long)]
    messages: Option<PathBuf>,

    /// CSV file with opening balances (`id,balance`)
    #[arg(long)]
    accounts: Option<PathBuf>,

    /// YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Append dead-lettered messages to this JSON-lines file
    #[arg(long)]
    dead_letter: Option<PathBuf>,

    /// Keep polling until Ctrl-C instead of stopping once the queue is empty
    #[arg(long)]
    follow: bool,

    /// Override the idle poll interval from the configuration
    #[arg(long)]
    idle_interval_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = WorkerConfig::load(cli.config.as_deref()).into_diagnostic()?;
    if let Some(secs) = cli.idle_interval_secs {
        config.idle_interval_secs = secs;
    }
    let _guard = init_logging(&config.logging);
    info!(queue = %config.queue_name, "Starting funds worker");

    let queue = InMemoryQueue::new();
    if let Some(path) = &cli.messages {
        let file = File::open(path).into_diagnostic()?;
        for body in MessageReader::new(BufReader::new(file)).bodies() {
            queue.send(body.into_diagnostic()?).await;
        }
        let count = queue.len().await;
        info!(count, "Queued messages");
    }

    let (store, default_sink) = match open_persistent_storage(&cli).await? {
        Some(storage) => storage,
        None => open_in_memory_storage(&cli).await?,
    };
    let sink: DeadLetterSinkRef = match &cli.dead_letter {
        Some(path) => {
            let sink = JsonlDeadLetterSink::open(path).await.into_diagnostic()?;
            info!(path = %sink.path().display(), "Writing dead letters to file");
            Arc::new(sink)
        }
        None => default_sink,
    };

    let sleeper: SleeperRef = Arc::new(TokioSleeper);
    let workflow = BalanceUpdateWorkflow::new(store, sink, sleeper.clone());
    let mut consumer = ConsumptionLoop::new(
        Box::new(queue),
        workflow,
        sleeper,
        config.consumer_settings(),
    );

    let span = info_span!("worker", queue = %config.queue_name);
    let stats = if cli.follow {
        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, stopping after the current message");
                signal.cancel();
            }
        });
        consumer.run(shutdown).instrument(span).await
    } else {
        consumer.drain().instrument(span).await
    };
    info!(
        received = stats.received,
        applied = stats.applied,
        skipped = stats.skipped,
        dead_lettered = stats.dead_lettered + stats.unanticipated,
        "Worker finished"
    );

    let accounts = consumer
        .workflow()
        .store()
        .list_accounts()
        .await
        .into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = AccountWriter::new(stdout.lock());
    writer.write_accounts(accounts).into_diagnostic()?;

    Ok(())
}

fn read_accounts(path: &Path) -> Result<Vec<BankAccount>> {
    let file = File::open(path).into_diagnostic()?;
    Ok(AccountReader::new(file)
        .accounts()
        .filter_map(|result| match result {
            Ok(account) => Some(account),
            Err(e) => {
                warn!(error = %e, "Error reading account");
                None
            }
        })
        .collect())
}

async fn open_in_memory_storage(cli: &Cli) -> Result<(BalanceStoreBox, DeadLetterSinkRef)> {
    let store = InMemoryBalanceStore::new();
    if let Some(path) = &cli.accounts {
        for account in read_accounts(path)? {
            store.insert_account(account).await;
        }
    }
    let store: BalanceStoreBox = Box::new(store);
    let sink: DeadLetterSinkRef = Arc::new(InMemoryDeadLetterSink::new());
    Ok((store, sink))
}

#[cfg(feature = "storage-rocksdb")]
async fn open_persistent_storage(
    cli: &Cli,
) -> Result<Option<(BalanceStoreBox, DeadLetterSinkRef)>> {
    use funds_worker::infrastructure::rocksdb::RocksDBStore;

    let Some(db_path) = &cli.db_path else {
        return Ok(None);
    };
    let store = RocksDBStore::open(db_path).into_diagnostic()?;
    if let Some(path) = &cli.accounts {
        for account in read_accounts(path)? {
            store.insert_account(&account).await.into_diagnostic()?;
        }
    }
    let sink: DeadLetterSinkRef = Arc::new(store.clone());
    let store: BalanceStoreBox = Box::new(store);
    Ok(Some((store, sink)))
}

#[cfg(not(feature = "storage-rocksdb"))]
async fn open_persistent_storage(
    cli: &Cli,
) -> Result<Option<(BalanceStoreBox, DeadLetterSinkRef)>> {
    if cli.db_path.is_some() {
        warn!(
            "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to in-memory storage."
        );
    }
    Ok(None)
}
