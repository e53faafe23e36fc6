mod discover;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use granary_core::{
    load_config, metrics, validate_config, BatchIngestor, HttpIndexClient, IngestError,
};

use discover::discover_batch;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Exit code for a run stopped by an interrupt.
const EXIT_CANCELLED: i32 = 130;

/// Batch document loader for index services.
///
/// Submits every document under ROOT to the configured index service,
/// waits for processing to finish, and verifies each collection's search
/// catalog has settled before reporting success.
#[derive(Debug, Parser)]
#[command(name = "granary", version, about)]
struct Args {
    /// Root directory; each subdirectory is a collection, its files are
    /// that collection's documents.
    root: PathBuf,

    /// Path to the configuration file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Override ingest.submit_concurrency from the config file.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Override ingest.poll_interval_ms from the config file.
    #[arg(long)]
    poll_ms: Option<u64>,

    /// Print the discovered work list and exit without submitting.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(code) => code,
        Err(e) => {
            error!("Fatal error: {e:#}");
            1
        }
    };
    std::process::exit(code);
}

async fn run() -> Result<i32> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    // Load configuration
    info!("Loading configuration from {:?}", args.config);
    let mut config = load_config(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    if let Some(concurrency) = args.concurrency {
        config.ingest.submit_concurrency = concurrency;
    }
    if let Some(poll_ms) = args.poll_ms {
        config.ingest.poll_interval_ms = poll_ms;
    }

    validate_config(&config).context("Configuration validation failed")?;

    // Compute config hash so runs are attributable in logs
    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    let run_id = uuid::Uuid::new_v4();
    info!(
        version = VERSION,
        run_id = %run_id,
        config_hash = &config_hash[..16],
        index_url = %config.index.url,
        "granary starting"
    );

    // Discover the work list
    let batch = discover_batch(&args.root)
        .with_context(|| format!("Failed to discover work list under {:?}", args.root))?;
    info!(
        collections = batch.collections.len(),
        documents = batch.document_count(),
        "work list discovered"
    );

    if args.dry_run {
        for spec in &batch.collections {
            println!("{} ({} documents)", spec.name, spec.documents.len());
            for document in &spec.documents {
                println!("  {document}");
            }
        }
        return Ok(0);
    }

    let client = Arc::new(
        HttpIndexClient::new(config.index.clone())
            .map_err(|e| anyhow!("Failed to create index client: {e}"))?,
    );

    // Ctrl-C cancels the shared run token; everything observing it winds
    // down and the registry is flushed.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, shutting down");
                cancel.cancel();
            }
        });
    }

    let ingestor = BatchIngestor::new(config.ingest.clone(), client);
    match ingestor.run(batch, &cancel).await {
        Ok(report) => {
            info!(
                collections = report.collections,
                documents = report.documents,
                duration_ms = report.duration.as_millis() as u64,
                "ingest complete"
            );
            log_run_counters();
            Ok(0)
        }
        Err(IngestError::Cancelled) => {
            info!("Run cancelled before completion");
            Ok(EXIT_CANCELLED)
        }
        Err(err) => {
            error!("Ingest failed: {err}");
            log_run_counters();
            Ok(1)
        }
    }
}

/// Surface the run's counters in the log; there is no metrics endpoint in
/// a one-shot tool.
fn log_run_counters() {
    debug!(
        submissions_ok = metrics::SUBMISSIONS.with_label_values(&["ok"]).get(),
        submissions_err = metrics::SUBMISSIONS.with_label_values(&["error"]).get(),
        status_polls_ok = metrics::STATUS_POLLS.with_label_values(&["ok"]).get(),
        status_polls_err = metrics::STATUS_POLLS.with_label_values(&["error"]).get(),
        completed = metrics::DOCUMENTS_RESOLVED
            .with_label_values(&["completed"])
            .get(),
        errored = metrics::DOCUMENTS_RESOLVED
            .with_label_values(&["errored"])
            .get(),
        "run counters"
    );
}
