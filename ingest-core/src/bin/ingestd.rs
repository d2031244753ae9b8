//! Meridian ingestion daemon
//!
//! Owns one ingestion session at a time: a captive node backend driven by
//! the sequencer against the PostgreSQL history store. Backend failures end
//! the session and a fresh one resumes from the cursor; ordering and
//! configuration errors stop the daemon for operator intervention.

use anyhow::Context;
use history_store::{HistoryStore, PgHistoryStore};
use ingest_core::backend::CaptiveBackend;
use ingest_core::verify::{FsSnapshotSource, StateVerifier};
use ingest_core::{IngestConfig, Sequencer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const SESSION_RESTART_DELAY: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,ingest_core=debug")),
        )
        .init();

    let config = load_config()?;
    info!(
        start_ledger = config.start_ledger,
        node = %config.node.binary_path.display(),
        "starting ingestion daemon"
    );

    let store = PgHistoryStore::connect(
        &config.database.url,
        config.database.max_ingest_connections,
    )
    .await
    .context("connecting to history database")?;
    store.ensure_schema().await.context("applying schema")?;
    let store: Arc<dyn HistoryStore> = Arc::new(store);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            let _ = shutdown_tx.send(true);
        }
    });

    loop {
        let backend = CaptiveBackend::new(config.node.clone());
        let mut sequencer = Sequencer::new(backend, Arc::clone(&store), &config);
        let verifier = spawn_verifier(&config, &store, &sequencer, shutdown_rx.clone());

        let result = sequencer.run(shutdown_rx.clone()).await;
        let _ = sequencer.close().await;
        if let Some(task) = verifier {
            task.abort();
        }

        match result {
            Ok(()) => {
                info!("ingestion stopped");
                return Ok(());
            }
            Err(err) if err.requires_session_restart() && !*shutdown_rx.borrow() => {
                warn!(%err, "session failed, starting a new one");
                tokio::time::sleep(SESSION_RESTART_DELAY).await;
            }
            Err(err) => {
                error!(%err, fatal = err.is_fatal(), "ingestion failed");
                return Err(err.into());
            }
        }
    }
}

fn load_config() -> anyhow::Result<IngestConfig> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("MERIDIAN_CONFIG").ok());
    let config = match path {
        Some(path) => {
            IngestConfig::from_file(&path).with_context(|| format!("loading config {path}"))?
        }
        None => IngestConfig::default(),
    }
    .apply_env();
    config.validate()?;
    Ok(config)
}

fn spawn_verifier<B>(
    config: &IngestConfig,
    store: &Arc<dyn HistoryStore>,
    sequencer: &Sequencer<B>,
    shutdown: watch::Receiver<bool>,
) -> Option<tokio::task::JoinHandle<()>>
where
    B: ingest_core::LedgerBackend,
{
    if !config.verification.enabled {
        return None;
    }
    let Some(url) = config.history_archive_urls.first() else {
        warn!("verification enabled but no history archive configured, skipping");
        return None;
    };
    let root = url.strip_prefix("file://").unwrap_or(url);
    let verifier = StateVerifier::new(Arc::clone(store), FsSnapshotSource::new(root));
    Some(ingest_core::verify::spawn(
        verifier,
        config.verification.cadence_ledgers,
        sequencer.progress(),
        shutdown,
    ))
}
