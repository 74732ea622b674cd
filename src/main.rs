//! # Unit Locator
//!
//! Record where fleet units are parked, from a fix log or a manual pin, and
//! keep captures taken offline until the hosted store is reachable again.
//!
//! # Examples
//!
//! ```bash
//! unit-locator record --unit T-104 --fixes fixes.jsonl --notes "north yard"
//! unit-locator record --unit T-104 --lat 51.5074 --lon -0.1278
//! unit-locator queue
//! unit-locator sync
//! unit-locator --config fleet.toml watch
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Command, RecordArgs};
use unit_locator::backend::rest::RestBackend;
use unit_locator::backend::LocationBackend;
use unit_locator::capture::{AccuracyGrade, UnitId};
use unit_locator::config::{Config, LoggingConfig};
use unit_locator::connectivity::probe::ConnectivityProbe;
use unit_locator::connectivity::replay::{QueueReplayer, ReplayReport, ReplayStop};
use unit_locator::connectivity::ConnectivityMonitor;
use unit_locator::geolocation::fix_log::FixLogProvider;
use unit_locator::geolocation::manual::MapInteraction;
use unit_locator::geolocation::provider::PositionProvider;
use unit_locator::geolocation::recorder::LocationRecorder;
use unit_locator::pipeline::{SubmissionPipeline, SubmitOutcome};
use unit_locator::queue::storage::FileStore;
use unit_locator::queue::OfflineQueue;

/// Log file name prefix inside `[logging] file_dir`
const LOG_FILE_PREFIX: &str = "unit-locator.log";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let _log_guard = init_logging(&config.logging);

    info!("Unit Locator v{} starting...", env!("CARGO_PKG_VERSION"));

    let app = App::build(config)?;
    match cli.command {
        Command::Record(args) => app.record(args).await,
        Command::Queue => app.list_queue().await,
        Command::Sync => app.sync().await,
        Command::Watch => app.watch().await,
    }
}

/// Load the config file, or defaults plus environment overrides
fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => {
            let mut config = Config::default();
            config.apply_env_overrides(|key| std::env::var(key).ok());
            config.validate()?;
            Ok(config)
        }
    }
}

/// Console logging, plus a daily-rolling file when a log directory is set
///
/// The returned guard flushes the file writer on drop and must be held for
/// the life of the process.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.filter.as_deref().unwrap_or("info")))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match &config.file_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
            None
        }
    }
}

struct App {
    config: Config,
    backend: Arc<dyn LocationBackend>,
    pipeline: Arc<SubmissionPipeline>,
}

impl App {
    fn build(config: Config) -> Result<Self> {
        let store = Arc::new(FileStore::new(&config.queue.data_dir));
        let queue = OfflineQueue::open(store, config.queue.storage_key.clone())
            .with_context(|| format!("failed to open offline queue {}", config.queue_file().display()))?
            .into_shared();
        let backend: Arc<dyn LocationBackend> = Arc::new(RestBackend::new(&config.backend));
        let connectivity = ConnectivityMonitor::new(config.connectivity.assume_online);
        let pipeline = Arc::new(SubmissionPipeline::new(backend.clone(), queue, connectivity));

        Ok(Self {
            config,
            backend,
            pipeline,
        })
    }

    fn probe(&self) -> ConnectivityProbe {
        ConnectivityProbe::new(
            self.backend.clone(),
            self.pipeline.connectivity().clone(),
            Duration::from_millis(self.config.connectivity.probe_interval_ms),
        )
    }

    async fn record(&self, args: RecordArgs) -> Result<()> {
        let provider: Arc<dyn PositionProvider> = match &args.fixes {
            Some(path) => Arc::new(
                FixLogProvider::open(path)
                    .with_context(|| format!("failed to read fix log {}", path.display()))?,
            ),
            None => Arc::new(FixLogProvider::default()),
        };

        let mut recorder =
            LocationRecorder::begin(UnitId::new(args.unit.clone()), provider, &self.config);
        match args.manual_coordinate() {
            Some(pin) => {
                recorder.set_manual_position(MapInteraction::Click(pin))?;
            }
            None => sample_until_settled(&mut recorder).await,
        }

        let capture = recorder.finalize(args.notes.clone())?;
        if let Some(accuracy_m) = capture.accuracy_m() {
            println!(
                "Unit {}: {} (±{:.0} m, {}, {:?})",
                capture.unit_id(),
                capture.coordinate(),
                accuracy_m,
                AccuracyGrade::from_meters(accuracy_m),
                capture.source()
            );
        }

        self.probe().probe_once().await;
        match self.pipeline.submit(&capture).await? {
            SubmitOutcome::Recorded {
                record,
                recorded_by,
            } => {
                println!(
                    "{} (record {}, by {})",
                    record.message.as_deref().unwrap_or("Location recorded."),
                    record.record_id.as_deref().unwrap_or("-"),
                    recorded_by
                );
            }
            outcome @ SubmitOutcome::Queued { .. } => println!("{}", outcome.user_message()),
        }
        Ok(())
    }

    async fn list_queue(&self) -> Result<()> {
        let entries = {
            let mut queue = self.pipeline.queue().lock().await;
            queue.refresh()?;
            queue.list()
        };
        if entries.is_empty() {
            println!("No locations waiting to sync.");
            return Ok(());
        }

        println!("{} location(s) waiting to sync:", entries.len());
        for (i, entry) in entries.iter().enumerate() {
            let capture = &entry.capture;
            println!(
                "{:>3}. {}  unit {}  {}  {:?}{}",
                i + 1,
                entry.enqueued_at.format("%Y-%m-%d %H:%M:%S"),
                capture.unit_id(),
                capture.coordinate(),
                capture.source(),
                capture.notes().map(|n| format!("  \"{}\"", n)).unwrap_or_default()
            );
        }
        Ok(())
    }

    async fn sync(&self) -> Result<()> {
        if !self.probe().probe_once().await {
            let pending = self.pending().await?;
            println!("Offline, {} location(s) still pending.", pending);
            return Ok(());
        }
        let report = QueueReplayer::new(self.pipeline.clone()).replay().await;
        println!("{}", report_summary(&report));
        Ok(())
    }

    async fn watch(&self) -> Result<()> {
        let probe = self.probe();
        let replayer = QueueReplayer::new(self.pipeline.clone()).with_recheck(Duration::from_millis(
            self.config.connectivity.probe_interval_ms,
        ));
        let (stop_tx, stop_rx) = watch::channel(false);

        info!(
            "Watching connectivity every {} ms, press Ctrl+C to exit",
            self.config.connectivity.probe_interval_ms
        );

        tokio::join!(
            probe.run(stopped(stop_rx.clone())),
            replayer.run(stopped(stop_rx)),
            async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Failed to listen for Ctrl+C: {}", e);
                }
                info!("Received Ctrl+C, shutting down...");
                let _ = stop_tx.send(true);
            },
        );

        let pending = self.pending().await?;
        info!("Stopped with {} location(s) pending", pending);
        Ok(())
    }

    /// Stored queue length, including captures queued by other processes
    async fn pending(&self) -> Result<usize> {
        let mut queue = self.pipeline.queue().lock().await;
        queue.refresh()?;
        Ok(queue.count())
    }
}

/// Sample until the fix settles or the device gives up
///
/// Timeouts keep the watch running; anything else ends sampling and leaves
/// the best fix so far, if any, for finalization.
async fn sample_until_settled(recorder: &mut LocationRecorder) {
    loop {
        match recorder.settle().await {
            Ok(()) => break,
            Err(e) if e.is_retryable() && recorder.is_sampling() => {
                warn!("{} Still sampling.", e.user_message());
            }
            Err(e) => {
                warn!("{}", e.user_message());
                break;
            }
        }
    }
    if let Some(best) = recorder.session().best_accuracy_m() {
        info!(
            "Best fix ±{:.1} m after {} samples",
            best,
            recorder.session().samples_seen()
        );
    }
}

async fn stopped(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            break;
        }
    }
}

fn report_summary(report: &ReplayReport) -> String {
    let mut line = format!(
        "{} location(s) synced, {} pending",
        report.replayed, report.remaining
    );
    match &report.stopped {
        None => {}
        Some(ReplayStop::AlreadyRunning) => line.push_str(" (another sync is running)"),
        Some(ReplayStop::WentOffline) => line.push_str(" (went offline)"),
        Some(ReplayStop::Unreachable(reason)) => {
            line.push_str(&format!(" (backend unreachable: {})", reason))
        }
        Some(ReplayStop::Rejected { unit_id, message }) => {
            line.push_str(&format!(" (unit {} refused: {})", unit_id, message))
        }
        Some(ReplayStop::Storage(reason)) => {
            line.push_str(&format!(" (queue write failed: {})", reason))
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[queue]\nstorage_key = \"yard-queue\"").unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.queue.storage_key, "yard-queue");
        assert_eq!(config.geolocation.timeout_ms, 30000);
    }

    #[test]
    fn test_load_config_missing_file_names_path() {
        let err = load_config(Some(Path::new("/nonexistent/unit-locator.toml"))).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/unit-locator.toml"));
    }

    #[test]
    fn test_report_summary_complete() {
        let report = ReplayReport {
            replayed: 3,
            remaining: 0,
            stopped: None,
        };
        assert_eq!(report_summary(&report), "3 location(s) synced, 0 pending");
    }

    #[test]
    fn test_report_summary_rejected() {
        let report = ReplayReport {
            replayed: 1,
            remaining: 2,
            stopped: Some(ReplayStop::Rejected {
                unit_id: UnitId::new("T-9"),
                message: "Unit is archived".to_string(),
            }),
        };
        assert_eq!(
            report_summary(&report),
            "1 location(s) synced, 2 pending (unit T-9 refused: Unit is archived)"
        );
    }

    #[tokio::test]
    async fn test_stopped_resolves_on_signal() {
        let (tx, rx) = watch::channel(false);
        let wait = tokio::spawn(stopped(rx));
        tx.send(true).unwrap();
        wait.await.unwrap();
    }
}
