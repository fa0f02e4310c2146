use anyhow::Result;
use netflow::*;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc, oneshot};
use tokio::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

/// Logs to stdout and, when configured, to a daily-rotated file. The returned guard
/// flushes the file writer and must live until exit.
fn init_tracing(logging: &config::LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (file_layer, guard) = match &logging.file {
        Some(file) => {
            let appender = tracing_appender::rolling::daily(&logging.dir, file);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_timer(LocalTimer)
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_timer(LocalTimer))
        .with(file_layer)
        .init();
    guard
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(
            tokio::signal::unix::SignalKind::terminate(),
        ) {
            Ok(s) => s,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let app_config = config::AppConfig::load()?;
    let _log_guard = init_tracing(&app_config.logging);
    tracing::info!(ports = ?app_config.collector.ports, "start netflow");

    let runner = pipeline::SystemRunner::new(Duration::from_millis(
        app_config.accounting.command_timeout_ms,
    ));
    let repo = accounting_repo::AccountingRepo::new(runner, app_config.accounting.binary.clone());
    let engine = Arc::new(engine::FlowEngine::new(
        repo,
        &app_config.collector.ports,
        app_config.collector.interval_secs,
    ));

    let (sample_tx, sample_rx) = mpsc::channel(app_config.collector.sample_queue_capacity);
    let latest: worker::LatestSample = Arc::new(RwLock::new(None));
    let consumer_handle = worker::spawn_sample_consumer(sample_rx, latest.clone());

    let (worker_shutdown_tx, worker_shutdown_rx) = oneshot::channel();
    let worker_handle = worker::spawn(
        worker::WorkerDeps {
            engine: engine.clone(),
            sample_tx,
            stats: Arc::new(worker::WorkerStats::default()),
            shutdown_rx: worker_shutdown_rx,
        },
        worker::WorkerConfig {
            stats_log_interval_secs: app_config.collector.stats_log_interval_secs,
        },
    );

    let directive = remote_config::SharedDirective::new(app_config.remote.initial_directive.clone());
    let poll_interval = Duration::from_secs(app_config.remote.poll_interval_secs);
    let (poller_shutdown_tx, poller_shutdown_rx) = oneshot::channel();
    let poller_handle = match &app_config.remote.directive_file {
        Some(path) => remote_config::spawn_config_poller(
            remote_config::FileDirective::new(path),
            engine.clone(),
            poll_interval,
            poller_shutdown_rx,
        ),
        None => remote_config::spawn_config_poller(
            directive.clone(),
            engine.clone(),
            poll_interval,
            poller_shutdown_rx,
        ),
    };

    let app = routes::app(engine.clone(), directive, latest);
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server stopped");
            }
        }
        _ = wait_for_shutdown_signal() => {
            tracing::info!("Received shutdown signal");
        }
    }

    let _ = poller_shutdown_tx.send(());
    let _ = poller_handle.await;
    let _ = worker_shutdown_tx.send(());
    let _ = worker_handle.await;
    // The worker dropped its sender, so the consumer drains what is queued and exits.
    let _ = consumer_handle.await;
    engine.shutdown().await;
    tracing::info!("Netflow Exit");

    Ok(())
}
