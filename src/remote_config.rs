// Periodic open/closed directive poll that drives the engine's enable/disable.
// Any fetch or parse failure resolves to Directive::Unknown, which disables collection.

use crate::engine::FlowEngine;
use crate::models::Directive;
use crate::pipeline::CommandRunner;
use serde::Deserialize;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{RwLock, oneshot};
use tokio::time::{Duration, interval};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("directive source unreachable: {0}")]
    Unreachable(#[source] std::io::Error),
    #[error("malformed directive: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Only `open` matters; the rest of the remote document is ignored.
#[derive(Debug, Deserialize)]
struct FlowDirective {
    open: bool,
}

pub fn parse_directive(text: &str) -> Result<Directive, ConfigError> {
    let directive: FlowDirective = serde_json::from_str(text)?;
    Ok(if directive.open {
        Directive::Open
    } else {
        Directive::Closed
    })
}

/// Collapses a fetch result into a directive, logging failures.
pub fn resolve(fetched: Result<String, ConfigError>) -> Directive {
    match fetched.and_then(|text| parse_directive(&text)) {
        Ok(directive) => directive,
        Err(e) => {
            tracing::warn!(error = %e, "config poll failed; collection will be disabled");
            Directive::Unknown
        }
    }
}

/// Provider of the raw directive document.
pub trait DirectiveSource: Send + Sync {
    fn fetch(&self) -> impl Future<Output = Result<String, ConfigError>> + Send;
}

/// In-memory directive text shared with the HTTP control endpoints.
#[derive(Debug, Clone)]
pub struct SharedDirective(Arc<RwLock<String>>);

impl SharedDirective {
    pub fn new(initial: impl Into<String>) -> Self {
        Self(Arc::new(RwLock::new(initial.into())))
    }

    pub async fn set(&self, text: impl Into<String>) {
        *self.0.write().await = text.into();
    }

    pub async fn set_open(&self, open: bool) {
        self.set(serde_json::json!({ "open": open }).to_string()).await;
    }

    pub async fn get(&self) -> String {
        self.0.read().await.clone()
    }
}

impl DirectiveSource for SharedDirective {
    async fn fetch(&self) -> Result<String, ConfigError> {
        Ok(self.get().await)
    }
}

/// Directive read from a JSON file on every poll.
#[derive(Debug, Clone)]
pub struct FileDirective {
    path: PathBuf,
}

impl FileDirective {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DirectiveSource for FileDirective {
    async fn fetch(&self) -> Result<String, ConfigError> {
        tokio::fs::read_to_string(&self.path)
            .await
            .map_err(ConfigError::Unreachable)
    }
}

/// Fetches once and applies the result: Open enables, Closed and Unknown disable.
pub async fn poll_once<S, R>(source: &S, engine: &FlowEngine<R>) -> Directive
where
    S: DirectiveSource,
    R: CommandRunner,
{
    tracing::debug!("sync config");
    let directive = resolve(source.fetch().await);
    if directive.wants_collection() {
        engine.enable().await;
    } else {
        engine.disable().await;
    }
    directive
}

/// Polls `source` every `poll_interval` (first poll immediately) until shutdown.
pub fn spawn_config_poller<S, R>(
    source: S,
    engine: Arc<FlowEngine<R>>,
    poll_interval: Duration,
    mut shutdown_rx: oneshot::Receiver<()>,
) -> tokio::task::JoinHandle<()>
where
    S: DirectiveSource + 'static,
    R: CommandRunner + 'static,
{
    tokio::spawn(async move {
        let mut tick = interval(poll_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let directive = poll_once(&source, engine.as_ref()).await;
                    tracing::debug!(?directive, state = ?engine.state(), "config applied");
                }
                _ = &mut shutdown_rx => {
                    tracing::debug!("Config poller shutting down");
                    break;
                }
            }
        }
    })
}
