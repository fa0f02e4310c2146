// Accounting rules and cumulative per-port byte counters via iptables

mod iptables;

pub use iptables::parse_counter;

use crate::models::Direction;
use crate::pipeline::{CommandRunner, CommandSpec, PipelineError};
use tracing::{debug, info, instrument, warn};

/// Binary used when none is configured.
pub const DEFAULT_BINARY: &str = "iptables";

/// Bound on deletes per (chain, match) so a misbehaving subsystem cannot spin forever.
const MAX_STALE_RULES: usize = 16;

/// A counter read that yielded no usable value for this cycle.
#[derive(Debug, thiserror::Error)]
pub enum CounterError {
    #[error("counter query for port {port} ({direction}) failed: {source}")]
    Pipeline {
        port: u16,
        direction: Direction,
        source: PipelineError,
    },
    #[error("counter for port {port} ({direction}) is not a non-negative integer: {text:?}")]
    Parse {
        port: u16,
        direction: Direction,
        text: String,
    },
}

/// An accounting rule could not be changed. Logged only; the port just yields no counters.
#[derive(Debug, thiserror::Error)]
#[error("`{command}` failed: {source}")]
pub struct RuleError {
    pub command: String,
    pub source: PipelineError,
}

pub struct AccountingRepo<R> {
    runner: R,
    binary: String,
}

impl<R: CommandRunner> AccountingRepo<R> {
    pub fn new(runner: R, binary: impl Into<String>) -> Self {
        Self {
            runner,
            binary: binary.into(),
        }
    }

    /// Removes stale rules for every port, then appends exactly one inbound and one
    /// outbound rule per port. Safe to call repeatedly.
    #[instrument(skip_all, fields(repo = "accounting", operation = "install_rules"))]
    pub async fn install_rules(&self, ports: &[u16]) {
        for &port in ports {
            info!(port, "installing accounting rules");
            self.purge_port(port).await;
            for direction in [Direction::Inbound, Direction::Outbound] {
                let cmd = iptables::append_rule(&self.binary, direction, port);
                if let Err(e) = self.mutate(cmd).await {
                    warn!(port, %direction, error = %e, "accounting rule install failed");
                }
            }
        }
    }

    #[instrument(skip_all, fields(repo = "accounting", operation = "remove_rules"))]
    pub async fn remove_rules(&self, ports: &[u16]) {
        for &port in ports {
            info!(port, "removing accounting rules");
            self.purge_port(port).await;
        }
    }

    /// Reads the cumulative byte counter of the rule for `port` in `direction`.
    pub async fn read_counter(&self, port: u16, direction: Direction) -> Result<i64, CounterError> {
        let stages = iptables::counter_pipeline(&self.binary, port, direction);
        let text = self
            .runner
            .run(&stages)
            .await
            .map_err(|source| CounterError::Pipeline {
                port,
                direction,
                source,
            })?;
        parse_counter(&text).ok_or_else(|| CounterError::Parse {
            port,
            direction,
            text: text.trim().to_string(),
        })
    }

    // Deletes until iptables reports no matching rule; stacked duplicates would inflate counters.
    async fn purge_port(&self, port: u16) {
        for (chain, flag) in iptables::RULE_PATTERNS {
            for removed in 0..MAX_STALE_RULES {
                let cmd = iptables::delete_rule(&self.binary, chain, flag, port);
                if let Err(e) = self.mutate(cmd).await {
                    debug!(port, chain, flag, removed, error = %e, "no more rules to delete");
                    break;
                }
            }
        }
    }

    // Rule mutations print nothing on success.
    async fn mutate(&self, cmd: CommandSpec) -> Result<(), RuleError> {
        match self.runner.run(std::slice::from_ref(&cmd)).await {
            Ok(_) | Err(PipelineError::NoOutput) => Ok(()),
            Err(source) => Err(RuleError {
                command: cmd.to_string(),
                source,
            }),
        }
    }
}
