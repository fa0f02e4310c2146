// Chained external commands: each stage's stdout feeds the next stage's stdin.
// Every other module shells out through the CommandRunner seam so tests can fake it.

use futures_util::future::join_all;
use std::fmt;
use std::future::Future;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::time::{Duration, timeout};

/// Upper bound for a single stage when no timeout is configured.
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(5);

/// One external process invocation (no shell involved).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{arg}'")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Pipeline failure; `stage` is the zero-based index of the failing command.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("pipeline has no stages")]
    Empty,
    #[error("stage {stage} `{command}` could not start: {source}")]
    Launch {
        stage: usize,
        command: String,
        source: std::io::Error,
    },
    #[error("stage {stage} `{command}` failed: {status}")]
    Wait {
        stage: usize,
        command: String,
        status: ExitStatus,
    },
    #[error("stage {stage} `{command}` timed out after {timeout:?}")]
    Timeout {
        stage: usize,
        command: String,
        timeout: Duration,
    },
    #[error("stage {stage} `{command}` i/o error: {source}")]
    Io {
        stage: usize,
        command: String,
        source: std::io::Error,
    },
    #[error("pipeline produced no output")]
    NoOutput,
}

/// Executes command pipelines. Implemented by [`SystemRunner`] for real processes.
pub trait CommandRunner: Send + Sync {
    fn run(
        &self,
        stages: &[CommandSpec],
    ) -> impl Future<Output = Result<String, PipelineError>> + Send;
}

/// Runs pipelines as real OS processes, bounding every stage with a timeout.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    stage_timeout: Duration,
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new(DEFAULT_STAGE_TIMEOUT)
    }
}

impl SystemRunner {
    pub fn new(stage_timeout: Duration) -> Self {
        Self { stage_timeout }
    }
}

impl CommandRunner for SystemRunner {
    async fn run(&self, stages: &[CommandSpec]) -> Result<String, PipelineError> {
        run_pipeline(stages, self.stage_timeout).await
    }
}

/// Runs `stages` left to right and returns the last stage's stdout, falling back to the
/// accumulated stderr of all stages when stdout is empty.
///
/// Stages that were already started when another stage fails are killed when dropped;
/// callers must not assume any stage ran to completion on error.
pub async fn run_pipeline(
    stages: &[CommandSpec],
    stage_timeout: Duration,
) -> Result<String, PipelineError> {
    let (stdout, stderr) = execute(stages, stage_timeout).await?;
    if !stdout.is_empty() {
        return Ok(String::from_utf8_lossy(&stdout).into_owned());
    }
    if !stderr.is_empty() {
        return Ok(String::from_utf8_lossy(&stderr).into_owned());
    }
    Err(PipelineError::NoOutput)
}

async fn execute(
    stages: &[CommandSpec],
    stage_timeout: Duration,
) -> Result<(Vec<u8>, Vec<u8>), PipelineError> {
    if stages.is_empty() {
        return Err(PipelineError::Empty);
    }
    let last = stages.len() - 1;

    let mut children: Vec<Child> = Vec::with_capacity(stages.len());
    let mut stderr_readers = Vec::with_capacity(stages.len());
    let mut upstream: Option<Stdio> = None;

    for (stage, spec) in stages.iter().enumerate() {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(upstream.take().unwrap_or_else(Stdio::null))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| PipelineError::Launch {
            stage,
            command: spec.to_string(),
            source,
        })?;

        if let Some(stderr) = child.stderr.take() {
            stderr_readers.push(tokio::spawn(read_all(stderr)));
        }
        if stage < last
            && let Some(stdout) = child.stdout.take()
        {
            let next_stdin =
                TryInto::<Stdio>::try_into(stdout).map_err(|source| PipelineError::Io {
                    stage,
                    command: spec.to_string(),
                    source,
                })?;
            upstream = Some(next_stdin);
        }
        children.push(child);
    }

    let stdout_reader = children
        .last_mut()
        .and_then(|child| child.stdout.take())
        .map(|stdout| tokio::spawn(read_all(stdout)));

    for (stage, (child, spec)) in children.iter_mut().zip(stages).enumerate() {
        let status = match timeout(stage_timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(source)) => {
                return Err(PipelineError::Io {
                    stage,
                    command: spec.to_string(),
                    source,
                });
            }
            Err(_) => {
                let _ = child.start_kill();
                return Err(PipelineError::Timeout {
                    stage,
                    command: spec.to_string(),
                    timeout: stage_timeout,
                });
            }
        };
        if !status.success() {
            return Err(PipelineError::Wait {
                stage,
                command: spec.to_string(),
                status,
            });
        }
    }

    let stdout = match stdout_reader {
        Some(handle) => handle.await.unwrap_or_default(),
        None => Vec::new(),
    };
    let mut stderr = Vec::new();
    for chunk in join_all(stderr_readers).await.into_iter().flatten() {
        stderr.extend_from_slice(&chunk);
    }
    Ok((stdout, stderr))
}

async fn read_all<R: AsyncRead + Unpin>(mut reader: R) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Err(e) = reader.read_to_end(&mut buf).await {
        tracing::debug!(error = %e, "pipeline stream read interrupted");
    }
    buf
}
