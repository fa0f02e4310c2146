use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub collector: CollectorConfig,
    #[serde(default)]
    pub accounting: AccountingConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    /// TCP ports whose traffic is accounted.
    pub ports: Vec<u16>,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Outbound sample queue size; the default holds one hour of per-second samples.
    #[serde(default = "default_sample_queue_capacity")]
    pub sample_queue_capacity: usize,
    /// How often to log app stats (published/dropped samples, state) at INFO level.
    #[serde(default = "default_stats_log_interval_secs")]
    pub stats_log_interval_secs: u64,
}

fn default_interval_secs() -> u64 {
    1
}

fn default_sample_queue_capacity() -> usize {
    60 * 60
}

fn default_stats_log_interval_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountingConfig {
    #[serde(default = "default_binary")]
    pub binary: String,
    /// Per-stage timeout for every external command.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

impl Default for AccountingConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

fn default_binary() -> String {
    crate::accounting_repo::DEFAULT_BINARY.into()
}

fn default_command_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// JSON file holding the `{"open": bool}` directive. When unset the directive lives
    /// in memory and is flipped by the HTTP control endpoints.
    #[serde(default)]
    pub directive_file: Option<String>,
    /// Directive text the in-memory source starts with.
    #[serde(default = "default_initial_directive")]
    pub initial_directive: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            directive_file: None,
            initial_directive: default_initial_directive(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_initial_directive() -> String {
    r#"{"open":true}"#.into()
}

/// Log output in addition to stdout. The file is rotated daily.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: String,
    /// File name prefix; `None` logs to stdout only.
    #[serde(default = "default_log_file")]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            file: default_log_file(),
        }
    }
}

fn default_log_dir() -> String {
    ".".into()
}

fn default_log_file() -> Option<String> {
    Some("netflow.log".into())
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        let mut config: AppConfig = toml::from_str(&s)?;
        if let Ok(ports) = std::env::var("PORTS") {
            config.collector.ports = parse_port_list(&ports);
        }
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            !self.collector.ports.is_empty(),
            "collector.ports must list at least one port"
        );
        anyhow::ensure!(
            self.collector.ports.iter().all(|p| *p > 0),
            "collector.ports must be between 1 and 65535, got {:?}",
            self.collector.ports
        );
        anyhow::ensure!(
            self.collector.interval_secs >= 1,
            "collector.interval_secs must be >= 1, got {}",
            self.collector.interval_secs
        );
        anyhow::ensure!(
            self.collector.sample_queue_capacity > 0,
            "collector.sample_queue_capacity must be > 0, got {}",
            self.collector.sample_queue_capacity
        );
        anyhow::ensure!(
            self.collector.stats_log_interval_secs > 0,
            "collector.stats_log_interval_secs must be > 0, got {}",
            self.collector.stats_log_interval_secs
        );
        anyhow::ensure!(
            !self.accounting.binary.is_empty(),
            "accounting.binary must be non-empty"
        );
        anyhow::ensure!(
            self.accounting.command_timeout_ms > 0,
            "accounting.command_timeout_ms must be > 0, got {}",
            self.accounting.command_timeout_ms
        );
        anyhow::ensure!(
            self.remote.poll_interval_secs > 0,
            "remote.poll_interval_secs must be > 0, got {}",
            self.remote.poll_interval_secs
        );
        anyhow::ensure!(
            self.logging.file.as_deref().is_none_or(|f| !f.is_empty()),
            "logging.file must be non-empty when set"
        );
        Ok(())
    }
}

/// Parses a comma separated port list ("8080,18080"); entries that are not valid
/// positive ports are skipped.
pub fn parse_port_list(s: &str) -> Vec<u16> {
    s.split(',')
        .filter_map(|p| p.trim().parse::<u16>().ok())
        .filter(|p| *p > 0)
        .collect()
}
