use std::{env, fmt, fs, path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::monitoring::transport::DEFAULT_USER_AGENT;

/// Environment variable overriding the config file location
pub const CONFIG_ENV_VAR: &str = "NIMBUS_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read config file {path}: {source}")]
    ReadFailed { path: path::PathBuf, source: std::io::Error },

    #[error("failed to write config file {path}: {source}")]
    WriteFailed { path: path::PathBuf, source: std::io::Error },

    #[error("failed to parse config file: {0}")]
    ParseFailed(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),

    #[error("no config path available, set XDG_CONFIG_HOME or HOME")]
    ConfigPathUnavailable,

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub probe: ProbeConfig,
    pub scheduler: SchedulerConfig,
    pub retention: RetentionConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: path::PathBuf,
    pub max_connections: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub timeout_ms: u64,
    /// Bound on establishing the connection alone, 0 leaves it to `timeout_ms`
    pub connect_timeout_ms: u64,
    pub persist_timeout_ms: u64,
    pub dns_cache_ttl_secs: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub days: i64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "nimbus.db".into(), max_connections: 4 }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            connect_timeout_ms: 5_000,
            persist_timeout_ms: 5_000,
            dns_cache_ttl_secs: 300,
            user_agent: DEFAULT_USER_AGENT.into(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { enabled: true, interval_secs: 60 }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { days: 30, sweep_interval_secs: 3600 }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0".into(), port: 8080 }
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        (self.connect_timeout_ms > 0).then(|| Duration::from_millis(self.connect_timeout_ms))
    }

    pub fn persist_timeout(&self) -> Duration {
        Duration::from_millis(self.persist_timeout_ms)
    }

    pub fn dns_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.dns_cache_ttl_secs)
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/nimbus/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Some(config_home) = env::var_os("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::var_os("HOME") {
        path::PathBuf::from(home_dir).join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("nimbus/config.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Database")?;
        write_1(f, "Path", &self.database.path.display())?;
        write_1(f, "Max Connections", &self.database.max_connections)?;
        write_title_1(f, "Probe")?;
        write_1(f, "Timeout (ms)", &self.probe.timeout_ms)?;
        write_1(f, "Connect Timeout (ms)", &self.probe.connect_timeout_ms)?;
        write_1(f, "Persist Timeout (ms)", &self.probe.persist_timeout_ms)?;
        write_1(f, "DNS Cache TTL (s)", &self.probe.dns_cache_ttl_secs)?;
        write_1(f, "User Agent", &self.probe.user_agent)?;
        write_title_1(f, "Scheduler")?;
        write_1(f, "Enabled", &self.scheduler.enabled)?;
        write_1(f, "Interval (s)", &self.scheduler.interval_secs)?;
        write_title_1(f, "Retention")?;
        write_1(f, "Days", &self.retention.days)?;
        write_1(f, "Sweep Interval (s)", &self.retention.sweep_interval_secs)?;
        write_title_1(f, "Server")?;
        write_1(f, "Bind Address", &self.server.bind)?;
        write_1(f, "Port", &self.server.port)?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/nimbus/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        let config = if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| Error::ReadFailed { path: config_path.clone(), source })?;
            toml::from_str::<Self>(raw_string.as_str())?
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            config
        };

        config.validate()?;
        Ok(config)
    }

    /// Load from `$NIMBUS_CONFIG` when set, the default location otherwise
    pub fn from_env() -> Result<Self, Error> {
        Self::from_config(env::var_os(CONFIG_ENV_VAR).map(path::PathBuf::from))
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), Error> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| Error::WriteFailed { path: parent.to_path_buf(), source })?;
        }

        fs::write(path, config_str).map_err(|source| Error::WriteFailed { path: path.to_path_buf(), source })
    }

    /// Reject values that would make probing or pruning meaningless
    pub fn validate(&self) -> Result<(), Error> {
        let checks = [
            (self.database.max_connections == 0, "database.max_connections must be at least 1"),
            (self.probe.timeout_ms == 0, "probe.timeout_ms must be positive"),
            (self.probe.persist_timeout_ms == 0, "probe.persist_timeout_ms must be positive"),
            (self.probe.dns_cache_ttl_secs == 0, "probe.dns_cache_ttl_secs must be positive"),
            (self.probe.user_agent.trim().is_empty(), "probe.user_agent must not be empty"),
            (self.scheduler.interval_secs == 0, "scheduler.interval_secs must be positive"),
            (self.retention.days < 1, "retention.days must be at least 1"),
            (self.retention.sweep_interval_secs == 0, "retention.sweep_interval_secs must be positive"),
        ];

        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, reason)) => Err(Error::Invalid((*reason).to_string())),
            None => Ok(()),
        }
    }
}
