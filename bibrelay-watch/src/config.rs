use anyhow::{Context, anyhow, bail};
use bibrelay_core::RetryPolicy;
use bibrelay_core::monitor::DEFAULT_MESSAGE_EXTENSION;
use bibrelay_core::pipeline::DEFAULT_SETTLE_DELAY;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const CONFIG_ENV: &str = "BIBRELAY_WATCH_CONFIG";

fn default_endpoint() -> String {
    "http://localhost:5150".to_string()
}

fn default_extension() -> String {
    DEFAULT_MESSAGE_EXTENSION.to_string()
}

fn default_settle_delay_ms() -> u64 {
    DEFAULT_SETTLE_DELAY.as_millis() as u64
}

fn default_activity_log() -> PathBuf {
    PathBuf::from("logs/bibrelay-watch.log")
}

fn default_autostart() -> bool {
    true
}

/// Where the loaded configuration came from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum WatchConfigSource {
    #[default]
    Default,
    Cli(PathBuf),
    EnvPath(PathBuf),
    File(PathBuf),
}

/// One watched Winlink messages folder.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChannelConfig {
    /// Channel label, usually the station call sign.
    pub name: String,
    /// Directory Winlink Express saves messages into.
    pub path: PathBuf,
    /// Start delivering events as soon as the channel is initialized.
    #[serde(default = "default_autostart")]
    pub autostart: bool,
}

/// Watcher settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Base URL of the ingest service.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Reported as `ClientHostname`; falls back to the machine host name.
    pub origin_host: Option<String>,
    /// Message file extension to watch for.
    #[serde(default = "default_extension")]
    pub extension: String,
    /// How long to wait after a file appears before reading it (ms).
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    pub read_retry: RetryPolicy,
    #[serde(default = "default_activity_log")]
    pub activity_log: PathBuf,
    pub channels: Vec<ChannelConfig>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            origin_host: None,
            extension: default_extension(),
            settle_delay_ms: default_settle_delay_ms(),
            read_retry: RetryPolicy::default(),
            activity_log: default_activity_log(),
            channels: Vec::new(),
        }
    }
}

impl WatchConfig {
    /// Resolve the configuration file.
    /// Evaluation order:
    /// 1) `--config`,
    /// 2) `$BIBRELAY_WATCH_CONFIG`,
    /// 3) `bibrelay-watch.toml` or `config/bibrelay-watch.toml`,
    /// 4) defaults.
    pub fn load(
        cli_path: Option<&Path>,
    ) -> anyhow::Result<(Self, WatchConfigSource)> {
        if let Some(path) = cli_path {
            let config = Self::load_from_file(path)?;
            return Ok((config, WatchConfigSource::Cli(path.to_path_buf())));
        }

        if let Ok(path_str) = env::var(CONFIG_ENV)
            && !path_str.trim().is_empty()
        {
            let path = PathBuf::from(path_str);
            let config = Self::load_from_file(&path)?;
            return Ok((config, WatchConfigSource::EnvPath(path)));
        }

        if let Some(path) = Self::find_default_file() {
            let config = Self::load_from_file(&path)?;
            return Ok((config, WatchConfigSource::File(path)));
        }

        Ok((Self::default(), WatchConfigSource::Default))
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path).with_context(|| {
            format!("failed to read watch config from {}", path.display())
        })?;
        Self::parse_from_str(&contents, &path.display().to_string())
    }

    pub fn parse_from_str(
        contents: &str,
        origin: &str,
    ) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(contents).map_err(|err| {
            anyhow!("invalid watch config {}: {}", origin, err)
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let mut names = HashSet::new();
        for channel in &self.channels {
            if channel.name.trim().is_empty() {
                bail!("channel with path {} has no name", channel.path.display());
            }
            if !names.insert(channel.name.as_str()) {
                bail!("channel {} is configured twice", channel.name);
            }
        }
        if self.extension.trim_start_matches('.').is_empty() {
            bail!("extension must not be empty");
        }
        Ok(())
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn resolved_origin_host(&self) -> String {
        self.origin_host
            .clone()
            .filter(|host| !host.trim().is_empty())
            .or_else(|| env::var("HOSTNAME").ok())
            .or_else(|| env::var("COMPUTERNAME").ok())
            .unwrap_or_else(|| "unknown-host".to_string())
    }

    fn find_default_file() -> Option<PathBuf> {
        const CANDIDATES: &[&str] =
            &["bibrelay-watch.toml", "config/bibrelay-watch.toml"];

        CANDIDATES
            .iter()
            .map(Path::new)
            .find(|path| path.exists())
            .map(|path| path.to_path_buf())
    }
}
