//! Configuration for the mediamon binary.
//!
//! Settings come from, in order: an explicit file, `$MEDIAMON_CONFIG_PATH`,
//! inline JSON in `$MEDIAMON_CONFIG_JSON`, or built-in defaults. Command-line
//! flags are layered on top by the caller.

use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, anyhow};
use mediamon_core::{Filter, MAX_BATCH_EVENTS, ShellRunner, WatchConfig};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const CONFIG_PATH_ENV: &str = "MEDIAMON_CONFIG_PATH";
pub const CONFIG_JSON_ENV: &str = "MEDIAMON_CONFIG_JSON";

/// Where the loaded settings came from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    #[default]
    Default,
    File(PathBuf),
    EnvPath(PathBuf),
    EnvInline,
}

/// One program and the extensions it should run on.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FilterSettings {
    /// Program path, optionally followed by fixed arguments.
    pub program: String,
    /// Extensions including the leading dot, e.g. `".mkv"`.
    #[serde(default)]
    pub extensions: Vec<String>,
}

impl From<&FilterSettings> for Filter {
    fn from(settings: &FilterSettings) -> Self {
        Filter::new(settings.program.clone(), settings.extensions.clone())
    }
}

/// Top-level monitor settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Quiet period (ms) after the last filesystem event before a batch is
    /// handed to the filters. Larger values coalesce bursts of copies.
    pub latency_ms: u64,
    /// A batch is flushed early once this many events are queued.
    pub max_batch_events: usize,
    /// Shell used to run `<program> <file>`.
    pub shell: PathBuf,
    pub folders: Vec<PathBuf>,
    pub filters: Vec<FilterSettings>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        let watch = WatchConfig::default();
        Self {
            latency_ms: watch.latency.as_millis() as u64,
            max_batch_events: watch.max_batch_events,
            shell: PathBuf::from("/bin/sh"),
            folders: Vec::new(),
            filters: Vec::new(),
        }
    }
}

impl MonitorSettings {
    /// Loads settings from `explicit` when given, otherwise from the
    /// environment.
    pub fn load(
        explicit: Option<&Path>,
    ) -> anyhow::Result<(Self, ConfigSource)> {
        if let Some(path) = explicit {
            let settings = Self::load_from_file(path)?;
            return Ok((settings, ConfigSource::File(path.to_path_buf())));
        }
        Self::load_from_env()
    }

    /// Evaluation order:
    /// 1) `$MEDIAMON_CONFIG_PATH` (TOML or JSON file),
    /// 2) `$MEDIAMON_CONFIG_JSON` (inline JSON),
    /// 3) defaults if neither is set.
    pub fn load_from_env() -> anyhow::Result<(Self, ConfigSource)> {
        if let Ok(path_str) = env::var(CONFIG_PATH_ENV)
            && !path_str.trim().is_empty()
        {
            let path = PathBuf::from(path_str);
            let settings = Self::load_from_file(&path)?;
            return Ok((settings, ConfigSource::EnvPath(path)));
        }

        if let Ok(raw) = env::var(CONFIG_JSON_ENV)
            && !raw.trim().is_empty()
        {
            let parsed = Self::parse_json(&raw)
                .with_context(|| format!("failed to parse {CONFIG_JSON_ENV}"))?;
            return Ok((parsed, ConfigSource::EnvInline));
        }

        debug!("no monitor config provided; using defaults");
        Ok((Self::default(), ConfigSource::Default))
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path).with_context(|| {
            format!("failed to read monitor config from {}", path.display())
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::parse_json(&contents).with_context(|| {
                format!("invalid monitor config {}", path.display())
            }),
            Some("toml") => toml::from_str(&contents).map_err(|err| {
                anyhow!("invalid monitor config {}: {}", path.display(), err)
            }),
            _ => Self::parse_from_str(&contents, &path.display().to_string()),
        }
    }

    /// Tries TOML first, then JSON.
    pub fn parse_from_str(
        contents: &str,
        origin: &str,
    ) -> anyhow::Result<Self> {
        toml::from_str(contents).or_else(|toml_err| {
            serde_json::from_str(contents).map_err(|json_err| {
                anyhow!(
                    "failed to parse monitor config {}: toml error: {}; json error: {}",
                    origin,
                    toml_err,
                    json_err
                )
            })
        })
    }

    pub fn parse_json(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str(raw)
            .map_err(|err| anyhow!("invalid monitor config json: {err}"))
    }

    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }

    /// Batching knobs for the core; `max_batch_events` is clamped to
    /// `1..=MAX_BATCH_EVENTS`.
    pub fn watch_config(&self) -> WatchConfig {
        let max_batch_events =
            self.max_batch_events.clamp(1, MAX_BATCH_EVENTS);
        if max_batch_events != self.max_batch_events {
            warn!(
                configured = self.max_batch_events,
                used = max_batch_events,
                "max_batch_events out of range; clamped"
            );
        }
        WatchConfig {
            latency: self.latency(),
            max_batch_events,
        }
    }

    pub fn runner(&self) -> ShellRunner {
        ShellRunner::new(self.shell.clone())
    }

    pub fn filters(&self) -> Vec<Filter> {
        self.filters.iter().map(Filter::from).collect()
    }
}
