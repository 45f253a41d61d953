use anyhow::{Context, Result};
use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::event::TimerEvent;
use crate::policy::{MAX_MINUTES, MIN_MINUTES};

pub const MIN_TICK_INTERVAL_MS: u64 = 100;
pub const MAX_TICK_INTERVAL_MS: u64 = 10_000;
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;
pub const MAX_GRACE_PERIOD_SECS: u64 = 60;
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 2;
pub const DEFAULT_CLOSE_AFTER_MINUTES: u32 = 10;
pub const DEFAULT_RUN_EVERY_MINUTES: u32 = 30;

/// Root configuration structure. Deserialized from `<config dir>/script-timer/config.toml`.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub defaults: PolicyDefaults,
}

/// Timing knobs for the tick loop and process termination.
#[derive(Debug, Deserialize, Clone)]
pub struct GeneralConfig {
    /// How often policies are evaluated, in milliseconds. Clamped to [100, 10000].
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Seconds a process gets to honour a stop request before it is killed.
    /// Clamped to [0, 60].
    #[serde(default = "default_grace_period")]
    pub grace_period_secs: u64,
    /// Whether to mirror the session status into status.toml.
    #[serde(default = "default_true")]
    pub write_status: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            grace_period_secs: DEFAULT_GRACE_PERIOD_SECS,
            write_status: true,
        }
    }
}

impl GeneralConfig {
    pub fn effective_tick_interval(&self) -> Duration {
        Duration::from_millis(
            self.tick_interval_ms
                .clamp(MIN_TICK_INTERVAL_MS, MAX_TICK_INTERVAL_MS),
        )
    }

    pub fn effective_grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs.min(MAX_GRACE_PERIOD_SECS))
    }
}

/// Values the console offers when the user leaves a prompt blank.
#[derive(Debug, Deserialize, Clone)]
pub struct PolicyDefaults {
    #[serde(default = "default_close_after")]
    pub close_after_minutes: u32,
    #[serde(default = "default_run_every")]
    pub run_every_minutes: u32,
}

impl Default for PolicyDefaults {
    fn default() -> Self {
        Self {
            close_after_minutes: DEFAULT_CLOSE_AFTER_MINUTES,
            run_every_minutes: DEFAULT_RUN_EVERY_MINUTES,
        }
    }
}

impl PolicyDefaults {
    pub fn effective_close_after(&self) -> u32 {
        self.close_after_minutes.clamp(MIN_MINUTES, MAX_MINUTES)
    }

    pub fn effective_run_every(&self) -> u32 {
        self.run_every_minutes.clamp(MIN_MINUTES, MAX_MINUTES)
    }
}

/// Loads the config file at `path`, returning `Config::default()` if the file does not exist.
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Watches the parent directory of `path`. Whenever the config file is created
/// or modified it is reloaded and a `ConfigReloaded` event is sent.
pub async fn watch_config(path: PathBuf, tx: mpsc::Sender<TimerEvent>) {
    let (watch_tx, mut watch_rx) = mpsc::channel::<notify::Event>(16);

    let mut watcher = match RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = watch_tx.blocking_send(event);
            }
        },
        NotifyConfig::default(),
    ) {
        Ok(w) => w,
        Err(e) => {
            tracing::warn!(error = %e, "failed to create config watcher");
            return;
        }
    };

    // Editors often save by writing a new file and renaming it over the old
    // one, which only shows up on the directory.
    let Some(watch_dir) = path.parent().map(Path::to_path_buf) else {
        tracing::warn!(path = %path.display(), "config path has no parent directory");
        return;
    };

    if let Err(e) = watcher.watch(&watch_dir, RecursiveMode::NonRecursive) {
        tracing::warn!(dir = %watch_dir.display(), error = %e, "failed to watch config directory");
        return;
    }

    while let Some(event) = watch_rx.recv().await {
        let affects_config = event.paths.iter().any(|p| p == path.as_path());
        let is_write = matches!(
            event.kind,
            notify::EventKind::Create(_) | notify::EventKind::Modify(_)
        );

        if affects_config && is_write {
            match load_or_default(&path) {
                Ok(config) => {
                    if tx.send(TimerEvent::ConfigReloaded(config)).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!("failed to reload config: {e:#}"),
            }
        }
    }
}

fn default_tick_interval() -> u64 {
    DEFAULT_TICK_INTERVAL_MS
}

fn default_grace_period() -> u64 {
    DEFAULT_GRACE_PERIOD_SECS
}

fn default_true() -> bool {
    true
}

fn default_close_after() -> u32 {
    DEFAULT_CLOSE_AFTER_MINUTES
}

fn default_run_every() -> u32 {
    DEFAULT_RUN_EVERY_MINUTES
}
