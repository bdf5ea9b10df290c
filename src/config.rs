use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::earn::EarnLoopConfig;
use crate::notify::{DEFAULT_URL_PATTERN, NotifierConfig};
use crate::session::{DEFAULT_BASE_URL, PanelConfig};
use crate::supervisor::SupervisorConfig;

/// Environment variable overriding `worker.interval_ms`
pub const INTERVAL_ENV: &str = "INTERVAL_MS";

/// Environment variable overriding `notifier.default_webhook`
pub const WEBHOOK_ENV: &str = "DISCORD_WEBHOOK";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub worker: WorkerConfig,
    pub panel: PanelSection,
    pub notifier: NotifierSection,
    pub storage: StorageConfig,
    pub status: StatusConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub interval_ms: u64,
    pub restart_delay_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 60000,
            restart_delay_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelSection {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for PanelSection {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_ms: 30000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierSection {
    pub default_webhook: Option<String>,
    pub timeout_ms: u64,
    pub url_pattern: String,
}

impl Default for NotifierSection {
    fn default() -> Self {
        Self {
            default_webhook: None,
            timeout_ms: 10000,
            url_pattern: DEFAULT_URL_PATTERN.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(env!("CARGO_PKG_NAME")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    pub report_interval_secs: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: 60,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            worker: WorkerConfig::default(),
            panel: PanelSection::default(),
            notifier: NotifierSection::default(),
            storage: StorageConfig::default(),
            status: StatusConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain, then apply env overrides
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Self::load_file_chain(config_path)?;
        config.apply_overrides(std::env::var(INTERVAL_ENV).ok(), std::env::var(WEBHOOK_ENV).ok())?;
        Ok(config)
    }

    fn load_file_chain(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Apply `INTERVAL_MS` / `DISCORD_WEBHOOK` style overrides
    pub fn apply_overrides(&mut self, interval_ms: Option<String>, webhook: Option<String>) -> Result<()> {
        if let Some(raw) = interval_ms.filter(|v| !v.trim().is_empty()) {
            self.worker.interval_ms = raw
                .trim()
                .parse()
                .context(format!("{} must be a number of milliseconds, got {:?}", INTERVAL_ENV, raw))?;
        }
        if let Some(url) = webhook.filter(|v| !v.trim().is_empty()) {
            self.notifier.default_webhook = Some(url.trim().to_string());
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker.interval_ms == 0 {
            eyre::bail!("worker.interval_ms must be > 0");
        }
        if self.panel.timeout_ms == 0 {
            eyre::bail!("panel.timeout_ms must be > 0");
        }
        if self.notifier.timeout_ms == 0 {
            eyre::bail!("notifier.timeout_ms must be > 0");
        }
        regex::Regex::new(&self.notifier.url_pattern).context("notifier.url_pattern is not a valid regex")?;
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.worker.interval_ms)
    }

    pub fn panel_config(&self) -> PanelConfig {
        PanelConfig {
            timeout: Duration::from_millis(self.panel.timeout_ms),
            ..PanelConfig::with_base_url(&self.panel.base_url)
        }
    }

    pub fn notifier_config(&self) -> NotifierConfig {
        NotifierConfig {
            default_webhook: self.notifier.default_webhook.clone(),
            timeout: Duration::from_millis(self.notifier.timeout_ms),
            url_pattern: self.notifier.url_pattern.clone(),
        }
    }

    pub fn earn_loop_config(&self) -> EarnLoopConfig {
        EarnLoopConfig::with_interval(self.interval())
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            restart_delay: Duration::from_millis(self.worker.restart_delay_ms),
        }
    }
}
