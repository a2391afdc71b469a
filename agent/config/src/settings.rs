//! Local process settings: defaults, optional JSON settings file, env
//! overrides. Only the resulting values are consumed elsewhere.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use docagent_core::OperationalMode;

const SETTINGS_FILE_NAME: &str = "settings.json";

/// Resolve the docagent config directory.
/// Priority: `DOCAGENT_CONFIG_DIR` env > platform config dir > `.docagent`.
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("DOCAGENT_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    if let Some(base) = dirs::config_dir() {
        return base.join("docagent");
    }
    PathBuf::from(".docagent")
}

pub fn settings_file_path(config_dir: &Path) -> PathBuf {
    config_dir.join(SETTINGS_FILE_NAME)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Admin backend base URL (configuration, commands, client log, results).
    pub admin_base_url: String,
    /// OCR processing service base URL.
    pub processing_base_url: String,
    /// Identity this instance reports and is configured under.
    pub machine_id: String,
    /// Command listener port.
    pub port: u16,
    /// Mode to start in before the first configuration fetch lands.
    pub operational_mode: OperationalMode,
    /// Default background poll frequency in hours.
    pub polling_frequency: u32,
    /// Floor for the effective poll timer.
    pub min_poll_interval_secs: u64,
    pub ocr_language: String,
    pub ocr_engine: String,
    /// Where captured/received document images are written and read back.
    /// Defaults to `<documents>/FileFolder`.
    pub watch_folder: Option<PathBuf>,
    /// Canned still image served when no driver backend is compiled in.
    pub capture_fixture: Option<PathBuf>,
    pub log_level: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            admin_base_url: "http://localhost:3000/api".to_string(),
            processing_base_url: "http://localhost:8000".to_string(),
            machine_id: default_machine_id(),
            port: 8080,
            operational_mode: OperationalMode::Standalone,
            polling_frequency: 1,
            min_poll_interval_secs: 600,
            ocr_language: "eng".to_string(),
            ocr_engine: "tesseract".to_string(),
            watch_folder: None,
            capture_fixture: None,
            log_level: "info".to_string(),
        }
    }
}

fn default_machine_id() -> String {
    std::env::var("COMPUTERNAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| "local".to_string())
}

impl AppSettings {
    /// Load settings: file if present, then env overrides on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(PathBuf::from)
            .unwrap_or_else(|| settings_file_path(&config_dir()));

        let mut settings = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings file {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse settings file {}", path.display()))?
        } else {
            debug!(path = %path.display(), "settings file absent; using defaults");
            Self::default()
        };

        settings.apply_env_overrides();
        Ok(settings)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("DOCAGENT_ADMIN_URL") {
            self.admin_base_url = url;
        }
        if let Ok(url) = std::env::var("DOCAGENT_OCR_URL") {
            self.processing_base_url = url;
        }
        if let Ok(id) = std::env::var("DOCAGENT_MACHINE_ID") {
            self.machine_id = id;
        }
        if let Ok(port) = std::env::var("DOCAGENT_PORT") {
            if let Ok(port) = port.parse() {
                self.port = port;
            }
        }
        if let Ok(mode) = std::env::var("DOCAGENT_MODE") {
            if let Ok(mode) = mode.parse() {
                self.operational_mode = mode;
            }
        }
        if let Ok(level) = std::env::var("RUST_LOG") {
            self.log_level = level;
        }
    }

    pub fn watch_folder(&self) -> PathBuf {
        self.watch_folder.clone().unwrap_or_else(|| {
            dirs::document_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("FileFolder")
        })
    }
}
