//! Persistence of the selected capture device.
//!
//! The per-user JSON file is the source of truth; in-memory copies are
//! transient reads. Concurrent writers are last-writer-wins.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{debug, info};

use docagent_core::DeviceSelection;

const DEVICE_FILE_NAME: &str = "capture-device.json";

pub fn device_file_path(config_dir: &Path) -> PathBuf {
    config_dir.join(DEVICE_FILE_NAME)
}

/// Write the selection atomically (temp file, rename).
pub async fn save_selection(path: &Path, selection: &DeviceSelection) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(selection)?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, json.as_bytes())
        .await
        .with_context(|| format!("failed to write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("failed to rename into {}", path.display()))?;

    info!(path = %path.display(), device = %selection.name, "capture device saved");
    Ok(())
}

/// Load the persisted selection. Absence is a valid state and returns
/// `Ok(None)`.
pub async fn load_selection(path: &Path) -> Result<Option<DeviceSelection>> {
    if !path.exists() {
        debug!(path = %path.display(), "no capture device persisted");
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let selection = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(selection))
}
