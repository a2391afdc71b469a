use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether the process drives an interactive surface or runs as an
/// unattended agent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OperationalMode {
    #[default]
    #[serde(alias = "Standalone", alias = "STANDALONE")]
    Standalone,
    #[serde(alias = "Headless", alias = "HEADLESS")]
    Headless,
}

impl fmt::Display for OperationalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standalone => write!(f, "standalone"),
            Self::Headless => write!(f, "headless"),
        }
    }
}

impl FromStr for OperationalMode {
    type Err = crate::AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standalone" => Ok(Self::Standalone),
            "headless" => Ok(Self::Headless),
            other => Err(crate::AgentError::Config(format!(
                "unknown operational mode: {other}"
            ))),
        }
    }
}

/// The agent's current operating parameters, fetched from the admin backend.
///
/// A single instance lives for the whole process and is mutated in place by
/// [`OperationalConfig::apply`]; it is never replaced wholesale so observers
/// keep a stable identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationalConfig {
    pub id: i64,
    pub title: String,
    pub location: String,
    pub machine_id: String,
    pub operational_mode: OperationalMode,
    /// Background poll frequency in hours. Zero is legal on the wire; the
    /// effective timer interval is clamped by [`OperationalConfig::poll_interval`].
    pub polling_frequency: u32,
    pub last_fetched: DateTime<Utc>,
    pub is_configured: bool,
}

impl OperationalConfig {
    pub fn new(machine_id: impl Into<String>, mode: OperationalMode, polling_frequency: u32) -> Self {
        Self {
            id: 0,
            title: String::new(),
            location: String::new(),
            machine_id: machine_id.into(),
            operational_mode: mode,
            polling_frequency,
            last_fetched: Utc::now(),
            is_configured: false,
        }
    }

    /// Merge a partial fetch response into this config. Fields the response
    /// does not carry are left untouched.
    pub fn apply(&mut self, patch: ConfigPatch) {
        if let Some(id) = patch.id {
            self.id = id;
        }
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(location) = patch.location {
            self.location = location;
        }
        if let Some(machine_id) = patch.machine_id {
            self.machine_id = machine_id;
        }
        if let Some(mode) = patch.operational_mode {
            self.operational_mode = mode;
        }
        if let Some(freq) = patch.polling_frequency {
            self.polling_frequency = freq;
        }
        self.last_fetched = Utc::now();
        self.is_configured = true;
    }

    /// Effective timer interval for the background poll, clamped so a zero or
    /// tiny configured frequency never produces runaway polling.
    pub fn poll_interval(&self, min: Duration) -> Duration {
        let configured = Duration::from_secs(u64::from(self.polling_frequency) * 3600);
        configured.max(min)
    }
}

/// Partial configuration as returned by
/// `GET {admin}/windows-app-instance/machine/{machineId}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigPatch {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub location: Option<String>,
    pub machine_id: Option<String>,
    pub operational_mode: Option<OperationalMode>,
    pub polling_frequency: Option<u32>,
    #[serde(alias = "availableDevices")]
    pub available_devices: Option<Vec<AvailableDevice>>,
}

/// Device hint element of the config fetch response. The trailing character
/// of `device_name` encodes the device kind: `…0` camera, `…1` scanner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableDevice {
    pub device_name: String,
}

impl AvailableDevice {
    /// Decode the name suffix into a device selection. Returns `None` when
    /// the suffix is missing or unknown.
    pub fn decode(&self) -> Option<DeviceSelection> {
        let mut chars = self.device_name.chars();
        let suffix = chars.next_back()?;
        let name = chars.as_str();
        let kind = match suffix {
            '0' => DeviceKind::Camera,
            '1' => DeviceKind::Scanner,
            _ => return None,
        };
        Some(DeviceSelection {
            id: name.to_string(),
            name: name.to_string(),
            kind,
        })
    }
}

/// Kind of physical capture device. Wire and persisted form is an integer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "u8", into = "u8")]
pub enum DeviceKind {
    Camera,
    Scanner,
}

impl From<DeviceKind> for u8 {
    fn from(kind: DeviceKind) -> u8 {
        match kind {
            DeviceKind::Camera => 0,
            DeviceKind::Scanner => 1,
        }
    }
}

impl TryFrom<u8> for DeviceKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Camera),
            1 => Ok(Self::Scanner),
            other => Err(format!("unknown device kind: {other}")),
        }
    }
}

/// The persisted choice of capture device. Field names match the per-user
/// JSON file the interactive settings screen writes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSelection {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Device")]
    pub kind: DeviceKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_preserves_unspecified_fields() {
        let mut config = OperationalConfig::new("m-1", OperationalMode::Standalone, 2);
        config.title = "A".to_string();

        let patch: ConfigPatch =
            serde_json::from_str(r#"{ "operational_mode": "headless" }"#).unwrap();
        config.apply(patch);

        assert_eq!(config.title, "A");
        assert_eq!(config.operational_mode, OperationalMode::Headless);
        assert_eq!(config.polling_frequency, 2);
        assert!(config.is_configured);
    }

    #[test]
    fn poll_interval_is_clamped() {
        let mut config = OperationalConfig::new("m-1", OperationalMode::Headless, 0);
        let min = Duration::from_secs(600);
        assert_eq!(config.poll_interval(min), min);

        config.polling_frequency = 2;
        assert_eq!(config.poll_interval(min), Duration::from_secs(2 * 3600));
    }

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!(
            "Headless".parse::<OperationalMode>().unwrap(),
            OperationalMode::Headless
        );
        assert!("kiosk".parse::<OperationalMode>().is_err());

        let mode: OperationalMode = serde_json::from_str(r#""Standalone""#).unwrap();
        assert_eq!(mode, OperationalMode::Standalone);
    }

    #[test]
    fn device_hint_decodes_name_suffix() {
        let cam = AvailableDevice {
            device_name: "Integrated Camera0".to_string(),
        };
        let decoded = cam.decode().unwrap();
        assert_eq!(decoded.kind, DeviceKind::Camera);
        assert_eq!(decoded.name, "Integrated Camera");

        let scanner = AvailableDevice {
            device_name: "Epson V391".to_string(),
        };
        let decoded = scanner.decode().unwrap();
        assert_eq!(decoded.kind, DeviceKind::Scanner);
        assert_eq!(decoded.name, "Epson V39");

        let unknown = AvailableDevice {
            device_name: "Mystery7".to_string(),
        };
        assert!(unknown.decode().is_none());
    }

    #[test]
    fn device_selection_uses_persisted_field_names() {
        let selection = DeviceSelection {
            id: "usb#vid".to_string(),
            name: "Flatbed".to_string(),
            kind: DeviceKind::Scanner,
        };
        let json = serde_json::to_value(&selection).unwrap();
        assert_eq!(json["Id"], "usb#vid");
        assert_eq!(json["Name"], "Flatbed");
        assert_eq!(json["Device"], 1);

        let back: DeviceSelection = serde_json::from_value(json).unwrap();
        assert_eq!(back, selection);
    }
}
