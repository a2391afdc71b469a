use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use docagent_core::AgentError;

/// One enumerable capture device: the driver-specific identifier and the
/// human-readable name shown in settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub id: String,
    pub name: String,
}

impl DeviceDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanSource {
    Flatbed,
    Feeder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorDepth {
    BlackAndWhite,
    Grayscale,
    Color,
}

/// Standard scan properties applied before a transfer. Defaults mirror the
/// driver settings the interactive flow uses: flatbed source, read access,
/// color, 300 DPI, zero offsets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSettings {
    pub source: ScanSource,
    pub color_depth: ColorDepth,
    pub dpi: u32,
    pub x_offset: u32,
    pub y_offset: u32,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            source: ScanSource::Flatbed,
            color_depth: ColorDepth::Color,
            dpi: 300,
            x_offset: 0,
            y_offset: 0,
        }
    }
}

/// Uniform contract over physical image-capture devices. Driver and interop
/// details live behind implementations of this trait; the pipeline only
/// lists devices and captures single images.
#[async_trait]
pub trait DeviceProvider: Send + Sync + 'static {
    async fn list_camera_devices(&self) -> Result<Vec<DeviceDescriptor>, AgentError>;

    async fn list_scanner_devices(&self) -> Result<Vec<DeviceDescriptor>, AgentError>;

    /// Capture one still frame from the camera at the given enumeration
    /// index. Fails with [`AgentError::DeviceUnavailable`] when the device
    /// cannot be opened.
    async fn capture_camera_frame(&self, device_index: usize) -> Result<Vec<u8>, AgentError>;

    /// Transfer one image from the scanner with the given identifier.
    /// Fails with [`AgentError::DeviceUnavailable`] or
    /// [`AgentError::DriverError`].
    async fn capture_scanner_image(
        &self,
        device_id: &str,
        settings: &ScanSettings,
    ) -> Result<Vec<u8>, AgentError>;
}
