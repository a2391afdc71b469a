//! In-tree providers. Real driver backends are platform interop and live
//! outside this repository; these two cover headless deployments without a
//! compiled-in driver and test wiring.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tracing::debug;

use docagent_core::AgentError;

use crate::provider::{DeviceDescriptor, DeviceProvider, ScanSettings};

/// Provider for hosts with no capture hardware. Enumerations are empty and
/// every capture fails as unavailable.
#[derive(Debug, Default)]
pub struct NoDevicesProvider;

#[async_trait]
impl DeviceProvider for NoDevicesProvider {
    async fn list_camera_devices(&self) -> Result<Vec<DeviceDescriptor>, AgentError> {
        Ok(Vec::new())
    }

    async fn list_scanner_devices(&self) -> Result<Vec<DeviceDescriptor>, AgentError> {
        Ok(Vec::new())
    }

    async fn capture_camera_frame(&self, device_index: usize) -> Result<Vec<u8>, AgentError> {
        Err(AgentError::DeviceUnavailable(format!(
            "no camera at index {device_index}"
        )))
    }

    async fn capture_scanner_image(
        &self,
        device_id: &str,
        _settings: &ScanSettings,
    ) -> Result<Vec<u8>, AgentError> {
        Err(AgentError::DeviceUnavailable(device_id.to_string()))
    }
}

/// Serves a canned still image for every capture. Stands in for a real
/// driver backend on machines where the capture source is a fixed document
/// feed, and doubles as the test provider.
#[derive(Debug)]
pub struct StillImageProvider {
    cameras: Vec<DeviceDescriptor>,
    scanners: Vec<DeviceDescriptor>,
    image: PathBuf,
    frames_served: AtomicUsize,
}

impl StillImageProvider {
    pub fn new(image: PathBuf) -> Self {
        Self {
            cameras: Vec::new(),
            scanners: Vec::new(),
            image,
            frames_served: AtomicUsize::new(0),
        }
    }

    pub fn with_camera(mut self, device: DeviceDescriptor) -> Self {
        self.cameras.push(device);
        self
    }

    pub fn with_scanner(mut self, device: DeviceDescriptor) -> Self {
        self.scanners.push(device);
        self
    }

    /// Number of frames handed out so far, warm-up reads included.
    pub fn frames_served(&self) -> usize {
        self.frames_served.load(Ordering::Relaxed)
    }

    async fn read_image(&self) -> Result<Vec<u8>, AgentError> {
        let bytes = tokio::fs::read(&self.image).await.map_err(|err| {
            AgentError::DriverError(format!(
                "fixture image {} unreadable: {err}",
                self.image.display()
            ))
        })?;
        self.frames_served.fetch_add(1, Ordering::Relaxed);
        Ok(bytes)
    }
}

#[async_trait]
impl DeviceProvider for StillImageProvider {
    async fn list_camera_devices(&self) -> Result<Vec<DeviceDescriptor>, AgentError> {
        Ok(self.cameras.clone())
    }

    async fn list_scanner_devices(&self) -> Result<Vec<DeviceDescriptor>, AgentError> {
        Ok(self.scanners.clone())
    }

    async fn capture_camera_frame(&self, device_index: usize) -> Result<Vec<u8>, AgentError> {
        if device_index >= self.cameras.len() {
            return Err(AgentError::DeviceUnavailable(format!(
                "no camera at index {device_index}"
            )));
        }
        debug!(device_index, "serving still frame");
        self.read_image().await
    }

    async fn capture_scanner_image(
        &self,
        device_id: &str,
        settings: &ScanSettings,
    ) -> Result<Vec<u8>, AgentError> {
        if !self.scanners.iter().any(|d| d.id == device_id) {
            return Err(AgentError::DeviceUnavailable(device_id.to_string()));
        }
        debug!(device_id, dpi = settings.dpi, "serving still scan");
        self.read_image().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ScanSource;

    fn fixture(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("page.png");
        std::fs::write(&path, b"png-bytes").unwrap();
        path
    }

    #[tokio::test]
    async fn still_provider_serves_and_counts_frames() {
        let dir = tempfile::tempdir().unwrap();
        let provider = StillImageProvider::new(fixture(&dir))
            .with_camera(DeviceDescriptor::new("cam-0", "Integrated Camera"));

        let frame = provider.capture_camera_frame(0).await.unwrap();
        assert_eq!(frame, b"png-bytes");
        let _ = provider.capture_camera_frame(0).await.unwrap();
        assert_eq!(provider.frames_served(), 2);
    }

    #[tokio::test]
    async fn unknown_devices_are_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let provider = StillImageProvider::new(fixture(&dir));

        let err = provider.capture_camera_frame(3).await.unwrap_err();
        assert!(matches!(err, AgentError::DeviceUnavailable(_)));

        let err = provider
            .capture_scanner_image("missing", &ScanSettings::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn scan_settings_default_to_flatbed_color_300dpi() {
        let settings = ScanSettings::default();
        assert_eq!(settings.source, ScanSource::Flatbed);
        assert_eq!(settings.dpi, 300);
        assert_eq!(settings.x_offset, 0);
        assert_eq!(settings.y_offset, 0);
    }
}
