use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use docagent_core::{ConfigPatch, DeviceKind, RemoteCommand};

use crate::models::ProcessDocumentResult;

/// Client of the admin backend: instance configuration, remote commands,
/// result relay and device inventory.
#[derive(Debug, Clone)]
pub struct AdminClient {
    http: reqwest::Client,
    base_url: String,
    machine_id: String,
}

/// One enumerated capture device as delivered to the admin backend. The
/// trailing digit of `device_name` encodes the kind, matching the format the
/// backend hands back in `availableDevices`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportedDevice {
    pub device_id: String,
    pub device_name: String,
}

impl ReportedDevice {
    pub fn new(id: impl Into<String>, name: impl AsRef<str>, kind: DeviceKind) -> Self {
        Self {
            device_id: id.into(),
            device_name: format!("{}{}", name.as_ref(), u8::from(kind)),
        }
    }
}

impl AdminClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        machine_id: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            machine_id: machine_id.into(),
        }
    }

    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    /// Fetch the partial instance configuration keyed by machine identity.
    pub async fn fetch_instance_config(&self) -> Result<ConfigPatch> {
        let url = format!(
            "{}/windows-app-instance/machine/{}",
            self.base_url, self.machine_id
        );
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .context("config fetch request failed")?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// Poll for queued remote commands addressed to this machine.
    pub async fn poll_commands(&self) -> Result<Vec<RemoteCommand>> {
        let url = format!("{}/remote/commands/{}", self.base_url, self.machine_id);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .context("command poll request failed")?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// Relay one structured OCR result, correlated by the originating
    /// transaction identifier.
    pub async fn send_result(
        &self,
        transaction_id: &str,
        document_type_id: i64,
        file_name: &str,
        ocr_result: &[ProcessDocumentResult],
    ) -> Result<()> {
        let url = format!("{}/remote/result", self.base_url);
        let body = json!({
            "document_type_id": document_type_id,
            "file_name": file_name,
            "ocr_result": ocr_result,
        });
        self.http
            .post(&url)
            .header("transaction-id", transaction_id)
            .json(&body)
            .send()
            .await
            .context("result relay request failed")?
            .error_for_status()?;
        info!(transaction_id, "relayed processing result");
        Ok(())
    }

    /// Deliver the current device inventory.
    pub async fn report_devices(&self, devices: &[ReportedDevice]) -> Result<()> {
        let url = format!("{}/windows-app-instance/devices", self.base_url);
        let body = json!({
            "machine_id": self.machine_id,
            "devices": devices,
        });
        self.http
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("device report request failed")?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reported_device_encodes_kind_suffix() {
        let cam = ReportedDevice::new("cam-0", "Integrated Camera", DeviceKind::Camera);
        assert_eq!(cam.device_name, "Integrated Camera0");

        let scanner = ReportedDevice::new("wia-7", "Epson V39", DeviceKind::Scanner);
        assert_eq!(scanner.device_name, "Epson V391");
    }
}
