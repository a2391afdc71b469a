use std::path::Path;

use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};
use tracing::info;

use crate::models::{FetchDocumentTypesResponse, ProcessDocumentResponse, ProcessDocumentResult};

/// Client of the remote OCR processing service.
#[derive(Debug, Clone)]
pub struct OcrClient {
    http: reqwest::Client,
    base_url: String,
    language: String,
    engine: String,
}

impl OcrClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        language: impl Into<String>,
        engine: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            language: language.into(),
            engine: engine.into(),
        }
    }

    pub async fn fetch_document_types(&self) -> Result<FetchDocumentTypesResponse> {
        let url = format!("{}/document/types", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .context("document types request failed")?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// Submit one document image plus metadata as a multipart upload and
    /// return the structured extraction result.
    pub async fn process_document(
        &self,
        file_path: &Path,
        user: &str,
        machine_id: &str,
        document_type_id: &str,
    ) -> Result<ProcessDocumentResponse> {
        let bytes = tokio::fs::read(file_path)
            .await
            .with_context(|| format!("failed to read {}", file_path.display()))?;
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime_for_path(file_path))?;
        let form = Form::new()
            .part("file", part)
            .text("user", user.to_string())
            .text("machineId", machine_id.to_string())
            .text("documentTypeId", document_type_id.to_string());

        let url = format!(
            "{}/document/process?lang={}&engines={}",
            self.base_url, self.language, self.engine
        );
        info!(url = %url, file = %file_path.display(), "submitting document for processing");

        let response = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .context("document process request failed")?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// Commit field corrections (or, headlessly, cleared values) back to the
    /// service. Returns whether the service accepted the payload.
    pub async fn finalize_document(&self, result: &ProcessDocumentResult) -> Result<bool> {
        let url = format!("{}/document/finalize", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(result)
            .send()
            .await
            .context("document finalize request failed")?;
        Ok(response.status().is_success())
    }
}

fn mime_for_path(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("pdf") => "application/pdf",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}
