//! The capture-to-finalize pipeline behind every accepted command.
//!
//! One command runs the same sequence regardless of how it arrived: locate or
//! capture the document image, upload it for OCR, relay the structured result
//! to the admin backend, then finalize. In unattended deployments there is no
//! reviewer, so the finalize payload carries cleared field values.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{error, info, warn};

use docagent_api::{AdminClient, OcrClient, ProcessDocumentResult};
use docagent_config::device::load_selection;
use docagent_core::{
    ActivitySink, AgentError, ClientAction, CommandHandler, CommandStage, CommandTrace,
    DeviceKind, DeviceSelection, ExtractedField, ProcessingOutcome, RemoteCommand,
};
use docagent_devices::{DeviceProvider, ScanSettings};

/// Frames read and discarded before the kept camera frame, letting exposure
/// and focus settle after the device opens.
const CAMERA_WARMUP_FRAMES: usize = 5;

pub struct Pipeline {
    provider: Arc<dyn DeviceProvider>,
    ocr: OcrClient,
    admin: AdminClient,
    activity: ActivitySink,
    watch_folder: PathBuf,
    device_file: PathBuf,
    /// Account name the OCR service attributes uploads to.
    actor: String,
    /// When a reviewer is present the finalize step is theirs, not ours.
    review_required: bool,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: Arc<dyn DeviceProvider>,
        ocr: OcrClient,
        admin: AdminClient,
        activity: ActivitySink,
        watch_folder: PathBuf,
        device_file: PathBuf,
        actor: impl Into<String>,
        review_required: bool,
    ) -> Self {
        Self {
            provider,
            ocr,
            admin,
            activity,
            watch_folder,
            device_file,
            actor: actor.into(),
            review_required,
        }
    }

    fn document_path(&self, command: &RemoteCommand) -> PathBuf {
        self.watch_folder.join(&command.file_name)
    }

    async fn configured_device(&self) -> Result<DeviceSelection, AgentError> {
        let selection = load_selection(&self.device_file)
            .await
            .map_err(AgentError::Other)?;
        selection.ok_or_else(|| {
            AgentError::DeviceUnavailable("no capture device configured".to_string())
        })
    }

    /// Locate the configured camera in the current enumeration. Selection is
    /// by name; the enumeration index is what the driver opens.
    async fn camera_index(&self, selection: &DeviceSelection) -> Result<usize, AgentError> {
        let cameras = self.provider.list_camera_devices().await?;
        cameras
            .iter()
            .position(|d| d.name == selection.name)
            .ok_or_else(|| AgentError::DeviceUnavailable(selection.name.clone()))
    }

    async fn capture(&self, selection: &DeviceSelection) -> Result<Vec<u8>, AgentError> {
        match selection.kind {
            DeviceKind::Camera => {
                let index = self.camera_index(selection).await?;
                for _ in 0..CAMERA_WARMUP_FRAMES {
                    let _ = self.provider.capture_camera_frame(index).await?;
                }
                self.provider.capture_camera_frame(index).await
            }
            DeviceKind::Scanner => {
                let scanners = self.provider.list_scanner_devices().await?;
                if !scanners.iter().any(|d| d.id == selection.id) {
                    return Err(AgentError::DeviceUnavailable(selection.name.clone()));
                }
                self.provider
                    .capture_scanner_image(&selection.id, &ScanSettings::default())
                    .await
            }
        }
    }

    async fn capture_to_file(&self, selection: &DeviceSelection, path: &Path) -> Result<()> {
        let bytes = self.capture(selection).await?;
        if bytes.is_empty() {
            bail!("capture from {} produced no data", selection.name);
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        tokio::fs::write(path, &bytes)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), bytes = bytes.len(), "captured document image");
        Ok(())
    }

    /// Headless finalize payload: the reviewed values are cleared because no
    /// reviewer saw them.
    fn cleared_for_finalize(result: &ProcessDocumentResult) -> ProcessDocumentResult {
        let mut payload = result.clone();
        for mapped in &mut payload.ocr {
            mapped.result.text.clear();
            mapped.is_corrected = false;
        }
        payload
    }

    fn extracted_fields(result: &ProcessDocumentResult) -> Vec<ExtractedField> {
        result
            .ocr
            .iter()
            .map(|mapped| ExtractedField {
                name: mapped.field.name.clone(),
                value: mapped.result.text.clone(),
            })
            .collect()
    }

    async fn execute(
        &self,
        command: &RemoteCommand,
        trace: &mut CommandTrace,
    ) -> Result<Vec<ExtractedField>> {
        let path = self.document_path(command);

        if !path.exists() {
            trace.advance(CommandStage::DeviceAcquiring);
            let selection = self.configured_device().await?;
            trace.advance(CommandStage::Capturing);
            self.capture_to_file(&selection, &path).await?;
        }
        if !path.exists() {
            bail!("document {} is missing from the watch folder", path.display());
        }

        trace.advance(CommandStage::Uploading);
        self.activity.record(ClientAction::ProcessingReqSent);
        let response = self
            .ocr
            .process_document(
                &path,
                &self.actor,
                self.admin.machine_id(),
                &command.document_type_id,
            )
            .await?;
        trace.advance(CommandStage::AwaitingOcr);
        self.activity.record(ClientAction::ProcessingResultReceived);

        let results = response.data.unwrap_or_default();
        let fields = results
            .first()
            .map(Self::extracted_fields)
            .unwrap_or_default();

        trace.advance(CommandStage::Relaying);
        let document_type_id = command.document_type_id.parse::<i64>().unwrap_or(-1);
        self.admin
            .send_result(
                &command.transaction_id,
                document_type_id,
                &command.file_name,
                &results,
            )
            .await?;

        if self.review_required {
            trace.advance(CommandStage::Done);
        } else if let Some(first) = results.first() {
            trace.advance(CommandStage::Finalizing);
            let accepted = self
                .ocr
                .finalize_document(&Self::cleared_for_finalize(first))
                .await?;
            if !accepted {
                warn!(
                    transaction_id = %command.transaction_id,
                    "finalize was not accepted by the processing service"
                );
            }
            trace.advance(CommandStage::Done);
        } else {
            warn!(
                transaction_id = %command.transaction_id,
                "no extraction result to finalize"
            );
            trace.advance(CommandStage::Done);
        }

        Ok(fields)
    }
}

#[async_trait::async_trait]
impl CommandHandler for Pipeline {
    /// Cheap admissibility check run before the caller is answered: the
    /// document must already exist in the watch folder, or a configured
    /// capture device must be present in the current enumeration.
    async fn prepare(&self, command: &RemoteCommand) -> Result<(), AgentError> {
        if self.document_path(command).exists() {
            return Ok(());
        }
        let selection = self.configured_device().await?;
        match selection.kind {
            DeviceKind::Camera => {
                self.camera_index(&selection).await?;
            }
            DeviceKind::Scanner => {
                let scanners = self.provider.list_scanner_devices().await?;
                if !scanners.iter().any(|d| d.id == selection.id) {
                    return Err(AgentError::DeviceUnavailable(selection.name));
                }
            }
        }
        Ok(())
    }

    async fn process(&self, command: RemoteCommand) -> ProcessingOutcome {
        let mut trace = CommandTrace::new(command.transaction_id.clone());
        let outcome = match self.execute(&command, &mut trace).await {
            Ok(fields) => {
                info!(
                    transaction_id = %command.transaction_id,
                    fields = fields.len(),
                    "command processed"
                );
                ProcessingOutcome::succeeded(&command, fields)
            }
            Err(err) => {
                trace.fail();
                error!(
                    transaction_id = %command.transaction_id,
                    error = %err,
                    "command processing failed"
                );
                ProcessingOutcome::failed(&command, err.to_string())
            }
        };
        // Every attempt gets a processed record, failed ones included.
        self.activity.record(ClientAction::CommandProcessed);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::Mutex;

    use axum::extract::{Multipart, Query, State};
    use axum::http::HeaderMap;
    use axum::response::Json;
    use axum::routing::post;
    use axum::Router;
    use serde_json::{json, Value};

    use docagent_config::device::save_selection;
    use docagent_devices::{DeviceDescriptor, StillImageProvider};

    #[derive(Default)]
    struct Captured {
        process_fields: HashMap<String, String>,
        process_query: HashMap<String, String>,
        finalize_body: Option<Value>,
        relay_headers: HashMap<String, String>,
        relay_body: Option<Value>,
    }

    type Shared = Arc<Mutex<Captured>>;

    async fn ocr_process(
        State(captured): State<Shared>,
        Query(query): Query<HashMap<String, String>>,
        mut multipart: Multipart,
    ) -> Json<Value> {
        let mut fields = HashMap::new();
        while let Some(field) = multipart.next_field().await.unwrap() {
            let name = field.name().unwrap_or_default().to_string();
            if name == "file" {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.unwrap();
                fields.insert("file".to_string(), file_name);
                fields.insert("file_len".to_string(), bytes.len().to_string());
            } else {
                fields.insert(name, field.text().await.unwrap());
            }
        }
        {
            let mut captured = captured.lock().unwrap();
            captured.process_fields = fields;
            captured.process_query = query;
        }
        Json(json!({
            "data": [{
                "document_type_id": 7,
                "engine": "tesseract",
                "ocr": [
                    { "field": { "name": "total" }, "result": { "text": "42,00" }, "is_corrected": true },
                    { "field": { "name": "date" }, "result": { "text": "2024-01-05" } }
                ]
            }],
            "message": "ok"
        }))
    }

    async fn ocr_finalize(State(captured): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
        captured.lock().unwrap().finalize_body = Some(body);
        Json(json!({ "message": "finalized" }))
    }

    async fn admin_result(
        State(captured): State<Shared>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        let mut captured = captured.lock().unwrap();
        captured.relay_headers = headers
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();
        captured.relay_body = Some(body);
        Json(json!({ "message": "ok" }))
    }

    async fn serve(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    async fn backends(captured: Shared) -> (String, String) {
        let ocr = Router::new()
            .route("/document/process", post(ocr_process))
            .route("/document/finalize", post(ocr_finalize))
            .with_state(Arc::clone(&captured));
        let admin = Router::new()
            .route("/remote/result", post(admin_result))
            .with_state(captured);
        let ocr_addr = serve(ocr).await;
        let admin_addr = serve(admin).await;
        (format!("http://{ocr_addr}"), format!("http://{admin_addr}"))
    }

    struct Fixture {
        pipeline: Pipeline,
        captured: Shared,
        watch: PathBuf,
        provider: Arc<StillImageProvider>,
        _dir: tempfile::TempDir,
    }

    async fn fixture(review_required: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let watch = dir.path().join("inbox");
        std::fs::create_dir_all(&watch).unwrap();
        let image = dir.path().join("frame.png");
        std::fs::write(&image, b"frame-bytes").unwrap();
        let device_file = dir.path().join("capture-device.json");

        let captured: Shared = Arc::default();
        let (ocr_url, admin_url) = backends(Arc::clone(&captured)).await;

        let http = reqwest::Client::new();
        let provider = Arc::new(
            StillImageProvider::new(image)
                .with_camera(DeviceDescriptor::new("cam-0", "Integrated Camera"))
                .with_scanner(DeviceDescriptor::new("wia-7", "Epson V39")),
        );
        let pipeline = Pipeline::new(
            Arc::clone(&provider) as Arc<dyn DeviceProvider>,
            OcrClient::new(http.clone(), ocr_url, "eng", "tesseract"),
            AdminClient::new(http, admin_url, "machine-9"),
            ActivitySink::disabled(),
            watch.clone(),
            device_file,
            "agent",
            review_required,
        );

        Fixture {
            pipeline,
            captured,
            watch,
            provider,
            _dir: dir,
        }
    }

    fn command() -> RemoteCommand {
        RemoteCommand {
            transaction_id: "tx-1".to_string(),
            document_type_id: "7".to_string(),
            file_name: "doc1.pdf".to_string(),
        }
    }

    #[tokio::test]
    async fn processes_an_existing_file_end_to_end() {
        let fx = fixture(false).await;
        std::fs::write(fx.watch.join("doc1.pdf"), b"%PDF-1.4 content").unwrap();

        let outcome = fx.pipeline.process(command()).await;
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.fields.len(), 2);
        assert_eq!(outcome.fields[0].name, "total");
        assert_eq!(outcome.fields[0].value, "42,00");
        // No capture needed: the file was already present.
        assert_eq!(fx.provider.frames_served(), 0);

        let captured = fx.captured.lock().unwrap();
        assert_eq!(captured.process_fields["documentTypeId"], "7");
        assert_eq!(captured.process_fields["user"], "agent");
        assert_eq!(captured.process_fields["machineId"], "machine-9");
        assert_eq!(captured.process_fields["file"], "doc1.pdf");
        assert_eq!(captured.process_query["lang"], "eng");
        assert_eq!(captured.process_query["engines"], "tesseract");

        assert_eq!(captured.relay_headers["transaction-id"], "tx-1");
        let relay = captured.relay_body.as_ref().unwrap();
        assert_eq!(relay["document_type_id"], 7);
        assert_eq!(relay["file_name"], "doc1.pdf");
        assert_eq!(relay["ocr_result"][0]["ocr"][0]["result"]["text"], "42,00");

        // Finalize carries cleared values: no reviewer saw them.
        let finalize = captured.finalize_body.as_ref().unwrap();
        assert_eq!(finalize["ocr"][0]["result"]["text"], "");
        assert_eq!(finalize["ocr"][0]["is_corrected"], false);
        assert_eq!(finalize["ocr"][1]["result"]["text"], "");
    }

    #[tokio::test]
    async fn captures_from_the_camera_when_the_file_is_absent() {
        let fx = fixture(false).await;
        save_selection(
            &fx.pipeline.device_file,
            &DeviceSelection {
                id: "cam-0".to_string(),
                name: "Integrated Camera".to_string(),
                kind: DeviceKind::Camera,
            },
        )
        .await
        .unwrap();

        fx.pipeline.prepare(&command()).await.unwrap();
        let outcome = fx.pipeline.process(command()).await;
        assert!(outcome.success, "{}", outcome.message);

        let written = std::fs::read(fx.watch.join("doc1.pdf")).unwrap();
        assert_eq!(written, b"frame-bytes");
        // Warm-up frames are discarded, then one is kept.
        assert_eq!(fx.provider.frames_served(), CAMERA_WARMUP_FRAMES + 1);
    }

    #[tokio::test]
    async fn scanner_selection_uses_the_persisted_identifier() {
        let fx = fixture(true).await;
        save_selection(
            &fx.pipeline.device_file,
            &DeviceSelection {
                id: "wia-7".to_string(),
                name: "Epson V39".to_string(),
                kind: DeviceKind::Scanner,
            },
        )
        .await
        .unwrap();

        let outcome = fx.pipeline.process(command()).await;
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(fx.provider.frames_served(), 1);

        // Review required: the finalize step is left to the reviewer.
        let captured = fx.captured.lock().unwrap();
        assert!(captured.finalize_body.is_none());
        assert!(captured.relay_body.is_some());
    }

    #[tokio::test]
    async fn prepare_rejects_when_nothing_can_produce_the_file() {
        let fx = fixture(false).await;

        let err = fx.pipeline.prepare(&command()).await.unwrap_err();
        assert!(matches!(err, AgentError::DeviceUnavailable(_)));
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn unreachable_ocr_service_yields_a_failed_outcome() {
        let fx = fixture(false).await;
        std::fs::write(fx.watch.join("doc1.pdf"), b"%PDF-1.4 content").unwrap();

        let (activity, mut activity_rx) = ActivitySink::channel(8);
        let http = reqwest::Client::new();
        let broken = Pipeline::new(
            Arc::clone(&fx.provider) as Arc<dyn DeviceProvider>,
            OcrClient::new(http.clone(), "http://127.0.0.1:9", "eng", "tesseract"),
            AdminClient::new(http, "http://127.0.0.1:9", "machine-9"),
            activity,
            fx.watch.clone(),
            fx.pipeline.device_file.clone(),
            "agent",
            false,
        );

        let outcome = broken.process(command()).await;
        assert!(!outcome.success);
        assert_eq!(outcome.transaction_id, "tx-1");
        assert!(!outcome.message.is_empty());

        // Failed attempts still leave a full activity trail.
        let mut actions = Vec::new();
        while let Ok(action) = activity_rx.try_recv() {
            actions.push(action);
        }
        assert_eq!(
            actions,
            vec![ClientAction::ProcessingReqSent, ClientAction::CommandProcessed]
        );
    }
}
