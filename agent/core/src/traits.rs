use async_trait::async_trait;

use crate::{AgentError, ProcessingOutcome, RemoteCommand};

/// Seam between the command listener and the processing pipeline.
///
/// `prepare` is the cheap synchronous-path check the listener runs before
/// answering the remote caller; `process` is the full best-effort pipeline,
/// run as independent background work after the response is sent.
#[async_trait]
pub trait CommandHandler: Send + Sync + 'static {
    /// Verify the command can be satisfied right now: the target file is
    /// already in the watch folder, or the configured capture device is
    /// resolvable. Fails with [`AgentError::DeviceUnavailable`] when capture
    /// would be required and no device can be found.
    async fn prepare(&self, command: &RemoteCommand) -> Result<(), AgentError>;

    /// Run the capture → OCR → relay → finalize pipeline. Never propagates
    /// errors; failures are logged and reflected in the outcome.
    async fn process(&self, command: RemoteCommand) -> ProcessingOutcome;
}

/// The interactive surface as seen by the mode controller. Rendering is an
/// external collaborator; the controller only needs to raise and dismiss it
/// on mode transitions.
pub trait UiSurface: Send + Sync + 'static {
    fn activate(&self);
    fn close(&self);
}
