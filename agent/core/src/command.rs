use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::AgentError;

/// One inbound processing request, arriving over the command listener or via
/// the keep-alive poll. Consumed exactly once; there is no durable queue.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RemoteCommand {
    pub transaction_id: String,
    pub document_type_id: String,
    pub file_name: String,
}

impl RemoteCommand {
    /// All three fields are mandatory; a command missing any one is rejected
    /// before dispatch.
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.transaction_id.is_empty()
            || self.document_type_id.is_empty()
            || self.file_name.is_empty()
        {
            return Err(AgentError::InvalidCommand(
                "Invalid request format. Required fields: transaction_id, document_type_id, file_name"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// An extracted field/value pair from the OCR response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedField {
    pub name: String,
    pub value: String,
}

/// The result of one pipeline run. Transient; handed to the result-relay
/// step and then dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingOutcome {
    pub transaction_id: String,
    pub document_type_id: String,
    pub success: bool,
    pub message: String,
    pub fields: Vec<ExtractedField>,
}

impl ProcessingOutcome {
    pub fn succeeded(command: &RemoteCommand, fields: Vec<ExtractedField>) -> Self {
        Self {
            transaction_id: command.transaction_id.clone(),
            document_type_id: command.document_type_id.clone(),
            success: true,
            message: "Document processed".to_string(),
            fields,
        }
    }

    pub fn failed(command: &RemoteCommand, message: impl Into<String>) -> Self {
        Self {
            transaction_id: command.transaction_id.clone(),
            document_type_id: command.document_type_id.clone(),
            success: false,
            message: message.into(),
            fields: Vec::new(),
        }
    }
}

/// Lifecycle of a single command inside the processing pipeline. Every stage
/// may drop straight to `Failed`; there is no retry stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStage {
    Received,
    DeviceAcquiring,
    Capturing,
    Uploading,
    AwaitingOcr,
    Relaying,
    Finalizing,
    Done,
    Failed,
}

impl CommandStage {
    /// Valid forward transitions. `Failed` is reachable from every
    /// non-terminal stage; capture stages may be skipped when the target
    /// file already exists.
    pub fn can_transition(self, next: CommandStage) -> bool {
        use CommandStage::*;
        if matches!(self, Done | Failed) {
            return false;
        }
        if next == Failed {
            return true;
        }
        matches!(
            (self, next),
            (Received, DeviceAcquiring)
                | (Received, Uploading)
                | (DeviceAcquiring, Capturing)
                | (Capturing, Uploading)
                | (Uploading, AwaitingOcr)
                | (AwaitingOcr, Relaying)
                | (Relaying, Finalizing)
                | (Relaying, Done)
                | (Finalizing, Done)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, CommandStage::Done | CommandStage::Failed)
    }
}

/// Tracks one command's progress through the stage machine, keyed by its
/// transaction identifier for log correlation.
#[derive(Debug)]
pub struct CommandTrace {
    transaction_id: String,
    stage: CommandStage,
}

impl CommandTrace {
    pub fn new(transaction_id: impl Into<String>) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            stage: CommandStage::Received,
        }
    }

    pub fn stage(&self) -> CommandStage {
        self.stage
    }

    pub fn advance(&mut self, next: CommandStage) {
        if !self.stage.can_transition(next) {
            warn!(
                transaction_id = %self.transaction_id,
                from = ?self.stage,
                to = ?next,
                "invalid command stage transition"
            );
            debug_assert!(false, "invalid stage transition {:?} -> {:?}", self.stage, next);
        }
        debug!(
            transaction_id = %self.transaction_id,
            from = ?self.stage,
            to = ?next,
            "command stage"
        );
        self.stage = next;
    }

    pub fn fail(&mut self) {
        if !self.stage.is_terminal() {
            self.advance(CommandStage::Failed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_missing_fields() {
        let full = RemoteCommand {
            transaction_id: "tx-1".into(),
            document_type_id: "7".into(),
            file_name: "doc1.pdf".into(),
        };
        assert!(full.validate().is_ok());

        for wipe in 0..3 {
            let mut command = full.clone();
            match wipe {
                0 => command.transaction_id.clear(),
                1 => command.document_type_id.clear(),
                _ => command.file_name.clear(),
            }
            let err = command.validate().unwrap_err();
            assert!(err.to_string().contains("transaction_id, document_type_id, file_name"));
        }
    }

    #[test]
    fn stage_machine_allows_failure_from_any_active_stage() {
        use CommandStage::*;
        for stage in [Received, DeviceAcquiring, Capturing, Uploading, AwaitingOcr, Relaying, Finalizing] {
            assert!(stage.can_transition(Failed), "{stage:?} -> Failed");
        }
        assert!(!Done.can_transition(Failed));
        assert!(!Failed.can_transition(Received));
    }

    #[test]
    fn stage_machine_supports_skip_of_capture() {
        use CommandStage::*;
        // File already present in the watch folder: straight to upload.
        assert!(Received.can_transition(Uploading));
        // Capture path.
        assert!(Received.can_transition(DeviceAcquiring));
        assert!(DeviceAcquiring.can_transition(Capturing));
        assert!(Capturing.can_transition(Uploading));
        // Upload onwards is strictly sequential.
        assert!(!Uploading.can_transition(Relaying));
        assert!(Uploading.can_transition(AwaitingOcr));
    }

    #[test]
    fn trace_walks_to_done() {
        let mut trace = CommandTrace::new("tx-9");
        trace.advance(CommandStage::Uploading);
        trace.advance(CommandStage::AwaitingOcr);
        trace.advance(CommandStage::Relaying);
        trace.advance(CommandStage::Finalizing);
        trace.advance(CommandStage::Done);
        assert!(trace.stage().is_terminal());
    }
}
