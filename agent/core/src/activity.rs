use tokio::sync::mpsc;
use tracing::debug;

/// Lifecycle and processing events reported to the admin backend's client
/// log. Wire form is the lowercase name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientAction {
    InstanceStarted,
    InstanceStopped,
    ProcessingReqSent,
    ProcessingResultReceived,
    CommandReceived,
    CommandProcessed,
    ConfigFetched,
    DevicesDelivered,
}

impl ClientAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InstanceStarted => "instance_started",
            Self::InstanceStopped => "instance_stopped",
            Self::ProcessingReqSent => "processing_req_sent",
            Self::ProcessingResultReceived => "processing_result_received",
            Self::CommandReceived => "command_received",
            Self::CommandProcessed => "command_processed",
            Self::ConfigFetched => "config_fetched",
            Self::DevicesDelivered => "devices_delivered",
        }
    }
}

/// Non-blocking handle onto the activity queue. Recording never fails the
/// caller: a full or closed queue drops the event with a debug log.
#[derive(Debug, Clone)]
pub struct ActivitySink {
    tx: Option<mpsc::Sender<ClientAction>>,
}

impl ActivitySink {
    /// Create a bounded queue and the sink feeding it. The receiving half is
    /// drained by the activity relay.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ClientAction>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that discards everything. For wiring paths with no relay.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn record(&self, action: ClientAction) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(err) = tx.try_send(action) {
            debug!(action = action.as_str(), error = %err, "activity event dropped");
        }
    }
}
