pub mod activity;
pub mod command;
pub mod error;
pub mod traits;
pub mod types;

pub use activity::{ActivitySink, ClientAction};
pub use command::{CommandStage, CommandTrace, ExtractedField, ProcessingOutcome, RemoteCommand};
pub use error::AgentError;
pub use traits::{CommandHandler, UiSurface};
pub use types::{
    AvailableDevice, ConfigPatch, DeviceKind, DeviceSelection, OperationalConfig, OperationalMode,
};
