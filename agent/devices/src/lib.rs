pub mod provider;
pub mod providers;

pub use provider::{ColorDepth, DeviceDescriptor, DeviceProvider, ScanSettings, ScanSource};
pub use providers::{NoDevicesProvider, StillImageProvider};
