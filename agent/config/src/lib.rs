pub mod device;
pub mod settings;
pub mod store;

pub use settings::AppSettings;
pub use store::ConfigStore;
