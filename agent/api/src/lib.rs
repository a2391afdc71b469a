pub mod activity;
pub mod admin;
pub mod models;
pub mod ocr;

pub use activity::ActivityRelay;
pub use admin::{AdminClient, ReportedDevice};
pub use models::{ProcessDocumentResponse, ProcessDocumentResult};
pub use ocr::OcrClient;
