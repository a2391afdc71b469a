//! Wire shapes of the OCR processing service and the admin backend.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchDocumentTypesResponse {
    pub data: Option<Vec<DocumentType>>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentType {
    pub id: i64,
    pub name: String,
}

/// Response of `POST /document/process`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessDocumentResponse {
    pub data: Option<Vec<ProcessDocumentResult>>,
    pub message: String,
}

/// One engine's structured result; also the body of `POST /document/finalize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessDocumentResult {
    pub document_type_id: i64,
    pub engine: String,
    pub ocr: Vec<MappedOcrResult>,
    pub triplet_ids: Vec<i64>,
}

impl Default for ProcessDocumentResult {
    fn default() -> Self {
        Self {
            document_type_id: -1,
            engine: String::new(),
            ocr: Vec::new(),
            triplet_ids: Vec::new(),
        }
    }
}

/// A recognized field together with the extracted value. `is_corrected`
/// records whether a human confirmed the value; headless finalization clears
/// both the text and the flag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MappedOcrResult {
    pub field: Field,
    pub result: OcrResult,
    pub is_corrected: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Field {
    pub name: String,
    pub upper_left: Vec<f64>,
    pub lower_right: Vec<f64>,
    pub is_multiline: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrResult {
    pub text: String,
    pub confidence: f64,
    pub price: f64,
}

impl Default for OcrResult {
    fn default() -> Self {
        Self {
            text: String::new(),
            confidence: -1.0,
            price: -1.0,
        }
    }
}
