//! Text extraction from uploaded prescription documents

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedText {
    pub text: String,
    pub confidence: f64,
}

#[async_trait]
pub trait DocumentReader: Send + Sync {
    /// `file_type` is `image` or `pdf`.
    async fn extract_text(&self, file_url: &str, file_type: &str) -> Result<ExtractedText>;
}

const SAMPLE_PRESCRIPTIONS: [&str; 2] = [
    "DR. JOHN SMITH, MD
NPI: 1234567890
License: MD12345

PATIENT: Jane Doe
DOB: 01/15/1985

Rx: Amoxicillin 500mg
Sig: Take 1 capsule three times daily for 7 days
Qty: 21
Refills: 0

Date: 2024-02-15

[SIGNATURE]",
    "CITY MEDICAL CENTER
Dr. Sarah Johnson
NPI: 0987654321

Patient: Robert Brown
Date: 2024-02-10

Medication: Lisinopril 10mg
Directions: Take once daily
Quantity: 30
Refills: 3

Dr. Sarah Johnson",
];

/// Returns one of two sample prescriptions, picked deterministically from the URL.
#[derive(Debug, Default, Clone, Copy)]
pub struct SampleDocumentReader;

#[async_trait]
impl DocumentReader for SampleDocumentReader {
    async fn extract_text(&self, file_url: &str, file_type: &str) -> Result<ExtractedText> {
        if file_url.trim().is_empty() {
            bail!("empty file reference");
        }
        if !matches!(file_type, "image" | "pdf") {
            bail!("unsupported file type '{}'", file_type);
        }

        let index = file_url.bytes().map(usize::from).sum::<usize>() % SAMPLE_PRESCRIPTIONS.len();
        Ok(ExtractedText {
            text: SAMPLE_PRESCRIPTIONS[index].to_string(),
            confidence: 0.92,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_extraction_is_deterministic() {
        let reader = SampleDocumentReader;
        let first = reader.extract_text("s3://rx/1.png", "image").await.unwrap();
        let again = reader.extract_text("s3://rx/1.png", "image").await.unwrap();
        assert_eq!(first, again);
        assert!(first.text.contains("NPI"));
    }

    #[tokio::test]
    async fn test_rejects_unsupported_types() {
        let reader = SampleDocumentReader;
        assert!(reader.extract_text("file.docx", "word").await.is_err());
        assert!(reader.extract_text(" ", "pdf").await.is_err());
    }
}
