use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::SubmissionCode;
use crate::sanitize;

/// Caller-supplied details that are only required at the initial stage,
/// where they classify the submission and build its new name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionMetadata {
    pub code: Option<String>,
    pub company: Option<String>,
    pub month: Option<String>,
    pub year: Option<String>,
}

impl SubmissionMetadata {
    pub fn new(code: &str, company: &str, month: &str, year: &str) -> Self {
        Self {
            code: Some(code.to_string()),
            company: Some(company.to_string()),
            month: Some(month.to_string()),
            year: Some(year.to_string()),
        }
    }
}

/// One request to sign a document at its current stage and pass it on.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceRequest {
    pub document_id: String,
    pub stage: String,
    /// `data:<mime>;base64,<payload>` image of the approver's signature.
    pub signature: String,
    #[serde(default)]
    pub metadata: SubmissionMetadata,
}

impl fmt::Debug for AdvanceRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdvanceRequest")
            .field("document_id", &self.document_id)
            .field("stage", &self.stage)
            .field("signature", &sanitize::summarize_data_url(&self.signature))
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// Validated initial-stage input used for the rename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct InitialDetails {
    pub code: SubmissionCode,
    pub company: String,
    /// Two digits, `01`..=`12`.
    pub month: String,
    /// Two or four digits.
    pub year: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_from_json() {
        let json = r#"{
            "documentId": "abc",
            "stage": "01",
            "signature": "data:image/png;base64,QUJD",
            "metadata": {"code": "SR", "company": "ACME", "month": "8", "year": "2024"}
        }"#;
        let request: AdvanceRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.metadata, SubmissionMetadata::new("SR", "ACME", "8", "2024"));

        let json = r#"{"documentId": "abc", "stage": "02A", "signature": "x"}"#;
        let request: AdvanceRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.metadata, SubmissionMetadata::default());
    }

    #[test]
    fn test_debug_hides_signature() {
        let request = AdvanceRequest {
            document_id: "abc".to_string(),
            stage: "01".to_string(),
            signature: "data:image/png;base64,SECRETPAYLOAD".to_string(),
            metadata: SubmissionMetadata::default(),
        };
        let debug = format!("{:?}", request);
        assert!(!debug.contains("SECRETPAYLOAD"));
        assert!(debug.contains("image/png, 13 chars"));
    }
}
