use serde::{Deserialize, Deserializer, Serialize};

use crate::models::submission_model::SubmissionStatus;

/// Body the authority returns for clearance, reporting and compliance checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitInvoiceResponse {
    #[serde(default)]
    pub clearance_status: Option<ClearanceStatus>,
    #[serde(default)]
    pub reporting_status: Option<ReportingStatus>,
    /// Base64 of the invoice as stamped by the authority, clearance only.
    #[serde(default)]
    pub cleared_invoice: Option<String>,
    #[serde(default)]
    pub validation_results: Option<ValidationResults>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClearanceStatus {
    Cleared,
    NotCleared,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportingStatus {
    Reported,
    NotReported,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResults {
    #[serde(default, deserialize_with = "one_or_many")]
    pub info_messages: Vec<ValidationMessage>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub warning_messages: Vec<ValidationMessage>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub error_messages: Vec<ValidationMessage>,
    #[serde(alias = "validationStatus")]
    pub status: ValidationStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationMessage {
    #[serde(rename = "type", default)]
    pub message_type: Option<MessageType>,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: Option<ValidationStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    Pass,
    Warning,
    Error,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Info,
    Warning,
    Error,
    #[serde(other)]
    Other,
}

// the authority sends a bare object instead of a list when there is one message
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<ValidationMessage>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        // first: a struct also deserializes from a sequence, `[]` included
        Many(Vec<ValidationMessage>),
        One(ValidationMessage),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(message)) => vec![message],
        Some(OneOrMany::Many(messages)) => messages,
    })
}

impl ValidationMessage {
    pub fn display(&self) -> String {
        if self.code.is_empty() {
            self.message.clone()
        } else {
            format!("{}: {}", self.code, self.message)
        }
    }
}

impl SubmitInvoiceResponse {
    /// PASS is success, WARNING is warning, everything else failed.
    pub fn classify(&self) -> SubmissionStatus {
        if self.clearance_status == Some(ClearanceStatus::NotCleared)
            || self.reporting_status == Some(ReportingStatus::NotReported)
        {
            return SubmissionStatus::Failed;
        }
        match self.validation_results.as_ref().map(|v| v.status) {
            Some(ValidationStatus::Pass) => SubmissionStatus::Success,
            Some(ValidationStatus::Warning) => SubmissionStatus::Warning,
            _ => SubmissionStatus::Failed,
        }
    }

    /// Warnings and errors, in the order the authority listed them.
    pub fn advisories(&self) -> Vec<String> {
        self.validation_results
            .iter()
            .flat_map(|v| v.warning_messages.iter().chain(&v.error_messages))
            .map(ValidationMessage::display)
            .collect()
    }

    pub fn summary_message(&self) -> String {
        let errors: Vec<String> = self
            .validation_results
            .iter()
            .flat_map(|v| &v.error_messages)
            .map(ValidationMessage::display)
            .collect();
        if errors.is_empty() {
            "document was not accepted".to_string()
        } else {
            errors.join("; ")
        }
    }
}
