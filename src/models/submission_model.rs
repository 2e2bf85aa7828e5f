use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ComplianceError, Result};
use crate::models::{credential_model::TenantId, invoice_model::InvoiceTypeCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionMode {
    Clearance,
    Reporting,
    ComplianceTest,
}

impl SubmissionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionMode::Clearance => "clearance",
            SubmissionMode::Reporting => "reporting",
            SubmissionMode::ComplianceTest => "compliance_test",
        }
    }

    /// Compliance tests run on their own short-lived chain.
    pub fn is_live(self) -> bool {
        !matches!(self, SubmissionMode::ComplianceTest)
    }
}

impl FromStr for SubmissionMode {
    type Err = ComplianceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "clearance" => Ok(SubmissionMode::Clearance),
            "reporting" => Ok(SubmissionMode::Reporting),
            "compliance_test" => Ok(SubmissionMode::ComplianceTest),
            other => Err(ComplianceError::format(
                "mode",
                format!("unknown submission mode `{other}`"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Success,
    Warning,
    Failed,
}

impl SubmissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionStatus::Success => "success",
            SubmissionStatus::Warning => "warning",
            SubmissionStatus::Failed => "failed",
        }
    }

    /// Accepted documents extend the chain; failed ones leave it alone.
    pub fn advances_chain(self) -> bool {
        !matches!(self, SubmissionStatus::Failed)
    }
}

impl FromStr for SubmissionStatus {
    type Err = ComplianceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "success" => Ok(SubmissionStatus::Success),
            "warning" => Ok(SubmissionStatus::Warning),
            "failed" => Ok(SubmissionStatus::Failed),
            other => Err(ComplianceError::format(
                "status",
                format!("unknown submission status `{other}`"),
            )),
        }
    }
}

/// Source document type in the surrounding application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Invoice,
    CreditNote,
    DebitNote,
}

impl DocumentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::Invoice => "invoice",
            DocumentKind::CreditNote => "credit_note",
            DocumentKind::DebitNote => "debit_note",
        }
    }
}

impl From<InvoiceTypeCode> for DocumentKind {
    fn from(code: InvoiceTypeCode) -> Self {
        match code {
            InvoiceTypeCode::TaxInvoice => DocumentKind::Invoice,
            InvoiceTypeCode::CreditNote => DocumentKind::CreditNote,
            InvoiceTypeCode::DebitNote => DocumentKind::DebitNote,
        }
    }
}

impl FromStr for DocumentKind {
    type Err = ComplianceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "invoice" => Ok(DocumentKind::Invoice),
            "credit_note" => Ok(DocumentKind::CreditNote),
            "debit_note" => Ok(DocumentKind::DebitNote),
            other => Err(ComplianceError::format(
                "document_type",
                format!("unknown document type `{other}`"),
            )),
        }
    }
}

/// One row of the append-only submission history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub document_type: DocumentKind,
    pub document_id: String,
    pub document_uuid: String,
    pub xml_hash: String,
    pub signature: String,
    pub qr_code: String,
    pub invoice_counter: u64,
    pub previous_hash: String,
    pub mode: SubmissionMode,
    pub status: SubmissionStatus,
    pub authority_response: Option<serde_json::Value>,
    pub error_message: Option<String>,
    #[serde(skip_serializing)]
    pub signed_xml: String,
    pub submitted_at: DateTime<Utc>,
}

impl SubmissionRecord {
    /// Counts towards the tenant's live chain.
    pub fn extends_live_chain(&self) -> bool {
        self.mode.is_live() && self.status.advances_chain()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmissionFilter {
    pub status: Option<SubmissionStatus>,
    pub mode: Option<SubmissionMode>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl SubmissionFilter {
    pub const DEFAULT_LIMIT: u32 = 50;

    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT).clamp(1, 500)
    }

    pub fn offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }

    pub fn matches(&self, record: &SubmissionRecord) -> bool {
        self.status.map_or(true, |s| s == record.status)
            && self.mode.map_or(true, |m| m == record.mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_submissions_do_not_advance_the_chain() {
        assert!(SubmissionStatus::Success.advances_chain());
        assert!(SubmissionStatus::Warning.advances_chain());
        assert!(!SubmissionStatus::Failed.advances_chain());
    }

    #[test]
    fn compliance_tests_are_not_live() {
        assert!(SubmissionMode::Clearance.is_live());
        assert!(SubmissionMode::Reporting.is_live());
        assert!(!SubmissionMode::ComplianceTest.is_live());
    }

    #[test]
    fn enums_parse_their_storage_form() {
        for mode in [
            SubmissionMode::Clearance,
            SubmissionMode::Reporting,
            SubmissionMode::ComplianceTest,
        ] {
            assert_eq!(mode.as_str().parse::<SubmissionMode>().unwrap(), mode);
        }
        assert_eq!(
            "warning".parse::<SubmissionStatus>().unwrap(),
            SubmissionStatus::Warning
        );
        assert!("cleared".parse::<SubmissionStatus>().is_err());
    }

    #[test]
    fn filter_limits_are_clamped() {
        let filter = SubmissionFilter {
            limit: Some(10_000),
            ..Default::default()
        };
        assert_eq!(filter.limit(), 500);
        assert_eq!(SubmissionFilter::default().limit(), 50);
    }
}
