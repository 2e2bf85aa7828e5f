use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::submission_model::SubmissionMode;

/// `InvoiceTypeCode` values accepted by the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvoiceTypeCode {
    #[serde(rename = "388")]
    TaxInvoice,
    #[serde(rename = "383")]
    DebitNote,
    #[serde(rename = "381")]
    CreditNote,
}

impl InvoiceTypeCode {
    pub fn code(self) -> &'static str {
        match self {
            InvoiceTypeCode::TaxInvoice => "388",
            InvoiceTypeCode::DebitNote => "383",
            InvoiceTypeCode::CreditNote => "381",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "388" => Some(InvoiceTypeCode::TaxInvoice),
            "383" => Some(InvoiceTypeCode::DebitNote),
            "381" => Some(InvoiceTypeCode::CreditNote),
            _ => None,
        }
    }

    /// Notes must point back at the invoice they amend.
    pub fn needs_billing_reference(self) -> bool {
        !matches!(self, InvoiceTypeCode::TaxInvoice)
    }
}

/// The `name` attribute of `InvoiceTypeCode`: standard (B2B) or simplified (B2C).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceSubtype {
    Standard,
    Simplified,
}

impl InvoiceSubtype {
    pub fn code(self) -> &'static str {
        match self {
            InvoiceSubtype::Standard => "0100000",
            InvoiceSubtype::Simplified => "0200000",
        }
    }

    /// Only the first two digits carry the subtype; the rest are transaction flags.
    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim();
        if code.len() != 7 || !code.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        match &code[..2] {
            "01" => Some(InvoiceSubtype::Standard),
            "02" => Some(InvoiceSubtype::Simplified),
            _ => None,
        }
    }

    /// B2B documents are cleared, B2C documents are reported.
    pub fn live_mode(self) -> SubmissionMode {
        match self {
            InvoiceSubtype::Standard => SubmissionMode::Clearance,
            InvoiceSubtype::Simplified => SubmissionMode::Reporting,
        }
    }
}

/// Position of a document in its tenant's hash chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainState {
    pub previous_invoice_hash: String,
    pub invoice_counter_value: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    #[serde(default)]
    pub building_number: Option<String>,
    pub district: String,
    pub city: String,
    pub postal_code: String,
    #[serde(default = "default_country")]
    pub country: String,
}

fn default_country() -> String {
    "SA".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub name: String,
    #[serde(default)]
    pub vat_number: Option<String>,
    #[serde(default)]
    pub commercial_registration: Option<String>,
    pub address: Address,
}

/// Amounts are carried as already formatted decimal strings ("115.00").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub quantity: String,
    pub unit_price: String,
    pub vat_category: String,
    pub vat_rate: String,
    pub vat_amount: String,
    pub total_before_vat: String,
    pub total_with_vat: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceDocument {
    pub uuid: Uuid,
    pub invoice_number: String,
    pub type_code: InvoiceTypeCode,
    pub subtype: InvoiceSubtype,
    pub issue_date: NaiveDate,
    pub issue_time: NaiveTime,
    pub currency: String,
    pub seller: Party,
    pub buyer: Option<Party>,
    pub lines: Vec<LineItem>,
    pub total_before_vat: String,
    pub total_vat: String,
    pub total_with_vat: String,
    pub billing_reference: Option<String>,
    pub chain: ChainState,
}

/// Fields read back out of a built document for signing, QR and routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceSummary {
    pub uuid: String,
    pub type_code: InvoiceTypeCode,
    pub subtype: InvoiceSubtype,
    pub seller_name: String,
    pub seller_vat_number: String,
    pub issue_date: String,
    pub issue_time: String,
    pub total_with_vat: String,
    pub total_vat: String,
    pub chain: ChainState,
}

impl InvoiceSummary {
    /// `IssueDate` + `IssueTime`, used both as signing time and QR timestamp.
    pub fn timestamp(&self) -> String {
        let time = self.issue_time.trim_end_matches('Z');
        format!("{}T{}Z", self.issue_date, time)
    }
}
