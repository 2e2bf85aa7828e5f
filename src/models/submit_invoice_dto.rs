use base64::{Engine, engine::general_purpose};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ComplianceError, Result},
    models::submission_model::DocumentKind,
    services::document_signer::SignedInvoice,
};

/// `POST /tenants/{id}/submissions`
#[derive(Debug, Deserialize, Serialize)]
pub struct SubmitInvoiceDto {
    pub document_type: DocumentKind,
    pub document_id: String,
    /// Base64 of the unsigned UBL document.
    pub invoice: String,
}

pub struct IntermediateInvoiceDto {
    pub document_type: DocumentKind,
    pub document_id: String,
    pub unsigned_xml: String,
}

impl SubmitInvoiceDto {
    pub fn parse(self) -> Result<IntermediateInvoiceDto> {
        let bytes = general_purpose::STANDARD
            .decode(self.invoice.trim())
            .map_err(|e| ComplianceError::format("invoice", format!("invalid base64: {e}")))?;
        let unsigned_xml = String::from_utf8(bytes)
            .map_err(|_| ComplianceError::format("invoice", "document is not UTF-8"))?;
        if self.document_id.trim().is_empty() {
            return Err(ComplianceError::format("document_id", "must not be empty"));
        }
        Ok(IntermediateInvoiceDto {
            document_type: self.document_type,
            document_id: self.document_id,
            unsigned_xml,
        })
    }
}

/// What the authority receives for clearance, reporting and compliance checks.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceSubmission {
    pub invoice_hash: String,
    pub uuid: String,
    pub invoice: String,
}

impl From<&SignedInvoice> for InvoiceSubmission {
    fn from(signed: &SignedInvoice) -> Self {
        InvoiceSubmission {
            invoice_hash: signed.invoice_hash.clone(),
            uuid: signed.summary.uuid.clone(),
            invoice: general_purpose::STANDARD.encode(signed.xml.as_bytes()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_the_document() {
        let dto = SubmitInvoiceDto {
            document_type: DocumentKind::Invoice,
            document_id: "INV-1".into(),
            invoice: general_purpose::STANDARD.encode("<Invoice/>"),
        };
        assert_eq!(dto.parse().unwrap().unsigned_xml, "<Invoice/>");
    }

    #[test]
    fn rejects_bad_base64_and_empty_ids() {
        let dto = SubmitInvoiceDto {
            document_type: DocumentKind::Invoice,
            document_id: "INV-1".into(),
            invoice: "%%%".into(),
        };
        assert!(matches!(
            dto.parse(),
            Err(ComplianceError::Format { field: "invoice", .. })
        ));

        let dto = SubmitInvoiceDto {
            document_type: DocumentKind::CreditNote,
            document_id: " ".into(),
            invoice: general_purpose::STANDARD.encode("<Invoice/>"),
        };
        assert!(dto.parse().is_err());
    }

    #[test]
    fn wire_body_is_camel_case() {
        let body = serde_json::to_value(InvoiceSubmission {
            invoice_hash: "h".into(),
            uuid: "u".into(),
            invoice: "i".into(),
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"invoiceHash": "h", "uuid": "u", "invoice": "i"}));
    }
}
