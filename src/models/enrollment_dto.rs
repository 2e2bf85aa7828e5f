use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{ComplianceError, Result},
    models::credential_model::Csid,
};

/// Body of the compliance CSID exchange; the OTP travels as a header.
#[derive(Debug, Serialize)]
pub struct ComplianceCsidRequest {
    /// Base64 of the whole CSR PEM text.
    pub csr: String,
}

#[derive(Debug, Serialize)]
pub struct ProductionCsidRequest {
    pub compliance_request_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsidResponse {
    #[serde(rename = "requestID")]
    pub request_id: Value,
    #[serde(default)]
    pub disposition_message: Option<String>,
    pub binary_security_token: String,
    pub secret: String,
}

impl CsidResponse {
    pub fn into_csid(self) -> Result<Csid> {
        let request_id = match self.request_id {
            Value::String(id) => id,
            Value::Number(id) => id.to_string(),
            other => {
                return Err(ComplianceError::format(
                    "requestID",
                    format!("unexpected value {other}"),
                ));
            }
        };
        if self.binary_security_token.trim().is_empty() || self.secret.is_empty() {
            return Err(ComplianceError::format(
                "binarySecurityToken",
                "authority returned an empty certificate or secret",
            ));
        }
        Ok(Csid {
            certificate: self.binary_security_token.trim().to_string(),
            secret: self.secret,
            request_id,
        })
    }
}

/// `POST /tenants/{id}/csid/compliance`
#[derive(Debug, Deserialize)]
pub struct EnrollDto {
    pub otp: String,
}

impl EnrollDto {
    pub fn parse(&self) -> Result<&str> {
        let otp = self.otp.trim();
        if otp.is_empty() || !otp.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ComplianceError::format("otp", "must be the numeric code from the portal"));
        }
        Ok(otp)
    }
}
