use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::{
    config::authority::{
        AuthorityEnvironment, CLEARANCE_PATH, COMPLIANCE_CSID_PATH, COMPLIANCE_INVOICES_PATH,
        PRODUCTION_CSID_PATH, REPORTING_PATH,
    },
    error::{ComplianceError, Result},
    models::{
        credential_model::Csid,
        enrollment_dto::{ComplianceCsidRequest, CsidResponse, ProductionCsidRequest},
        submission_model::SubmissionMode,
        submit_invoice_dto::InvoiceSubmission,
        submit_invoice_response_dto::SubmitInvoiceResponse,
    },
};

/// A validation result the authority actually produced, whatever its verdict.
#[derive(Debug, Clone)]
pub struct AuthorityReply {
    pub http_status: u16,
    pub response: SubmitInvoiceResponse,
    /// The body exactly as received.
    pub body: Value,
}

/// The three logical operations of the authority API.
#[async_trait]
pub trait AuthorityApi: Send + Sync {
    async fn compliance_csid(
        &self,
        environment: AuthorityEnvironment,
        csr_base64: &str,
        otp: &str,
    ) -> Result<CsidResponse>;

    async fn production_csid(
        &self,
        environment: AuthorityEnvironment,
        compliance: &Csid,
    ) -> Result<CsidResponse>;

    /// Compliance check, clearance or reporting depending on `mode`.
    async fn submit(
        &self,
        environment: AuthorityEnvironment,
        mode: SubmissionMode,
        csid: &Csid,
        submission: &InvoiceSubmission,
    ) -> Result<AuthorityReply>;
}

pub struct HttpAuthorityClient {
    http: Client,
    base_url: Option<String>,
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

impl HttpAuthorityClient {
    /// No retries happen here; a resend is always the caller's decision.
    pub fn new(timeout: Duration, base_url: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(timeout.min(CONNECT_TIMEOUT))
            .timeout(timeout)
            .build()
            .map_err(|e| ComplianceError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(HttpAuthorityClient { http, base_url })
    }

    fn url(&self, environment: AuthorityEnvironment, path: &str) -> String {
        let base = self.base_url.as_deref().unwrap_or(environment.base_url());
        format!("{base}{path}")
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
        auth: Option<&Csid>,
        headers: &[(&str, &str)],
    ) -> Result<(u16, Value)> {
        let mut request = self
            .http
            .post(url)
            .header("Accept-Language", "en")
            .header("Accept-Version", "V2")
            .json(body);
        if let Some(csid) = auth {
            request = request.basic_auth(&csid.certificate, Some(&csid.secret));
        }
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ComplianceError::Transient(format!("POST {url} failed: {e}")))?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        let body = serde_json::from_str(&text).unwrap_or_else(|_| json!({ "rawResponse": text }));
        debug!(url, status, "authority responded");
        Ok((status, body))
    }
}

fn is_transient_status(status: u16) -> bool {
    status == 408 || status == 429 || status >= 500
}

/// Best human-readable message the authority put in an error body.
pub fn rejection_message(status: u16, body: &Value) -> String {
    let candidates = [
        body.get("message"),
        body.get("dispositionMessage"),
        body.pointer("/errors/0/message"),
        body.pointer("/validationResults/errorMessages/0/message"),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {status}"))
}

fn rejected(status: u16, body: Value) -> ComplianceError {
    ComplianceError::AuthorityRejected {
        status,
        message: rejection_message(status, &body),
        payload: body,
    }
}

/// Maps a CSID exchange response onto the error taxonomy.
pub fn interpret_csid(status: u16, body: Value) -> Result<CsidResponse> {
    if is_transient_status(status) {
        return Err(ComplianceError::Transient(format!(
            "authority returned HTTP {status}"
        )));
    }
    if status != 200 {
        return Err(rejected(status, body));
    }
    serde_json::from_value(body.clone()).map_err(|_| rejected(status, body))
}

/// 200/202 and the 400/409 validation failures carry a validation result;
/// anything else without one is a rejection of the request itself.
pub fn interpret_submission(status: u16, body: Value) -> Result<AuthorityReply> {
    if is_transient_status(status) {
        return Err(ComplianceError::Transient(format!(
            "authority returned HTTP {status}"
        )));
    }
    if matches!(status, 200 | 202 | 400 | 409) {
        if let Ok(response) = serde_json::from_value::<SubmitInvoiceResponse>(body.clone()) {
            if response.validation_results.is_some() {
                return Ok(AuthorityReply {
                    http_status: status,
                    response,
                    body,
                });
            }
        }
    }
    Err(rejected(status, body))
}

#[async_trait]
impl AuthorityApi for HttpAuthorityClient {
    async fn compliance_csid(
        &self,
        environment: AuthorityEnvironment,
        csr_base64: &str,
        otp: &str,
    ) -> Result<CsidResponse> {
        let url = self.url(environment, COMPLIANCE_CSID_PATH);
        let body = ComplianceCsidRequest {
            csr: csr_base64.to_string(),
        };
        let (status, body) = self.post(&url, &body, None, &[("OTP", otp)]).await?;
        interpret_csid(status, body)
            .inspect_err(|e| warn!(status, error = %e, "compliance CSID exchange failed"))
    }

    async fn production_csid(
        &self,
        environment: AuthorityEnvironment,
        compliance: &Csid,
    ) -> Result<CsidResponse> {
        let url = self.url(environment, PRODUCTION_CSID_PATH);
        let body = ProductionCsidRequest {
            compliance_request_id: compliance.request_id.clone(),
        };
        let (status, body) = self.post(&url, &body, Some(compliance), &[]).await?;
        interpret_csid(status, body)
            .inspect_err(|e| warn!(status, error = %e, "production CSID exchange failed"))
    }

    async fn submit(
        &self,
        environment: AuthorityEnvironment,
        mode: SubmissionMode,
        csid: &Csid,
        submission: &InvoiceSubmission,
    ) -> Result<AuthorityReply> {
        let (path, headers): (&str, &[(&str, &str)]) = match mode {
            SubmissionMode::ComplianceTest => (COMPLIANCE_INVOICES_PATH, &[]),
            SubmissionMode::Clearance => (CLEARANCE_PATH, &[("Clearance-Status", "1")]),
            SubmissionMode::Reporting => (REPORTING_PATH, &[]),
        };
        let url = self.url(environment, path);
        let (status, body) = self.post(&url, submission, Some(csid), headers).await?;
        interpret_submission(status, body)
    }
}
