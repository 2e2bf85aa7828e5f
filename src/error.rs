use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::Serialize;
use thiserror::Error;

/// Violations of the per-tenant hash chain.
///
/// These point at a concurrency bug or tampered data rather than a business
/// rule problem, so they are kept apart from every other failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainIntegrityError {
    #[error("previous invoice hash mismatch: expected {expected}, document carries {found}")]
    PreviousHashMismatch { expected: String, found: String },

    #[error("invoice counter mismatch: expected {expected}, document carries {found}")]
    CounterMismatch { expected: u64, found: u64 },

    #[error("invoice counter {counter} is already taken by a successful submission")]
    DuplicateCounter { counter: u64 },

    #[error("submission history is broken at counter {counter}: {reason}")]
    BrokenHistory { counter: u64, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Parse,
    Format,
    ChainIntegrity,
    CredentialState,
    Transient,
    AuthorityRejected,
    Crypto,
    Storage,
    Config,
}

#[derive(Debug, Error)]
pub enum ComplianceError {
    #[error("malformed XML: {0}")]
    Parse(String),

    #[error("invalid value for `{field}`: {reason}")]
    Format { field: &'static str, reason: String },

    #[error(transparent)]
    ChainIntegrity(#[from] ChainIntegrityError),

    #[error("credential state does not allow this operation: {0}")]
    CredentialState(String),

    #[error("authority unreachable, safe to retry: {0}")]
    Transient(String),

    #[error("authority rejected the request (HTTP {status}): {message}")]
    AuthorityRejected {
        status: u16,
        message: String,
        payload: serde_json::Value,
    },

    #[error("cryptographic operation failed: {0}")]
    Crypto(String),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T, E = ComplianceError> = std::result::Result<T, E>;

impl ComplianceError {
    pub fn format(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Format {
            field,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Parse(_) => ErrorKind::Parse,
            Self::Format { .. } => ErrorKind::Format,
            Self::ChainIntegrity(_) => ErrorKind::ChainIntegrity,
            Self::CredentialState(_) => ErrorKind::CredentialState,
            Self::Transient(_) => ErrorKind::Transient,
            Self::AuthorityRejected { .. } => ErrorKind::AuthorityRejected,
            Self::Crypto(_) => ErrorKind::Crypto,
            Self::Storage(_) => ErrorKind::Storage,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Only transport failures may be retried with identical inputs.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// The authority's payload, when the error came back from the authority.
    pub fn details(&self) -> Option<&serde_json::Value> {
        match self {
            Self::AuthorityRejected { payload, .. } => Some(payload),
            _ => None,
        }
    }
}

impl From<quick_xml::Error> for ComplianceError {
    fn from(e: quick_xml::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

impl From<openssl::error::ErrorStack> for ComplianceError {
    fn from(e: openssl::error::ErrorStack) -> Self {
        Self::Crypto(e.to_string())
    }
}

impl From<sqlx::Error> for ComplianceError {
    fn from(e: sqlx::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<reqwest::Error> for ComplianceError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transient(e.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    kind: ErrorKind,
    message: String,
    retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a serde_json::Value>,
}

impl ResponseError for ComplianceError {
    fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Parse | ErrorKind::Format => StatusCode::BAD_REQUEST,
            ErrorKind::ChainIntegrity => StatusCode::CONFLICT,
            ErrorKind::CredentialState => StatusCode::PRECONDITION_FAILED,
            ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::AuthorityRejected => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Crypto | ErrorKind::Storage | ErrorKind::Config => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            kind: self.kind(),
            message: self.to_string(),
            retryable: self.is_retryable(),
            details: self.details(),
        })
    }
}
