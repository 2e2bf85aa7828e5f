use openssl::{
    pkey::{PKey, Private},
    x509::X509,
};

use crate::{
    error::{ComplianceError, Result},
    models::credential_model::{CredentialRecord, CredentialStatus, Csid},
    services::pki_service::decode_certificate_token,
};

/// Which CSID a signing operation has to run under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningPurpose {
    ComplianceTest,
    Live,
}

/// Key and certificate a document is signed with, plus the CSID used to
/// authenticate the submission.
pub struct Crypto {
    pub private_key: PKey<Private>,
    pub certificate: X509,
    pub csid: Csid,
}

impl Crypto {
    pub fn from_credential(record: &CredentialRecord, purpose: SigningPurpose) -> Result<Self> {
        let csid = match purpose {
            SigningPurpose::ComplianceTest => {
                if record.status < CredentialStatus::ComplianceIssued {
                    return Err(ComplianceError::CredentialState(format!(
                        "tenant {} has no compliance certificate yet (status {})",
                        record.tenant_id,
                        record.status.as_str()
                    )));
                }
                record.compliance.as_ref()
            }
            SigningPurpose::Live => {
                if record.status != CredentialStatus::ProductionIssued {
                    return Err(ComplianceError::CredentialState(format!(
                        "tenant {} has no production certificate yet (status {})",
                        record.tenant_id,
                        record.status.as_str()
                    )));
                }
                record.production.as_ref()
            }
        };
        let csid = csid.cloned().ok_or_else(|| {
            ComplianceError::CredentialState(format!(
                "credential {} is missing the certificate for its status",
                record.id
            ))
        })?;

        let private_key = PKey::private_key_from_pem(record.private_key_pem.as_bytes())
            .map_err(|e| ComplianceError::Crypto(format!("failed to load the private key: {e}")))?;
        let certificate = decode_certificate_token(&csid.certificate)?;

        Ok(Crypto {
            private_key,
            certificate,
            csid,
        })
    }
}
