use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::crypto_config::{Crypto, SigningPurpose},
    error::{ComplianceError, Result},
    models::{
        credential_model::{CredentialRecord, TenantId},
        invoice_model::{ChainState, Party},
        submission_model::{
            DocumentKind, SubmissionFilter, SubmissionMode, SubmissionRecord, SubmissionStatus,
        },
        submit_invoice_dto::InvoiceSubmission,
    },
    services::{
        authority_client::{AuthorityApi, AuthorityReply},
        compliance_samples::{COMPLIANCE_CASES, render_unsigned, sample_document},
        document_signer::{SignedInvoice, sign_invoice},
        extractors::extract_chain_state,
        hash_chain::verify_history,
        store::{CredentialStore, SubmissionStore},
        tenant_lock::TenantLocks,
        verify_pih::verify_chain_link,
        xml_tree::parse,
    },
};

/// A live document handed over by the surrounding application.
pub struct SubmissionRequest {
    pub tenant_id: TenantId,
    pub document_type: DocumentKind,
    pub document_id: String,
    pub unsigned_xml: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionOutcome {
    pub record: SubmissionRecord,
    pub signed_xml: String,
    /// Clearance returns the authority-stamped document.
    pub cleared_invoice: Option<String>,
    pub advisories: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComplianceCaseResult {
    pub case: String,
    pub status: SubmissionStatus,
    pub invoice_hash: String,
    pub advisories: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComplianceReport {
    pub tenant_id: TenantId,
    pub passed: bool,
    pub results: Vec<ComplianceCaseResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChainReport {
    pub next: ChainState,
    pub accepted_submissions: usize,
}

/// What came back for one document, already classified.
struct Settlement {
    status: SubmissionStatus,
    payload: Option<Value>,
    reply: Option<AuthorityReply>,
    failure: Option<ComplianceError>,
}

fn settle(result: Result<AuthorityReply>) -> Result<Settlement> {
    match result {
        Ok(reply) => {
            let status = reply.response.classify();
            let failure = (status == SubmissionStatus::Failed).then(|| {
                ComplianceError::AuthorityRejected {
                    status: reply.http_status,
                    message: reply.response.summary_message(),
                    payload: reply.body.clone(),
                }
            });
            Ok(Settlement {
                status,
                payload: Some(reply.body.clone()),
                reply: Some(reply),
                failure,
            })
        }
        // sent, or possibly sent: it is recorded like any other failed attempt
        Err(e @ (ComplianceError::Transient(_) | ComplianceError::AuthorityRejected { .. })) => {
            Ok(Settlement {
                status: SubmissionStatus::Failed,
                payload: e.details().cloned(),
                reply: None,
                failure: Some(e),
            })
        }
        Err(e) => Err(e),
    }
}

fn record_for(
    tenant: TenantId,
    document_type: DocumentKind,
    document_id: String,
    mode: SubmissionMode,
    signed: &SignedInvoice,
    settlement: &Settlement,
) -> SubmissionRecord {
    SubmissionRecord {
        id: Uuid::new_v4(),
        tenant_id: tenant,
        document_type,
        document_id,
        document_uuid: signed.summary.uuid.clone(),
        xml_hash: signed.invoice_hash.clone(),
        signature: signed.signature.clone(),
        qr_code: signed.qr.clone(),
        invoice_counter: signed.summary.chain.invoice_counter_value,
        previous_hash: signed.summary.chain.previous_invoice_hash.clone(),
        mode,
        status: settlement.status,
        authority_response: settlement.payload.clone(),
        error_message: settlement.failure.as_ref().map(ToString::to_string),
        signed_xml: signed.xml.clone(),
        submitted_at: Utc::now(),
    }
}

pub struct SubmissionClient {
    credentials: Arc<dyn CredentialStore>,
    submissions: Arc<dyn SubmissionStore>,
    authority: Arc<dyn AuthorityApi>,
    locks: Arc<TenantLocks>,
}

impl SubmissionClient {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        submissions: Arc<dyn SubmissionStore>,
        authority: Arc<dyn AuthorityApi>,
        locks: Arc<TenantLocks>,
    ) -> Self {
        SubmissionClient {
            credentials,
            submissions,
            authority,
            locks,
        }
    }

    async fn credential(&self, tenant: TenantId) -> Result<CredentialRecord> {
        self.credentials
            .active_credential(tenant)
            .await?
            .ok_or_else(|| {
                ComplianceError::CredentialState(format!("tenant {tenant} has not been onboarded"))
            })
    }

    /// PIH and ICV the tenant's next live document has to carry.
    pub async fn chain_state(&self, tenant: TenantId) -> Result<ChainState> {
        let last = self.submissions.last_live_success(tenant).await?;
        Ok(ChainState::after(last.as_ref()))
    }

    /// Next chain state after checking the whole accepted history.
    pub async fn chain_report(&self, tenant: TenantId) -> Result<ChainReport> {
        let history = self.submissions.live_history(tenant).await?;
        verify_history(&history)?;
        Ok(ChainReport {
            next: ChainState::after(history.last()),
            accepted_submissions: history.len(),
        })
    }

    pub async fn history(
        &self,
        tenant: TenantId,
        filter: &SubmissionFilter,
    ) -> Result<Vec<SubmissionRecord>> {
        self.submissions.list(tenant, filter).await
    }

    /// Signs and sends one live document. Clearance or reporting is picked
    /// from the document's subtype.
    ///
    /// Everything from reading the chain state to persisting the outcome runs
    /// under the tenant lock. Once the document has gone out, the attempt is
    /// recorded even when it failed; a failed attempt leaves the chain alone.
    pub async fn submit(&self, request: SubmissionRequest) -> Result<SubmissionOutcome> {
        let tenant = request.tenant_id;
        let _guard = self.locks.acquire(tenant).await;

        let credential = self.credential(tenant).await?;
        let crypto = Crypto::from_credential(&credential, SigningPurpose::Live)?;

        let expected = self.chain_state(tenant).await?;
        let carried = extract_chain_state(&parse(&request.unsigned_xml)?)?;
        verify_chain_link(&carried, &expected).inspect_err(|e| {
            warn!(tenant, document = %request.document_id, error = %e, "stale chain metadata")
        })?;

        let signed = sign_invoice(&request.unsigned_xml, &crypto)?;
        let mode = signed.summary.subtype.live_mode();
        let settlement = settle(
            self.authority
                .submit(
                    credential.environment,
                    mode,
                    &crypto.csid,
                    &InvoiceSubmission::from(&signed),
                )
                .await,
        )?;

        let record = record_for(
            tenant,
            request.document_type,
            request.document_id,
            mode,
            &signed,
            &settlement,
        );
        self.submissions.append(&record).await?;

        if let Some(failure) = settlement.failure {
            warn!(
                tenant,
                counter = record.invoice_counter,
                mode = mode.as_str(),
                retryable = failure.is_retryable(),
                error = %failure,
                "submission failed, chain unchanged"
            );
            return Err(failure);
        }

        info!(
            tenant,
            counter = record.invoice_counter,
            mode = mode.as_str(),
            status = record.status.as_str(),
            invoice_hash = %record.xml_hash,
            "submission accepted"
        );
        let (cleared_invoice, advisories) = match settlement.reply {
            Some(reply) => (reply.response.cleared_invoice.clone(), reply.response.advisories()),
            None => (None, Vec::new()),
        };
        Ok(SubmissionOutcome {
            signed_xml: signed.xml,
            record,
            cleared_invoice,
            advisories,
        })
    }

    /// Runs the six canned documents against the compliance endpoint, in
    /// order, on their own chain starting from genesis.
    pub async fn run_compliance_checks(
        &self,
        tenant: TenantId,
        seller: &Party,
    ) -> Result<ComplianceReport> {
        let _guard = self.locks.acquire(tenant).await;
        let credential = self.credential(tenant).await?;
        let crypto = Crypto::from_credential(&credential, SigningPurpose::ComplianceTest)?;

        let issued_at = Utc::now().naive_utc();
        let mut chain = ChainState::genesis();
        let mut results = Vec::with_capacity(COMPLIANCE_CASES.len());

        for case in COMPLIANCE_CASES {
            let document = sample_document(seller, case, chain.clone(), issued_at);
            let signed = sign_invoice(&render_unsigned(&document)?, &crypto)?;
            let settlement = settle(
                self.authority
                    .submit(
                        credential.environment,
                        SubmissionMode::ComplianceTest,
                        &crypto.csid,
                        &InvoiceSubmission::from(&signed),
                    )
                    .await,
            )?;

            let record = record_for(
                tenant,
                DocumentKind::from(case.type_code),
                document.invoice_number.clone(),
                SubmissionMode::ComplianceTest,
                &signed,
                &settlement,
            );
            self.submissions.append(&record).await?;
            info!(
                tenant,
                case = %case.label(),
                status = record.status.as_str(),
                "compliance check"
            );

            let mut advisories = match &settlement.reply {
                Some(reply) => reply.response.advisories(),
                None => Vec::new(),
            };
            match settlement.failure {
                // nothing more can be learned until the gateway is back
                Some(e) if e.is_retryable() => return Err(e),
                Some(e) if advisories.is_empty() => advisories.push(e.to_string()),
                _ => {}
            }
            if record.status.advances_chain() {
                chain = ChainState::following(
                    signed.invoice_hash.clone(),
                    chain.invoice_counter_value,
                );
            }
            results.push(ComplianceCaseResult {
                case: case.label(),
                status: record.status,
                invoice_hash: signed.invoice_hash,
                advisories,
            });
        }

        let passed = results.iter().all(|r| r.status.advances_chain());
        if passed {
            info!(tenant, "all compliance checks accepted");
        } else {
            warn!(tenant, "compliance checks finished with failures");
        }
        Ok(ComplianceReport {
            tenant_id: tenant,
            passed,
            results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ChainIntegrityError,
        models::credential_model::CredentialStatus,
        services::{
            hash_chain::GENESIS_PREVIOUS_HASH,
            store::MemoryStore,
            test_support::{
                ScriptedAuthority, credential_with_status, sample_invoice, sample_seller,
                self_signed,
            },
        },
    };

    struct Harness {
        client: SubmissionClient,
        store: Arc<MemoryStore>,
        authority: Arc<ScriptedAuthority>,
    }

    async fn harness(status: CredentialStatus) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let (key, cert) = self_signed();
        store
            .supersede(&credential_with_status(1, status, &key, &cert))
            .await
            .unwrap();
        let authority = Arc::new(ScriptedAuthority::new());
        let client = SubmissionClient::new(
            store.clone(),
            store.clone(),
            authority.clone(),
            Arc::new(TenantLocks::new()),
        );
        Harness {
            client,
            store,
            authority,
        }
    }

    fn request(subtype: &str, chain: &ChainState) -> SubmissionRequest {
        SubmissionRequest {
            tenant_id: 1,
            document_type: DocumentKind::Invoice,
            document_id: format!("INV-{}", chain.invoice_counter_value),
            unsigned_xml: sample_invoice(
                subtype,
                "388",
                chain.invoice_counter_value,
                &chain.previous_invoice_hash,
            ),
        }
    }

    #[tokio::test]
    async fn chain_advances_on_success_and_rejects_stale_documents() {
        let h = harness(CredentialStatus::ProductionIssued).await;
        let first = h.client.chain_state(1).await.unwrap();
        assert_eq!(first, ChainState::genesis());

        let a = h.client.submit(request("0200000", &first)).await.unwrap();
        assert_eq!(a.record.mode, SubmissionMode::Reporting);
        assert_eq!(a.record.previous_hash, GENESIS_PREVIOUS_HASH);

        let second = h.client.chain_state(1).await.unwrap();
        assert_eq!(second, ChainState::following(a.record.xml_hash.clone(), 1));
        let b = h.client.submit(request("0100000", &second)).await.unwrap();
        assert_eq!(b.record.mode, SubmissionMode::Clearance);
        assert_eq!(b.record.invoice_counter, 2);
        assert!(b.cleared_invoice.is_some());

        // C still points at A
        let stale = ChainState {
            previous_invoice_hash: a.record.xml_hash.clone(),
            invoice_counter_value: 3,
        };
        let err = h.client.submit(request("0200000", &stale)).await.unwrap_err();
        assert!(matches!(
            err,
            ComplianceError::ChainIntegrity(ChainIntegrityError::PreviousHashMismatch { .. })
        ));
        assert_eq!(h.authority.submissions().len(), 2);

        let report = h.client.chain_report(1).await.unwrap();
        assert_eq!(report.accepted_submissions, 2);
        assert_eq!(report.next.previous_invoice_hash, b.record.xml_hash);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_submissions_of_one_tenant_are_serialized() {
        let h = harness(CredentialStatus::ProductionIssued).await;
        let client = Arc::new(h.client);
        let genesis = ChainState::genesis();

        let first = tokio::spawn({
            let client = client.clone();
            let request = request("0200000", &genesis);
            async move { client.submit(request).await }
        });
        let second = tokio::spawn({
            let client = client.clone();
            let mut request = request("0200000", &genesis);
            request.document_id = "INV-1b".into();
            async move { client.submit(request).await }
        });
        let results = [first.await.unwrap(), second.await.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let err = results.into_iter().find_map(Result::err).unwrap();
        assert!(matches!(
            err,
            ComplianceError::ChainIntegrity(ChainIntegrityError::PreviousHashMismatch { .. })
        ));
        assert_eq!(h.authority.submissions().len(), 1);
        assert_eq!(h.store.live_history(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_attempts_are_recorded_and_retryable() {
        let h = harness(CredentialStatus::ProductionIssued).await;
        let genesis = ChainState::genesis();

        h.authority.push_reply(ScriptedAuthority::rejection());
        let err = h.client.submit(request("0200000", &genesis)).await.unwrap_err();
        assert!(matches!(err, ComplianceError::AuthorityRejected { .. }));
        assert!(err.details().is_some());

        h.authority.push_error(ComplianceError::Transient("timed out".into()));
        let err = h.client.submit(request("0200000", &genesis)).await.unwrap_err();
        assert!(err.is_retryable());

        // same counter and hash go through on retry
        assert_eq!(h.client.chain_state(1).await.unwrap(), genesis);
        let ok = h.client.submit(request("0200000", &genesis)).await.unwrap();
        assert_eq!(ok.record.invoice_counter, 1);

        let failed = h
            .client
            .history(
                1,
                &SubmissionFilter {
                    status: Some(SubmissionStatus::Failed),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(failed.len(), 2);
        assert!(failed.iter().all(|r| r.invoice_counter == 1));
        assert!(failed.iter().any(|r| r.authority_response.is_some()));
    }

    #[tokio::test]
    async fn warnings_advance_the_chain() {
        let h = harness(CredentialStatus::ProductionIssued).await;
        h.authority.push_reply(ScriptedAuthority::warning());
        let outcome = h
            .client
            .submit(request("0200000", &ChainState::genesis()))
            .await
            .unwrap();
        assert_eq!(outcome.record.status, SubmissionStatus::Warning);
        assert_eq!(outcome.advisories, ["BR-KSA-98: simplified invoice reported late"]);
        assert_eq!(h.client.chain_state(1).await.unwrap().invoice_counter_value, 2);
    }

    #[tokio::test]
    async fn live_submission_needs_a_production_csid() {
        let h = harness(CredentialStatus::ComplianceIssued).await;
        let err = h
            .client
            .submit(request("0200000", &ChainState::genesis()))
            .await
            .unwrap_err();
        assert!(matches!(err, ComplianceError::CredentialState(_)));
        assert!(h.authority.submissions().is_empty());
        assert!(h.store.live_history(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_documents_are_not_sent() {
        let h = harness(CredentialStatus::ProductionIssued).await;
        let err = h
            .client
            .submit(SubmissionRequest {
                tenant_id: 1,
                document_type: DocumentKind::Invoice,
                document_id: "X".into(),
                unsigned_xml: "<Invoice><cbc:ID>".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ComplianceError::Parse(_)));
        assert!(h.authority.submissions().is_empty());
    }

    #[tokio::test]
    async fn compliance_run_chains_six_cases_from_genesis() {
        let h = harness(CredentialStatus::ComplianceIssued).await;
        let report = h.client.run_compliance_checks(1, &sample_seller()).await.unwrap();
        assert!(report.passed);
        assert_eq!(report.results.len(), 6);
        assert_eq!(report.results[0].case, "simplified_invoice");
        assert_eq!(report.results[5].case, "standard_credit_note");

        let sent = h.authority.submissions();
        assert!(sent.iter().all(|(mode, _)| *mode == SubmissionMode::ComplianceTest));
        let history = h
            .client
            .history(1, &SubmissionFilter::default())
            .await
            .unwrap();
        let oldest_first: Vec<_> = history.into_iter().rev().collect();
        assert_eq!(oldest_first[0].previous_hash, GENESIS_PREVIOUS_HASH);
        for pair in oldest_first.windows(2) {
            assert_eq!(pair[1].previous_hash, pair[0].xml_hash);
            assert_eq!(pair[1].invoice_counter, pair[0].invoice_counter + 1);
        }

        // the live chain is untouched
        assert_eq!(h.client.chain_state(1).await.unwrap(), ChainState::genesis());
    }

    #[tokio::test]
    async fn failed_compliance_case_does_not_advance_its_chain() {
        let h = harness(CredentialStatus::ComplianceIssued).await;
        h.authority.push_reply(ScriptedAuthority::rejection());
        let report = h.client.run_compliance_checks(1, &sample_seller()).await.unwrap();
        assert!(!report.passed);
        assert_eq!(report.results[0].status, SubmissionStatus::Failed);
        assert!(!report.results[0].advisories.is_empty());

        let history: Vec<_> = h
            .client
            .history(1, &SubmissionFilter::default())
            .await
            .unwrap()
            .into_iter()
            .rev()
            .collect();
        // the second case reuses the first case's slot in the chain
        assert_eq!(history[1].invoice_counter, 1);
        assert_eq!(history[1].previous_hash, GENESIS_PREVIOUS_HASH);
    }

    #[tokio::test]
    async fn compliance_run_needs_a_compliance_csid() {
        let h = harness(CredentialStatus::Pending).await;
        assert!(matches!(
            h.client.run_compliance_checks(1, &sample_seller()).await,
            Err(ComplianceError::CredentialState(_))
        ));
    }
}
