use base64::{Engine, engine::general_purpose};
use tracing::debug;

use crate::{
    error::{ChainIntegrityError, Result},
    models::{invoice_model::ChainState, submission_model::SubmissionRecord},
    services::{
        c14n11::serialize, extractors::strip_for_hash, pki_service::compute_hash,
        xml_tree::{NodeTree, parse},
    },
};

/// `previous_invoice_hash` of a tenant's first invoice: base64 of the hex
/// SHA-256 of `"0"`, as published by the authority.
pub const GENESIS_PREVIOUS_HASH: &str =
    "NWZlY2ViNjZmZmM4NmYzOGQ5NTI3ODZjNmQ2OTZjNzljMmRiYzIzOWRkNGU5MWI0NjcyOWQ3M2EyN2ZiNTdlOQ==";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceDigest(Vec<u8>);

impl InvoiceDigest {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.0)
    }
}

/// Canonical text the invoice digest is computed over.
pub fn hash_input(tree: &NodeTree) -> String {
    serialize(&strip_for_hash(tree))
}

pub fn invoice_digest_of(tree: &NodeTree) -> Result<InvoiceDigest> {
    let canonical = hash_input(tree);
    let digest = InvoiceDigest(compute_hash(canonical.as_bytes())?);
    debug!(digest = %digest.to_base64(), bytes = canonical.len(), "computed invoice digest");
    Ok(digest)
}

pub fn invoice_digest(xml: &str) -> Result<InvoiceDigest> {
    invoice_digest_of(&parse(xml)?)
}

impl ChainState {
    pub fn genesis() -> Self {
        ChainState {
            previous_invoice_hash: GENESIS_PREVIOUS_HASH.to_string(),
            invoice_counter_value: 1,
        }
    }

    pub fn following(hash: impl Into<String>, counter: u64) -> Self {
        ChainState {
            previous_invoice_hash: hash.into(),
            invoice_counter_value: counter + 1,
        }
    }

    /// State for the next document given the last record that extended the chain.
    pub fn after(last: Option<&SubmissionRecord>) -> Self {
        match last {
            Some(record) => ChainState::following(record.xml_hash.clone(), record.invoice_counter),
            None => ChainState::genesis(),
        }
    }
}

/// Checks genesis and monotonicity over a tenant's accepted live history,
/// oldest first.
pub fn verify_history(records: &[SubmissionRecord]) -> Result<(), ChainIntegrityError> {
    let mut expected = ChainState::genesis();
    for record in records.iter().filter(|r| r.extends_live_chain()) {
        if record.invoice_counter != expected.invoice_counter_value {
            return Err(ChainIntegrityError::BrokenHistory {
                counter: record.invoice_counter,
                reason: format!("expected counter {}", expected.invoice_counter_value),
            });
        }
        if record.previous_hash != expected.previous_invoice_hash {
            return Err(ChainIntegrityError::BrokenHistory {
                counter: record.invoice_counter,
                reason: "previous hash does not match the preceding invoice".to_string(),
            });
        }
        expected = ChainState::following(record.xml_hash.clone(), record.invoice_counter);
    }
    Ok(())
}
