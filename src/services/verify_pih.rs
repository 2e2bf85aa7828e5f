use openssl::memcmp;

use crate::{error::ChainIntegrityError, models::invoice_model::ChainState};

/// Checks that a document's embedded PIH/ICV match the tenant's chain state.
pub fn verify_chain_link(
    document: &ChainState,
    expected: &ChainState,
) -> Result<(), ChainIntegrityError> {
    let found = document.previous_invoice_hash.trim().as_bytes();
    let wanted = expected.previous_invoice_hash.as_bytes();
    // memcmp::eq panics on unequal lengths
    if found.len() != wanted.len() || !memcmp::eq(found, wanted) {
        return Err(ChainIntegrityError::PreviousHashMismatch {
            expected: expected.previous_invoice_hash.clone(),
            found: document.previous_invoice_hash.clone(),
        });
    }
    if document.invoice_counter_value != expected.invoice_counter_value {
        return Err(ChainIntegrityError::CounterMismatch {
            expected: expected.invoice_counter_value,
            found: document.invoice_counter_value,
        });
    }
    Ok(())
}
