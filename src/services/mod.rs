pub mod authority_client;
pub mod c14n11;
pub mod compliance_samples;
pub mod credential_provider;
pub mod document_signer;
pub mod editors;
pub mod extractors;
pub mod hash_chain;
pub mod pg_store;
pub mod pki_service;
pub mod provisioner;
pub mod qr;
pub mod signer;
pub mod store;
pub mod submission_client;
pub mod tenant_lock;
pub mod verify_pih;
pub mod xml_tree;

#[cfg(test)]
pub mod test_support;
