/*
hash the stripped canonical invoice, sign the digest,
build signed properties + signed info around both digests,
build the QR from the invoice fields + digest + signature,
then write signature block and QR back into the document
*/

use base64::{Engine, engine::general_purpose};
use tracing::debug;

use crate::{
    config::crypto_config::Crypto,
    error::Result,
    models::invoice_model::InvoiceSummary,
    services::{
        editors::embed_signature_and_qr,
        extractors::summarize,
        hash_chain::invoice_digest_of,
        pki_service::{certificate_signature, public_key_raw},
        qr::QrPayload,
        signer::{SignatureParts, SigningCertificate, sign, signature_block},
        xml_tree::parse,
    },
};

#[derive(Debug, Clone)]
pub struct SignedInvoice {
    pub xml: String,
    /// Base64 SHA-256 of the canonical, stripped invoice.
    pub invoice_hash: String,
    pub signature: String,
    pub qr: String,
    pub summary: InvoiceSummary,
}

pub fn sign_invoice(unsigned_xml: &str, crypto: &Crypto) -> Result<SignedInvoice> {
    let tree = parse(unsigned_xml)?;
    let summary = summarize(&tree)?;
    let digest = invoice_digest_of(&tree)?;
    let invoice_hash = digest.to_base64();

    let signature_der = sign(digest.as_bytes(), &crypto.private_key)?;
    let signature = general_purpose::STANDARD.encode(&signature_der);

    let signing_time = summary.timestamp();
    let certificate = SigningCertificate::from_x509(&crypto.certificate)?;
    let block = signature_block(&SignatureParts {
        invoice_hash: &invoice_hash,
        signature_value: &signature,
        signing_time: &signing_time,
        certificate: &certificate,
    })?;

    let qr = QrPayload {
        seller_name: summary.seller_name.clone(),
        vat_number: summary.seller_vat_number.clone(),
        timestamp: signing_time,
        total_with_vat: summary.total_with_vat.clone(),
        vat_total: summary.total_vat.clone(),
        invoice_hash: digest.as_bytes().to_vec(),
        signature: signature_der,
        public_key: public_key_raw(&crypto.private_key)?,
        certificate_signature: certificate_signature(&crypto.certificate),
    }
    .encode()?;

    let xml = embed_signature_and_qr(unsigned_xml, &block, &qr)?;
    debug!(uuid = %summary.uuid, invoice_hash = %invoice_hash, "signed invoice");

    Ok(SignedInvoice {
        xml,
        invoice_hash,
        signature,
        qr,
        summary,
    })
}
