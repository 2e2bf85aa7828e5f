use base64::{Engine, engine::general_purpose};
use openssl::{
    bn::BigNumContext,
    ec::PointConversionForm,
    hash::{MessageDigest, hash},
    pkey::{HasPublic, PKeyRef},
    sign::Verifier,
    x509::{X509, X509Ref},
};

use crate::error::{ComplianceError, Result};

pub fn compute_hash(data: &[u8]) -> Result<Vec<u8>> {
    Ok(hash(MessageDigest::sha256(), data)?.to_vec())
}

/// Accepts the authority's `binarySecurityToken` (base64 of the base64 DER
/// body), a plain base64 DER body, raw DER or PEM.
pub fn decode_certificate_token(token: &str) -> Result<X509> {
    let token = token.trim();
    if token.starts_with("-----BEGIN") {
        return Ok(X509::from_pem(token.as_bytes())?);
    }
    let decoded = decode_base64_lenient(token)?;
    if decoded.first() == Some(&0x30) {
        return Ok(X509::from_der(&decoded)?);
    }
    let inner = String::from_utf8(decoded)
        .map_err(|_| ComplianceError::format("certificate", "token is neither DER nor base64"))?;
    if inner.trim_start().starts_with("-----BEGIN") {
        return Ok(X509::from_pem(inner.as_bytes())?);
    }
    let der = decode_base64_lenient(&inner)?;
    Ok(X509::from_der(&der)?)
}

fn decode_base64_lenient(text: &str) -> Result<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| ComplianceError::format("certificate", format!("invalid base64: {e}")))
}

/// Base64 DER body, as embedded in `ds:X509Certificate`.
pub fn certificate_body(cert: &X509Ref) -> Result<String> {
    Ok(general_purpose::STANDARD.encode(cert.to_der()?))
}

pub fn certificate_digest(cert: &X509Ref) -> Result<String> {
    Ok(general_purpose::STANDARD.encode(compute_hash(&cert.to_der()?)?))
}

/// Issuer DN most-specific first, e.g. `CN=TSZEINVOICE-SubCA-1, DC=extgazt, DC=gov, DC=local`.
pub fn issuer_name(cert: &X509Ref) -> Result<String> {
    let mut parts = Vec::new();
    for entry in cert.issuer_name().entries() {
        let key = entry.object().nid().short_name()?;
        let value = entry.data().as_utf8()?;
        parts.push(format!("{key}={value}"));
    }
    parts.reverse();
    Ok(parts.join(", "))
}

pub fn serial_number_decimal(cert: &X509Ref) -> Result<String> {
    Ok(cert.serial_number().to_bn()?.to_dec_str()?.to_string())
}

/// Uncompressed EC point without the leading `0x04`: X || Y.
pub fn public_key_raw<T: HasPublic>(key: &PKeyRef<T>) -> Result<Vec<u8>> {
    let ec = key.ec_key()?;
    let mut ctx = BigNumContext::new()?;
    let bytes = ec
        .public_key()
        .to_bytes(ec.group(), PointConversionForm::UNCOMPRESSED, &mut ctx)?;
    match bytes.split_first() {
        Some((0x04, rest)) => Ok(rest.to_vec()),
        _ => Err(ComplianceError::Crypto(
            "unexpected public key point encoding".to_string(),
        )),
    }
}

/// The issuing CA's signature over the certificate.
pub fn certificate_signature(cert: &X509Ref) -> Vec<u8> {
    cert.signature().as_slice().to_vec()
}

pub fn verify_signature_with_cert(digest: &[u8], signature: &[u8], cert: &X509Ref) -> Result<bool> {
    let pubkey = cert.public_key()?;
    let mut verifier = Verifier::new(MessageDigest::sha256(), &pubkey)?;
    verifier.update(digest)?;
    Ok(verifier.verify(signature)?)
}
