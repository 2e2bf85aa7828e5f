use base64::{Engine, engine::general_purpose};
use openssl::{
    hash::MessageDigest,
    pkey::{PKeyRef, Private},
    sign::Signer,
    x509::X509Ref,
};
use quick_xml::escape::escape;

use crate::{
    error::Result,
    services::pki_service::{
        certificate_body, certificate_digest, compute_hash, issuer_name, serial_number_decimal,
    },
};

const NS_SIG: &str = "urn:oasis:names:specification:ubl:schema:xsd:CommonSignatureComponents-2";
const NS_SAC: &str = "urn:oasis:names:specification:ubl:schema:xsd:SignatureAggregateComponents-2";
const NS_SBC: &str = "urn:oasis:names:specification:ubl:schema:xsd:SignatureBasicComponents-2";
const NS_DS: &str = "http://www.w3.org/2000/09/xmldsig#";
const NS_XADES: &str = "http://uri.etsi.org/01903/v1.3.2#";
const ALG_SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
const ALG_C14N11: &str = "http://www.w3.org/2006/12/xml-c14n11";
const ALG_ECDSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha256";
const ALG_XPATH: &str = "http://www.w3.org/TR/1999/REC-xpath-19991116";

/// ECDSA-SHA256 over the invoice digest bytes, DER encoded.
pub fn sign(digest: &[u8], private_key: &PKeyRef<Private>) -> Result<Vec<u8>> {
    let mut signer = Signer::new(MessageDigest::sha256(), private_key)?;
    signer.update(digest)?;
    Ok(signer.sign_to_vec()?)
}

/// Certificate fields that go into `xades:SigningCertificate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningCertificate {
    pub body: String,
    pub digest: String,
    pub issuer_name: String,
    pub serial_number: String,
}

impl SigningCertificate {
    pub fn from_x509(cert: &X509Ref) -> Result<Self> {
        Ok(SigningCertificate {
            body: certificate_body(cert)?,
            digest: certificate_digest(cert)?,
            issuer_name: issuer_name(cert)?,
            serial_number: serial_number_decimal(cert)?,
        })
    }
}

/// The form of `xades:SignedProperties` whose digest goes into `SignedInfo`:
/// one line, namespaces declared where used.
pub fn linearized_signed_properties(signing_time: &str, cert: &SigningCertificate) -> String {
    format!(
        "<xades:SignedProperties xmlns:xades=\"{NS_XADES}\" Id=\"xadesSignedProperties\">\
<xades:SignedSignatureProperties><xades:SigningTime>{time}</xades:SigningTime>\
<xades:SigningCertificate><xades:Cert><xades:CertDigest>\
<ds:DigestMethod xmlns:ds=\"{NS_DS}\" Algorithm=\"{ALG_SHA256}\"></ds:DigestMethod>\
<ds:DigestValue xmlns:ds=\"{NS_DS}\">{digest}</ds:DigestValue></xades:CertDigest>\
<xades:IssuerSerial><ds:X509IssuerName xmlns:ds=\"{NS_DS}\">{issuer}</ds:X509IssuerName>\
<ds:X509SerialNumber xmlns:ds=\"{NS_DS}\">{serial}</ds:X509SerialNumber></xades:IssuerSerial>\
</xades:Cert></xades:SigningCertificate></xades:SignedSignatureProperties></xades:SignedProperties>",
        time = escape(signing_time),
        digest = cert.digest,
        issuer = escape(cert.issuer_name.as_str()),
        serial = cert.serial_number,
    )
}

pub fn signed_properties_digest(signing_time: &str, cert: &SigningCertificate) -> Result<String> {
    let linearized = linearized_signed_properties(signing_time, cert);
    Ok(general_purpose::STANDARD.encode(compute_hash(linearized.as_bytes())?))
}

pub struct SignatureParts<'a> {
    pub invoice_hash: &'a str,
    pub signature_value: &'a str,
    pub signing_time: &'a str,
    pub certificate: &'a SigningCertificate,
}

/// `sig:UBLDocumentSignatures` block for `ext:ExtensionContent`.
pub fn signature_block(parts: &SignatureParts<'_>) -> Result<String> {
    let cert = parts.certificate;
    let signed_properties_digest = signed_properties_digest(parts.signing_time, cert)?;
    let time = escape(parts.signing_time);
    let issuer = escape(cert.issuer_name.as_str());
    Ok(format!(
        r##"<sig:UBLDocumentSignatures xmlns:sig="{NS_SIG}" xmlns:sac="{NS_SAC}" xmlns:sbc="{NS_SBC}">
<sac:SignatureInformation>
<cbc:ID>urn:oasis:names:specification:ubl:signature:1</cbc:ID>
<sbc:ReferencedSignatureID>urn:oasis:names:specification:ubl:signature:Invoice</sbc:ReferencedSignatureID>
<ds:Signature xmlns:ds="{NS_DS}" Id="signature">
<ds:SignedInfo>
<ds:CanonicalizationMethod Algorithm="{ALG_C14N11}"></ds:CanonicalizationMethod>
<ds:SignatureMethod Algorithm="{ALG_ECDSA_SHA256}"></ds:SignatureMethod>
<ds:Reference Id="invoiceSignedData" URI="">
<ds:Transforms>
<ds:Transform Algorithm="{ALG_XPATH}"><ds:XPath>not(//ancestor-or-self::ext:UBLExtensions)</ds:XPath></ds:Transform>
<ds:Transform Algorithm="{ALG_XPATH}"><ds:XPath>not(//ancestor-or-self::cac:Signature)</ds:XPath></ds:Transform>
<ds:Transform Algorithm="{ALG_XPATH}"><ds:XPath>not(//ancestor-or-self::cac:AdditionalDocumentReference[cbc:ID='QR'])</ds:XPath></ds:Transform>
<ds:Transform Algorithm="{ALG_C14N11}"></ds:Transform>
</ds:Transforms>
<ds:DigestMethod Algorithm="{ALG_SHA256}"></ds:DigestMethod>
<ds:DigestValue>{invoice_hash}</ds:DigestValue>
</ds:Reference>
<ds:Reference Type="http://www.w3.org/2000/09/xmldsig#SignatureProperties" URI="#xadesSignedProperties">
<ds:DigestMethod Algorithm="{ALG_SHA256}"></ds:DigestMethod>
<ds:DigestValue>{signed_properties_digest}</ds:DigestValue>
</ds:Reference>
</ds:SignedInfo>
<ds:SignatureValue>{signature_value}</ds:SignatureValue>
<ds:KeyInfo><ds:X509Data><ds:X509Certificate>{body}</ds:X509Certificate></ds:X509Data></ds:KeyInfo>
<ds:Object>
<xades:QualifyingProperties xmlns:xades="{NS_XADES}" Target="signature">
<xades:SignedProperties Id="xadesSignedProperties">
<xades:SignedSignatureProperties>
<xades:SigningTime>{time}</xades:SigningTime>
<xades:SigningCertificate>
<xades:Cert>
<xades:CertDigest>
<ds:DigestMethod Algorithm="{ALG_SHA256}"></ds:DigestMethod>
<ds:DigestValue>{cert_digest}</ds:DigestValue>
</xades:CertDigest>
<xades:IssuerSerial>
<ds:X509IssuerName>{issuer}</ds:X509IssuerName>
<ds:X509SerialNumber>{serial}</ds:X509SerialNumber>
</xades:IssuerSerial>
</xades:Cert>
</xades:SigningCertificate>
</xades:SignedSignatureProperties>
</xades:SignedProperties>
</xades:QualifyingProperties>
</ds:Object>
</ds:Signature>
</sac:SignatureInformation>
</sig:UBLDocumentSignatures>"##,
        invoice_hash = parts.invoice_hash,
        signature_value = parts.signature_value,
        body = cert.body,
        cert_digest = cert.digest,
        serial = cert.serial_number,
    ))
}
