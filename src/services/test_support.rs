//! Fixtures shared by the unit tests.

use std::{collections::VecDeque, sync::Mutex};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose};
use chrono::Utc;
use openssl::{
    asn1::Asn1Time,
    bn::{BigNum, MsbOption},
    ec::{EcGroup, EcKey},
    hash::MessageDigest,
    nid::Nid,
    pkey::{HasPublic, PKey, PKeyRef, Private},
    x509::{X509, X509NameBuilder, X509NameRef, X509Req},
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    config::authority::AuthorityEnvironment,
    error::{ComplianceError, Result},
    models::{
        credential_model::{CredentialRecord, CredentialStatus, CsrConfig, Csid, TenantId},
        enrollment_dto::CsidResponse,
        invoice_model::{Address, Party},
        submission_model::{DocumentKind, SubmissionMode, SubmissionRecord, SubmissionStatus},
        submit_invoice_dto::InvoiceSubmission,
    },
    services::{
        authority_client::{AuthorityApi, AuthorityReply, interpret_submission},
        pki_service::decode_certificate_token,
    },
};

fn issue<T: HasPublic>(
    subject: &X509NameRef,
    public_key: &PKeyRef<T>,
    issuer: &X509NameRef,
    signing_key: &PKeyRef<Private>,
) -> X509 {
    let mut serial = BigNum::new().unwrap();
    serial.rand(64, MsbOption::MAYBE_ZERO, false).unwrap();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    builder
        .set_serial_number(&serial.to_asn1_integer().unwrap())
        .unwrap();
    builder.set_subject_name(subject).unwrap();
    builder.set_issuer_name(issuer).unwrap();
    builder.set_pubkey(public_key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(365).unwrap())
        .unwrap();
    builder.sign(signing_key, MessageDigest::sha256()).unwrap();
    builder.build()
}

pub fn secp256k1_key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::SECP256K1).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

/// Key plus certificate issued to `CN=EGS1-886431145, O=..., C=SA`.
pub fn self_signed() -> (PKey<Private>, X509) {
    let key = secp256k1_key();
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::COUNTRYNAME, "SA").unwrap();
    name.append_entry_by_nid(Nid::ORGANIZATIONNAME, "Maximum Speed Tech Supply LTD")
        .unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, "EGS1-886431145").unwrap();
    let name = name.build();
    let cert = issue(&name, &key, &name, &key);
    (key, cert)
}

/// The `binarySecurityToken` form: base64 of the base64 DER body.
pub fn certificate_token(cert: &X509) -> String {
    let body = general_purpose::STANDARD.encode(cert.to_der().unwrap());
    general_purpose::STANDARD.encode(body)
}

pub fn credential_with_status(
    tenant: TenantId,
    status: CredentialStatus,
    key: &PKey<Private>,
    cert: &X509,
) -> CredentialRecord {
    let csid = |secret: &str, request_id: &str| Csid {
        certificate: certificate_token(cert),
        secret: secret.to_string(),
        request_id: request_id.to_string(),
    };
    let now = Utc::now();
    CredentialRecord {
        id: Uuid::new_v4(),
        tenant_id: tenant,
        environment: AuthorityEnvironment::Sandbox,
        status,
        private_key_pem: String::from_utf8(key.private_key_to_pem_pkcs8().unwrap()).unwrap(),
        public_key_pem: String::from_utf8(key.public_key_to_pem().unwrap()).unwrap(),
        csr_pem: "-----BEGIN CERTIFICATE REQUEST-----\nMIIB\n-----END CERTIFICATE REQUEST-----\n"
            .to_string(),
        compliance: (status >= CredentialStatus::ComplianceIssued)
            .then(|| csid("compliance-secret", "1234567890123")),
        production: (status == CredentialStatus::ProductionIssued)
            .then(|| csid("production-secret", "30368")),
        active: true,
        created_at: now,
        updated_at: now,
    }
}

pub fn sample_csr_config(environment: AuthorityEnvironment) -> CsrConfig {
    CsrConfig {
        common_name: "EGS1-886431145".into(),
        serial_number: "1-TST|2-TST|3-ed22f1d8-e6a2-1118-9b58-d9a8f11e445f".into(),
        organization_identifier: "399999999900003".into(),
        organization_name: "Maximum Speed Tech Supply LTD".into(),
        organization_unit: None,
        country_name: "SA".into(),
        invoice_type: "1100".into(),
        location: "Riyadh".into(),
        industry: "Supply activities".into(),
        environment,
    }
}

pub fn sample_seller() -> Party {
    Party {
        name: "Maximum Speed Tech Supply LTD".into(),
        vat_number: Some("399999999900003".into()),
        commercial_registration: Some("1010010000".into()),
        address: Address {
            street: "Prince Sultan".into(),
            building_number: Some("2322".into()),
            district: "Al-Murabba".into(),
            city: "Riyadh".into(),
            postal_code: "23333".into(),
            country: "SA".into(),
        },
    }
}

/// An unsigned invoice with empty signature and QR slots.
pub fn sample_invoice(subtype: &str, type_code: &str, icv: u64, pih: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Invoice xmlns="urn:oasis:names:specification:ubl:schema:xsd:Invoice-2" xmlns:cac="urn:oasis:names:specification:ubl:schema:xsd:CommonAggregateComponents-2" xmlns:cbc="urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2" xmlns:ext="urn:oasis:names:specification:ubl:schema:xsd:CommonExtensionComponents-2">
    <ext:UBLExtensions>
        <ext:UBLExtension>
            <ext:ExtensionURI>urn:oasis:names:specification:ubl:dsig:enveloped:xades</ext:ExtensionURI>
            <ext:ExtensionContent></ext:ExtensionContent>
        </ext:UBLExtension>
    </ext:UBLExtensions>
    <cbc:ProfileID>reporting:1.0</cbc:ProfileID>
    <cbc:ID>SME{icv:05}</cbc:ID>
    <cbc:UUID>8e6000cf-1a98-4174-b3e7-b5d5954bc10d</cbc:UUID>
    <cbc:IssueDate>2022-09-07</cbc:IssueDate>
    <cbc:IssueTime>12:21:28</cbc:IssueTime>
    <cbc:InvoiceTypeCode name="{subtype}">{type_code}</cbc:InvoiceTypeCode>
    <cbc:DocumentCurrencyCode>SAR</cbc:DocumentCurrencyCode>
    <cbc:TaxCurrencyCode>SAR</cbc:TaxCurrencyCode>
    <cac:AdditionalDocumentReference>
        <cbc:ID>ICV</cbc:ID>
        <cbc:UUID>{icv}</cbc:UUID>
    </cac:AdditionalDocumentReference>
    <cac:AdditionalDocumentReference>
        <cbc:ID>PIH</cbc:ID>
        <cac:Attachment>
            <cbc:EmbeddedDocumentBinaryObject mimeCode="text/plain">{pih}</cbc:EmbeddedDocumentBinaryObject>
        </cac:Attachment>
    </cac:AdditionalDocumentReference>
    <cac:AdditionalDocumentReference>
        <cbc:ID>QR</cbc:ID>
        <cac:Attachment>
            <cbc:EmbeddedDocumentBinaryObject mimeCode="text/plain"></cbc:EmbeddedDocumentBinaryObject>
        </cac:Attachment>
    </cac:AdditionalDocumentReference>
    <cac:Signature>
        <cbc:ID>urn:oasis:names:specification:ubl:signature:Invoice</cbc:ID>
        <cbc:SignatureMethod>urn:oasis:names:specification:ubl:dsig:enveloped:xades</cbc:SignatureMethod>
    </cac:Signature>
    <cac:AccountingSupplierParty>
        <cac:Party>
            <cac:PartyIdentification>
                <cbc:ID schemeID="CRN">1010010000</cbc:ID>
            </cac:PartyIdentification>
            <cac:PostalAddress>
                <cbc:StreetName>Prince Sultan</cbc:StreetName>
                <cbc:CityName>Riyadh</cbc:CityName>
                <cac:Country>
                    <cbc:IdentificationCode>SA</cbc:IdentificationCode>
                </cac:Country>
            </cac:PostalAddress>
            <cac:PartyTaxScheme>
                <cbc:CompanyID>399999999900003</cbc:CompanyID>
                <cac:TaxScheme>
                    <cbc:ID>VAT</cbc:ID>
                </cac:TaxScheme>
            </cac:PartyTaxScheme>
            <cac:PartyLegalEntity>
                <cbc:RegistrationName>Maximum Speed Tech Supply LTD</cbc:RegistrationName>
            </cac:PartyLegalEntity>
        </cac:Party>
    </cac:AccountingSupplierParty>
    <cac:AccountingCustomerParty/>
    <cac:TaxTotal>
        <cbc:TaxAmount currencyID="SAR">0.60</cbc:TaxAmount>
    </cac:TaxTotal>
    <cac:TaxTotal>
        <cbc:TaxAmount currencyID="SAR">0.60</cbc:TaxAmount>
        <cac:TaxSubtotal>
            <cbc:TaxableAmount currencyID="SAR">4.00</cbc:TaxableAmount>
            <cbc:TaxAmount currencyID="SAR">0.60</cbc:TaxAmount>
            <cac:TaxCategory>
                <cbc:ID>S</cbc:ID>
                <cbc:Percent>15.00</cbc:Percent>
            </cac:TaxCategory>
        </cac:TaxSubtotal>
    </cac:TaxTotal>
    <cac:LegalMonetaryTotal>
        <cbc:LineExtensionAmount currencyID="SAR">4.00</cbc:LineExtensionAmount>
        <cbc:TaxExclusiveAmount currencyID="SAR">4.00</cbc:TaxExclusiveAmount>
        <cbc:TaxInclusiveAmount currencyID="SAR">4.60</cbc:TaxInclusiveAmount>
        <cbc:PayableAmount currencyID="SAR">4.60</cbc:PayableAmount>
    </cac:LegalMonetaryTotal>
    <cac:InvoiceLine>
        <cbc:ID>1</cbc:ID>
        <cbc:InvoicedQuantity unitCode="PCE">2.000000</cbc:InvoicedQuantity>
        <cbc:LineExtensionAmount currencyID="SAR">4.00</cbc:LineExtensionAmount>
        <cac:Item>
            <cbc:Name>Pencil &amp; eraser</cbc:Name>
        </cac:Item>
        <cac:Price>
            <cbc:PriceAmount currencyID="SAR">2.00</cbc:PriceAmount>
        </cac:Price>
    </cac:InvoiceLine>
</Invoice>
"#
    )
}

pub fn record(
    tenant: TenantId,
    counter: u64,
    hash: &str,
    previous: &str,
    mode: SubmissionMode,
    status: SubmissionStatus,
) -> SubmissionRecord {
    SubmissionRecord {
        id: Uuid::new_v4(),
        tenant_id: tenant,
        document_type: DocumentKind::Invoice,
        document_id: format!("INV-{counter}"),
        document_uuid: Uuid::new_v4().to_string(),
        xml_hash: hash.to_string(),
        signature: "c2ln".to_string(),
        qr_code: "cXI=".to_string(),
        invoice_counter: counter,
        previous_hash: previous.to_string(),
        mode,
        status,
        authority_response: None,
        error_message: None,
        signed_xml: String::new(),
        submitted_at: Utc::now(),
    }
}

/// In-memory authority: issues real certificates from a throwaway CA and
/// answers submissions from a script, defaulting to PASS.
pub struct ScriptedAuthority {
    ca_key: PKey<Private>,
    ca_cert: X509,
    script: Mutex<VecDeque<Result<AuthorityReply>>>,
    sent: Mutex<Vec<(SubmissionMode, InvoiceSubmission)>>,
}

impl ScriptedAuthority {
    pub const OTP: &'static str = "123456";

    pub fn new() -> Self {
        let (ca_key, ca_cert) = self_signed();
        ScriptedAuthority {
            ca_key,
            ca_cert,
            script: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn push_reply(&self, reply: AuthorityReply) {
        self.script.lock().unwrap().push_back(Ok(reply));
    }

    pub fn push_error(&self, error: ComplianceError) {
        self.script.lock().unwrap().push_back(Err(error));
    }

    /// Mode and document UUID of everything submitted so far.
    pub fn submissions(&self) -> Vec<(SubmissionMode, String)> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(mode, s)| (*mode, s.uuid.clone()))
            .collect()
    }

    pub fn warning() -> AuthorityReply {
        interpret_submission(
            202,
            json!({
                "validationResults": {
                    "infoMessages": [],
                    "warningMessages": [{"type": "WARNING", "code": "BR-KSA-98", "category": "KSA", "message": "simplified invoice reported late", "status": "WARNING"}],
                    "errorMessages": [],
                    "status": "WARNING"
                },
                "reportingStatus": "REPORTED"
            }),
        )
        .unwrap()
    }

    pub fn rejection() -> AuthorityReply {
        interpret_submission(
            400,
            json!({
                "validationResults": {
                    "infoMessages": [],
                    "warningMessages": [],
                    "errorMessages": [{"type": "ERROR", "code": "invalid-invoice-hash", "category": "INVOICE_HASHING_ERRORS", "message": "The invoice hash API body does not match the calculated Hash", "status": "ERROR"}],
                    "status": "ERROR"
                },
                "reportingStatus": "NOT_REPORTED"
            }),
        )
        .unwrap()
    }

    fn pass(mode: SubmissionMode, submission: &InvoiceSubmission) -> AuthorityReply {
        let mut body = json!({
            "validationResults": {
                "infoMessages": [{"type": "INFO", "code": "XSD_ZATCA_VALID", "category": "XSD validation", "message": "Complied with UBL 2.1 standards in line with ZATCA specifications", "status": "PASS"}],
                "warningMessages": [],
                "errorMessages": [],
                "status": "PASS"
            }
        });
        match mode {
            SubmissionMode::Clearance => {
                body["clearanceStatus"] = json!("CLEARED");
                body["clearedInvoice"] = json!(submission.invoice);
            }
            SubmissionMode::Reporting | SubmissionMode::ComplianceTest => {
                body["reportingStatus"] = json!("REPORTED");
            }
        }
        interpret_submission(200, body).unwrap()
    }

    fn issue_token<T: HasPublic>(&self, subject: &X509NameRef, key: &PKeyRef<T>) -> String {
        certificate_token(&issue(subject, key, self.ca_cert.subject_name(), &self.ca_key))
    }
}

#[async_trait]
impl AuthorityApi for ScriptedAuthority {
    async fn compliance_csid(
        &self,
        _environment: AuthorityEnvironment,
        csr_base64: &str,
        otp: &str,
    ) -> Result<CsidResponse> {
        if otp != Self::OTP {
            return Err(ComplianceError::AuthorityRejected {
                status: 400,
                message: "Invalid OTP".into(),
                payload: json!({"errors": [{"code": "Invalid-OTP", "message": "Invalid OTP"}]}),
            });
        }
        let pem = general_purpose::STANDARD.decode(csr_base64).unwrap();
        let csr = X509Req::from_pem(&pem).unwrap();
        assert!(csr.verify(&csr.public_key().unwrap()).unwrap());
        let token = self.issue_token(csr.subject_name(), &csr.public_key().unwrap());
        Ok(serde_json::from_value(json!({
            "requestID": 1234567890123u64,
            "dispositionMessage": "ISSUED",
            "binarySecurityToken": token,
            "secret": "compliance-secret"
        }))
        .unwrap())
    }

    async fn production_csid(
        &self,
        _environment: AuthorityEnvironment,
        compliance: &Csid,
    ) -> Result<CsidResponse> {
        let cert = decode_certificate_token(&compliance.certificate)?;
        let token = self.issue_token(cert.subject_name(), &cert.public_key().unwrap());
        Ok(serde_json::from_value(json!({
            "requestID": "30368",
            "dispositionMessage": "ISSUED",
            "binarySecurityToken": token,
            "secret": "production-secret"
        }))
        .unwrap())
    }

    async fn submit(
        &self,
        _environment: AuthorityEnvironment,
        mode: SubmissionMode,
        _csid: &Csid,
        submission: &InvoiceSubmission,
    ) -> Result<AuthorityReply> {
        self.sent.lock().unwrap().push((mode, submission.clone()));
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(Self::pass(mode, submission)))
    }
}
