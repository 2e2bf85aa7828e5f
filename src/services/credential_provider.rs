use std::{fs, path::PathBuf, process::Command};

use openssl::{
    asn1::{Asn1Object, Asn1OctetString},
    ec::{EcGroup, EcKey},
    hash::MessageDigest,
    nid::Nid,
    pkey::{PKey, Private},
    stack::Stack,
    x509::{X509Extension, X509Name, X509NameBuilder, X509Req, X509ReqBuilder},
};
use tracing::debug;

use crate::{
    error::{ComplianceError, Result},
    models::credential_model::CsrConfig,
};

const TEMPLATE_NAME_OID: &str = "1.3.6.1.4.1.311.20.2";
const SUBJECT_ALT_NAME_OID: &str = "2.5.29.17";

/// Key pair and certificate signing request for one tenant.
pub struct GeneratedCredential {
    pub private_key_pem: String,
    pub public_key_pem: String,
    pub csr_pem: String,
}

/// Produces secp256k1 keys and a CSR carrying the authority's extensions.
pub trait CredentialProvider: Send + Sync {
    fn generate(&self, config: &CsrConfig) -> Result<GeneratedCredential>;
}

fn der_length(len: usize, out: &mut Vec<u8>) {
    if len < 0x80 {
        out.push(len as u8);
    } else if len < 0x100 {
        out.extend_from_slice(&[0x81, len as u8]);
    } else {
        out.extend_from_slice(&[0x82, (len >> 8) as u8, (len & 0xFF) as u8]);
    }
}

fn der_tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    der_length(content.len(), &mut out);
    out.extend_from_slice(content);
    out
}

fn subject_name(config: &CsrConfig) -> Result<X509Name> {
    let mut name = X509NameBuilder::new()?;
    name.append_entry_by_nid(Nid::COMMONNAME, &config.common_name)?;
    name.append_entry_by_nid(Nid::ORGANIZATIONALUNITNAME, config.organization_unit_or_name())?;
    name.append_entry_by_nid(Nid::ORGANIZATIONNAME, &config.organization_name)?;
    name.append_entry_by_nid(Nid::COUNTRYNAME, &config.country_name)?;
    Ok(name.build())
}

/// `SN`, `UID`, `title`, `registeredAddress`, `businessCategory`.
fn alt_directory_name(config: &CsrConfig) -> Result<X509Name> {
    let mut name = X509NameBuilder::new()?;
    name.append_entry_by_text("SN", &config.serial_number)?;
    name.append_entry_by_text("UID", &config.organization_identifier)?;
    name.append_entry_by_text("title", &config.invoice_type)?;
    name.append_entry_by_text("registeredAddress", &config.location)?;
    name.append_entry_by_text("businessCategory", &config.industry)?;
    Ok(name.build())
}

fn extensions(config: &CsrConfig) -> Result<Stack<X509Extension>> {
    let template_oid = Asn1Object::from_str(TEMPLATE_NAME_OID)?;
    let template_name = der_tlv(0x0C, config.environment.template_name().as_bytes());
    let template_value = Asn1OctetString::new_from_bytes(&template_name)?;
    let template = X509Extension::new_from_der(&template_oid, false, &template_value)?;

    // GeneralNames ::= SEQUENCE { [4] directoryName }
    let alt_name = alt_directory_name(config)?.to_der()?;
    let san_oid = Asn1Object::from_str(SUBJECT_ALT_NAME_OID)?;
    let san_value = Asn1OctetString::new_from_bytes(&der_tlv(0x30, &der_tlv(0xA4, &alt_name)))?;
    let san = X509Extension::new_from_der(&san_oid, false, &san_value)?;

    let mut stack = Stack::new()?;
    stack.push(template)?;
    stack.push(san)?;
    Ok(stack)
}

fn utf8(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|e| ComplianceError::Crypto(e.to_string()))
}

/// In-process generation through the openssl crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenSslCredentialProvider;

impl OpenSslCredentialProvider {
    pub fn build_csr(config: &CsrConfig, key: &PKey<Private>) -> Result<X509Req> {
        let subject = subject_name(config)?;
        let extensions = extensions(config)?;
        let mut req = X509ReqBuilder::new()?;
        req.set_version(0)?;
        req.set_subject_name(&subject)?;
        req.set_pubkey(key)?;
        req.add_extensions(&extensions)?;
        req.sign(key, MessageDigest::sha256())?;
        Ok(req.build())
    }
}

impl CredentialProvider for OpenSslCredentialProvider {
    fn generate(&self, config: &CsrConfig) -> Result<GeneratedCredential> {
        config.validate()?;
        let group = EcGroup::from_curve_name(Nid::SECP256K1)?;
        let key = PKey::from_ec_key(EcKey::generate(&group)?)?;
        let csr = Self::build_csr(config, &key)?;
        debug!(common_name = %config.common_name, "generated CSR in process");
        Ok(GeneratedCredential {
            private_key_pem: utf8(key.private_key_to_pem_pkcs8()?)?,
            public_key_pem: utf8(key.public_key_to_pem()?)?,
            csr_pem: utf8(csr.to_pem()?)?,
        })
    }
}

/// Shells out to the `openssl` binary with a generated request config.
#[derive(Debug, Clone)]
pub struct OpensslCliProvider {
    pub binary: PathBuf,
}

impl Default for OpensslCliProvider {
    fn default() -> Self {
        OpensslCliProvider {
            binary: PathBuf::from("openssl"),
        }
    }
}

/// Request config in the layout `openssl req -config` expects.
pub fn render_openssl_config(config: &CsrConfig) -> Result<String> {
    let fields = [
        ("common_name", config.common_name.as_str()),
        ("serial_number", config.serial_number.as_str()),
        ("organization_identifier", config.organization_identifier.as_str()),
        ("organization_name", config.organization_name.as_str()),
        ("organization_unit", config.organization_unit_or_name()),
        ("location", config.location.as_str()),
        ("industry", config.industry.as_str()),
    ];
    for (field, value) in fields {
        if value.contains(['\n', '\r', '[', ']']) {
            return Err(ComplianceError::format(
                field,
                "must not contain line breaks or brackets",
            ));
        }
    }
    Ok(format!(
        "[req]
prompt = no
utf8 = no
distinguished_name = my_req_dn_prompt
req_extensions = v3_req

[ v3_req ]
{TEMPLATE_NAME_OID} = ASN1:UTF8String:{template}
subjectAltName=dirName:dir_sect

[ dir_sect ]
SN = {sn}
UID = {uid}
title = {title}
registeredAddress = {location}
businessCategory = {industry}

[my_req_dn_prompt]
commonName = {cn}
organizationalUnitName = {ou}
organizationName = {o}
countryName = {c}
",
        template = config.environment.template_name(),
        sn = config.serial_number,
        uid = config.organization_identifier,
        title = config.invoice_type,
        location = config.location,
        industry = config.industry,
        cn = config.common_name,
        ou = config.organization_unit_or_name(),
        o = config.organization_name,
        c = config.country_name,
    ))
}

impl OpensslCliProvider {
    fn run(&self, args: &[&str]) -> Result<()> {
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .map_err(|e| ComplianceError::Crypto(format!("failed to run openssl: {e}")))?;
        if !output.status.success() {
            return Err(ComplianceError::Crypto(format!(
                "openssl {} failed: {}",
                args.first().copied().unwrap_or_default(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

fn path_str(path: &std::path::Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| ComplianceError::Crypto("temporary path is not UTF-8".to_string()))
}

fn read(path: &std::path::Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| ComplianceError::Crypto(e.to_string()))
}

impl CredentialProvider for OpensslCliProvider {
    fn generate(&self, config: &CsrConfig) -> Result<GeneratedCredential> {
        config.validate()?;
        let rendered = render_openssl_config(config)?;

        // removed on drop together with the private key file
        let dir = tempfile::tempdir().map_err(|e| ComplianceError::Crypto(e.to_string()))?;
        let key_file = dir.path().join("private.pem");
        let pub_file = dir.path().join("public.pem");
        let csr_file = dir.path().join("csr.pem");
        let config_file = dir.path().join("csr.cnf");
        fs::write(&config_file, rendered).map_err(|e| ComplianceError::Crypto(e.to_string()))?;

        let key = path_str(&key_file)?;
        self.run(&["ecparam", "-name", "secp256k1", "-genkey", "-noout", "-out", key])?;
        self.run(&["ec", "-in", key, "-pubout", "-out", path_str(&pub_file)?])?;
        self.run(&[
            "req",
            "-new",
            "-sha256",
            "-key",
            key,
            "-config",
            path_str(&config_file)?,
            "-out",
            path_str(&csr_file)?,
        ])?;

        let csr_pem = read(&csr_file)?;
        let csr = X509Req::from_pem(csr_pem.as_bytes())?;
        let public_key = csr.public_key()?;
        if !csr.verify(&public_key)? {
            return Err(ComplianceError::Crypto(
                "CSR self-signature verification failed".to_string(),
            ));
        }
        debug!(common_name = %config.common_name, "generated CSR with the openssl binary");

        Ok(GeneratedCredential {
            private_key_pem: read(&key_file)?,
            public_key_pem: read(&pub_file)?,
            csr_pem: csr_pem.trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::authority::AuthorityEnvironment, services::test_support::sample_csr_config,
    };

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn native_csr_is_self_signed_and_carries_extensions() {
        let generated = OpenSslCredentialProvider
            .generate(&sample_csr_config(AuthorityEnvironment::Simulation))
            .unwrap();
        let csr = X509Req::from_pem(generated.csr_pem.as_bytes()).unwrap();
        assert!(csr.verify(&csr.public_key().unwrap()).unwrap());

        let cn = csr
            .subject_name()
            .entries_by_nid(Nid::COMMONNAME)
            .next()
            .unwrap()
            .data()
            .as_utf8()
            .unwrap()
            .to_string();
        assert_eq!(cn, "EGS1-886431145");
        let ou = csr
            .subject_name()
            .entries_by_nid(Nid::ORGANIZATIONALUNITNAME)
            .next()
            .unwrap()
            .data()
            .as_utf8()
            .unwrap()
            .to_string();
        assert_eq!(ou, "Maximum Speed Tech Supply LTD");

        let der = csr.to_der().unwrap();
        assert!(contains(&der, b"TSTZATCA-Code-Signing"));
        assert!(contains(&der, b"1-TST|2-TST|3-ed22f1d8-e6a2-1118-9b58-d9a8f11e445f"));
        assert!(contains(&der, b"Riyadh"));

        let key = PKey::private_key_from_pem(generated.private_key_pem.as_bytes()).unwrap();
        assert!(key.public_eq(&csr.public_key().unwrap()));
    }

    #[test]
    fn production_template_name() {
        let generated = OpenSslCredentialProvider
            .generate(&sample_csr_config(AuthorityEnvironment::Production))
            .unwrap();
        let der = X509Req::from_pem(generated.csr_pem.as_bytes())
            .unwrap()
            .to_der()
            .unwrap();
        assert!(contains(&der, b"ZATCA-Code-Signing"));
        assert!(!contains(&der, b"TSTZATCA"));
    }

    #[test]
    fn oversized_names_never_reach_openssl() {
        let mut config = sample_csr_config(AuthorityEnvironment::Sandbox);
        config.organization_name = "ش".repeat(40);
        assert!(matches!(
            OpenSslCredentialProvider.generate(&config),
            Err(ComplianceError::Format { .. })
        ));
    }

    #[test]
    fn cli_config_matches_the_request_layout() {
        let rendered = render_openssl_config(&sample_csr_config(AuthorityEnvironment::Sandbox))
            .unwrap();
        assert!(rendered.contains("1.3.6.1.4.1.311.20.2 = ASN1:UTF8String:TSTZATCA-Code-Signing"));
        assert!(rendered.contains("organizationalUnitName = Maximum Speed Tech Supply LTD"));
        assert!(rendered.contains("title = 1100"));

        let mut config = sample_csr_config(AuthorityEnvironment::Sandbox);
        config.location = "Riyadh\n[evil]".into();
        assert!(render_openssl_config(&config).is_err());
    }

    #[test]
    fn cli_provider_generates_a_valid_csr() {
        let provider = OpensslCliProvider::default();
        if std::process::Command::new(&provider.binary)
            .arg("version")
            .output()
            .is_err()
        {
            eprintln!("skipping: no openssl binary on PATH");
            return;
        }
        let generated = provider
            .generate(&sample_csr_config(AuthorityEnvironment::Sandbox))
            .unwrap();
        assert!(generated.csr_pem.starts_with("-----BEGIN CERTIFICATE REQUEST-----"));

        let csr = X509Req::from_pem(generated.csr_pem.as_bytes()).unwrap();
        let key = PKey::private_key_from_pem(generated.private_key_pem.as_bytes()).unwrap();
        assert!(key.public_eq(&csr.public_key().unwrap()));
        assert!(contains(&csr.to_der().unwrap(), b"TSTZATCA-Code-Signing"));
    }

    #[test]
    fn missing_cli_binary_is_a_crypto_error() {
        let provider = OpensslCliProvider {
            binary: PathBuf::from("/nonexistent/openssl"),
        };
        assert!(matches!(
            provider.generate(&sample_csr_config(AuthorityEnvironment::Sandbox)),
            Err(ComplianceError::Crypto(_))
        ));
    }
}
