//! Tag-length-value QR payload.
//!
//! Tags 1-5 are UTF-8 text, tags 6-9 are raw bytes. A length below 128 is a
//! single byte; longer values use `0x81 len` or `0x82 hi lo`.

use base64::{Engine, engine::general_purpose};

use crate::error::{ComplianceError, Result};

pub const TAG_SELLER_NAME: u8 = 1;
pub const TAG_VAT_NUMBER: u8 = 2;
pub const TAG_TIMESTAMP: u8 = 3;
pub const TAG_TOTAL_WITH_VAT: u8 = 4;
pub const TAG_VAT_TOTAL: u8 = 5;
pub const TAG_INVOICE_HASH: u8 = 6;
pub const TAG_SIGNATURE: u8 = 7;
pub const TAG_PUBLIC_KEY: u8 = 8;
pub const TAG_CERTIFICATE_SIGNATURE: u8 = 9;

const MAX_VALUE_LEN: usize = 0xFFFF;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrPayload {
    pub seller_name: String,
    pub vat_number: String,
    pub timestamp: String,
    pub total_with_vat: String,
    pub vat_total: String,
    pub invoice_hash: Vec<u8>,
    pub signature: Vec<u8>,
    pub public_key: Vec<u8>,
    pub certificate_signature: Vec<u8>,
}

fn push_record(out: &mut Vec<u8>, tag: u8, value: &[u8]) -> Result<()> {
    let len = value.len();
    if len > MAX_VALUE_LEN {
        return Err(ComplianceError::format(
            "qr",
            format!("tag {tag} value is {len} bytes, more than a QR record can carry"),
        ));
    }
    out.push(tag);
    if len < 0x80 {
        out.push(len as u8);
    } else if len <= 0xFF {
        out.extend_from_slice(&[0x81, len as u8]);
    } else {
        out.extend_from_slice(&[0x82, (len >> 8) as u8, (len & 0xFF) as u8]);
    }
    out.extend_from_slice(value);
    Ok(())
}

impl QrPayload {
    pub fn to_tlv(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(256);
        push_record(&mut out, TAG_SELLER_NAME, self.seller_name.as_bytes())?;
        push_record(&mut out, TAG_VAT_NUMBER, self.vat_number.as_bytes())?;
        push_record(&mut out, TAG_TIMESTAMP, self.timestamp.as_bytes())?;
        push_record(&mut out, TAG_TOTAL_WITH_VAT, self.total_with_vat.as_bytes())?;
        push_record(&mut out, TAG_VAT_TOTAL, self.vat_total.as_bytes())?;
        push_record(&mut out, TAG_INVOICE_HASH, &self.invoice_hash)?;
        push_record(&mut out, TAG_SIGNATURE, &self.signature)?;
        push_record(&mut out, TAG_PUBLIC_KEY, &self.public_key)?;
        push_record(&mut out, TAG_CERTIFICATE_SIGNATURE, &self.certificate_signature)?;
        Ok(out)
    }

    pub fn encode(&self) -> Result<String> {
        Ok(general_purpose::STANDARD.encode(self.to_tlv()?))
    }

    pub fn decode(qr_base64: &str) -> Result<Self> {
        let bytes = general_purpose::STANDARD
            .decode(qr_base64.trim())
            .map_err(|e| ComplianceError::format("qr", format!("invalid base64: {e}")))?;
        let records = decode_tlv(&bytes)?;
        let take = |tag: u8| -> Result<Vec<u8>> {
            records
                .iter()
                .find(|(t, _)| *t == tag)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| ComplianceError::format("qr", format!("tag {tag} is missing")))
        };
        let text = |tag: u8| -> Result<String> {
            String::from_utf8(take(tag)?)
                .map_err(|_| ComplianceError::format("qr", format!("tag {tag} is not UTF-8")))
        };
        Ok(QrPayload {
            seller_name: text(TAG_SELLER_NAME)?,
            vat_number: text(TAG_VAT_NUMBER)?,
            timestamp: text(TAG_TIMESTAMP)?,
            total_with_vat: text(TAG_TOTAL_WITH_VAT)?,
            vat_total: text(TAG_VAT_TOTAL)?,
            invoice_hash: take(TAG_INVOICE_HASH)?,
            signature: take(TAG_SIGNATURE)?,
            public_key: take(TAG_PUBLIC_KEY)?,
            certificate_signature: take(TAG_CERTIFICATE_SIGNATURE)?,
        })
    }
}

/// Walks a TLV stream into `(tag, value)` records.
pub fn decode_tlv(mut bytes: &[u8]) -> Result<Vec<(u8, Vec<u8>)>> {
    let truncated = || ComplianceError::format("qr", "truncated TLV record");
    let mut records = Vec::new();
    while let Some((&tag, rest)) = bytes.split_first() {
        let (&first, rest) = rest.split_first().ok_or_else(truncated)?;
        let (len, rest) = match first {
            0x81 => {
                let (&len, rest) = rest.split_first().ok_or_else(truncated)?;
                (len as usize, rest)
            }
            0x82 => match rest {
                [hi, lo, rest @ ..] => (((*hi as usize) << 8) | *lo as usize, rest),
                _ => return Err(truncated()),
            },
            len if len < 0x80 => (len as usize, rest),
            other => {
                return Err(ComplianceError::format(
                    "qr",
                    format!("unsupported length prefix 0x{other:02x}"),
                ));
            }
        };
        if rest.len() < len {
            return Err(truncated());
        }
        let (value, rest) = rest.split_at(len);
        records.push((tag, value.to_vec()));
        bytes = rest;
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> QrPayload {
        QrPayload {
            seller_name: "شركة توريد التكنولوجيا بأقصى سرعة المحدودة | Maximum Speed Tech Supply LTD"
                .to_string(),
            vat_number: "399999999900003".to_string(),
            timestamp: "2022-09-07T12:21:28Z".to_string(),
            total_with_vat: "4.60".to_string(),
            vat_total: "0.60".to_string(),
            invoice_hash: vec![7; 32],
            signature: vec![0x30; 71],
            public_key: vec![4; 64],
            certificate_signature: vec![9; 200],
        }
    }

    #[test]
    fn round_trips_all_fields() {
        let qr = payload();
        assert_eq!(QrPayload::decode(&qr.encode().unwrap()).unwrap(), qr);
    }

    #[test]
    fn length_prefixes() {
        let mut out = Vec::new();
        push_record(&mut out, 1, &[0; 127]).unwrap();
        assert_eq!(&out[..2], &[1, 127]);

        let mut out = Vec::new();
        push_record(&mut out, 9, &[0; 200]).unwrap();
        assert_eq!(&out[..3], &[9, 0x81, 200]);

        let mut out = Vec::new();
        push_record(&mut out, 9, &[0; 300]).unwrap();
        assert_eq!(&out[..4], &[9, 0x82, 0x01, 0x2c]);
        assert_eq!(out.len(), 304);
    }

    #[test]
    fn tags_are_emitted_in_order() {
        let records = decode_tlv(&payload().to_tlv().unwrap()).unwrap();
        let tags: Vec<u8> = records.iter().map(|(t, _)| *t).collect();
        assert_eq!(tags, [1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(records[0].1.len(), payload().seller_name.len());
    }

    #[test]
    fn rejects_truncated_streams() {
        let tlv = payload().to_tlv().unwrap();
        assert!(decode_tlv(&tlv[..tlv.len() - 1]).is_err());
        assert!(decode_tlv(&[1]).is_err());
        assert!(decode_tlv(&[1, 0x82, 0x01]).is_err());
    }
}
