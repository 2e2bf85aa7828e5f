use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{
    error::{ChainIntegrityError, ComplianceError, Result},
    models::{
        credential_model::{CredentialRecord, Csid, TenantId},
        submission_model::{SubmissionFilter, SubmissionRecord},
    },
    services::store::{CredentialStore, SubmissionStore},
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }
}

const CREDENTIAL_COLUMNS: &str = "id, tenant_id, environment, status, private_key_pem, \
    public_key_pem, csr_pem, compliance_certificate, compliance_secret, compliance_request_id, \
    production_certificate, production_secret, production_request_id, active, created_at, updated_at";

const SUBMISSION_COLUMNS: &str = "id, tenant_id, document_type, document_id, document_uuid, \
    xml_hash, signature, qr_code, invoice_counter, previous_hash, mode, status, \
    authority_response, error_message, signed_xml, submitted_at";

fn parse_column<T>(row: &PgRow, column: &str) -> Result<T>
where
    T: std::str::FromStr<Err = ComplianceError>,
{
    let raw: String = row.try_get(column)?;
    raw.parse()
}

fn csid_from_row(row: &PgRow, prefix: &str) -> Result<Option<Csid>> {
    let certificate: Option<String> = row.try_get(format!("{prefix}_certificate").as_str())?;
    let secret: Option<String> = row.try_get(format!("{prefix}_secret").as_str())?;
    let request_id: Option<String> = row.try_get(format!("{prefix}_request_id").as_str())?;
    Ok(match (certificate, secret, request_id) {
        (Some(certificate), Some(secret), Some(request_id)) => Some(Csid {
            certificate,
            secret,
            request_id,
        }),
        (None, None, None) => None,
        _ => {
            return Err(ComplianceError::Storage(format!(
                "{prefix} CSID columns are partially filled"
            )));
        }
    })
}

fn credential_from_row(row: &PgRow) -> Result<CredentialRecord> {
    Ok(CredentialRecord {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        environment: parse_column(row, "environment")?,
        status: parse_column(row, "status")?,
        private_key_pem: row.try_get("private_key_pem")?,
        public_key_pem: row.try_get("public_key_pem")?,
        csr_pem: row.try_get("csr_pem")?,
        compliance: csid_from_row(row, "compliance")?,
        production: csid_from_row(row, "production")?,
        active: row.try_get("active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn submission_from_row(row: &PgRow) -> Result<SubmissionRecord> {
    let counter: i64 = row.try_get("invoice_counter")?;
    let submitted_at: DateTime<Utc> = row.try_get("submitted_at")?;
    Ok(SubmissionRecord {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        document_type: parse_column(row, "document_type")?,
        document_id: row.try_get("document_id")?,
        document_uuid: row.try_get("document_uuid")?,
        xml_hash: row.try_get("xml_hash")?,
        signature: row.try_get("signature")?,
        qr_code: row.try_get("qr_code")?,
        invoice_counter: u64::try_from(counter).map_err(|_| {
            ComplianceError::Storage(format!("negative invoice counter {counter}"))
        })?,
        previous_hash: row.try_get("previous_hash")?,
        mode: parse_column(row, "mode")?,
        status: parse_column(row, "status")?,
        authority_response: row.try_get("authority_response")?,
        error_message: row.try_get("error_message")?,
        signed_xml: row.try_get("signed_xml")?,
        submitted_at,
    })
}

fn counter_param(counter: u64) -> Result<i64> {
    i64::try_from(counter)
        .map_err(|_| ComplianceError::Storage(format!("invoice counter {counter} is out of range")))
}

fn csid_parts(csid: Option<&Csid>) -> (Option<&str>, Option<&str>, Option<&str>) {
    match csid {
        Some(c) => (
            Some(c.certificate.as_str()),
            Some(c.secret.as_str()),
            Some(c.request_id.as_str()),
        ),
        None => (None, None, None),
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn active_credential(&self, tenant: TenantId) -> Result<Option<CredentialRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM credential_records WHERE tenant_id = $1 AND active"
        ))
        .bind(tenant)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(credential_from_row).transpose()
    }

    async fn supersede(&self, record: &CredentialRecord) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE credential_records SET active = FALSE, updated_at = now() \
             WHERE tenant_id = $1 AND active",
        )
        .bind(record.tenant_id)
        .execute(&mut *tx)
        .await?;

        let (c_cert, c_secret, c_request) = csid_parts(record.compliance.as_ref());
        let (p_cert, p_secret, p_request) = csid_parts(record.production.as_ref());
        sqlx::query(&format!(
            "INSERT INTO credential_records ({CREDENTIAL_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, TRUE, $14, $15)"
        ))
        .bind(record.id)
        .bind(record.tenant_id)
        .bind(record.environment.as_str())
        .bind(record.status.as_str())
        .bind(&record.private_key_pem)
        .bind(&record.public_key_pem)
        .bind(&record.csr_pem)
        .bind(c_cert)
        .bind(c_secret)
        .bind(c_request)
        .bind(p_cert)
        .bind(p_secret)
        .bind(p_request)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn update_credential(&self, record: &CredentialRecord) -> Result<()> {
        let (c_cert, c_secret, c_request) = csid_parts(record.compliance.as_ref());
        let (p_cert, p_secret, p_request) = csid_parts(record.production.as_ref());
        let result = sqlx::query(
            "UPDATE credential_records SET status = $2, \
             compliance_certificate = $3, compliance_secret = $4, compliance_request_id = $5, \
             production_certificate = $6, production_secret = $7, production_request_id = $8, \
             updated_at = $9 \
             WHERE id = $1 AND active",
        )
        .bind(record.id)
        .bind(record.status.as_str())
        .bind(c_cert)
        .bind(c_secret)
        .bind(c_request)
        .bind(p_cert)
        .bind(p_secret)
        .bind(p_request)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(ComplianceError::Storage(format!(
                "no active credential with id {}",
                record.id
            )));
        }
        Ok(())
    }
}

const LIVE_ACCEPTED: &str =
    "mode IN ('clearance', 'reporting') AND status IN ('success', 'warning')";

#[async_trait]
impl SubmissionStore for PgStore {
    async fn last_live_success(&self, tenant: TenantId) -> Result<Option<SubmissionRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {SUBMISSION_COLUMNS} FROM submission_records \
             WHERE tenant_id = $1 AND {LIVE_ACCEPTED} \
             ORDER BY invoice_counter DESC LIMIT 1"
        ))
        .bind(tenant)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(submission_from_row).transpose()
    }

    async fn append(&self, record: &SubmissionRecord) -> Result<()> {
        let result = sqlx::query(&format!(
            "INSERT INTO submission_records ({SUBMISSION_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)"
        ))
        .bind(record.id)
        .bind(record.tenant_id)
        .bind(record.document_type.as_str())
        .bind(&record.document_id)
        .bind(&record.document_uuid)
        .bind(&record.xml_hash)
        .bind(&record.signature)
        .bind(&record.qr_code)
        .bind(counter_param(record.invoice_counter)?)
        .bind(&record.previous_hash)
        .bind(record.mode.as_str())
        .bind(record.status.as_str())
        .bind(&record.authority_response)
        .bind(&record.error_message)
        .bind(&record.signed_xml)
        .bind(record.submitted_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            // only the partial index on accepted live counters is unique
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(ChainIntegrityError::DuplicateCounter {
                    counter: record.invoice_counter,
                }
                .into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list(
        &self,
        tenant: TenantId,
        filter: &SubmissionFilter,
    ) -> Result<Vec<SubmissionRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {SUBMISSION_COLUMNS} FROM submission_records \
             WHERE tenant_id = $1 \
               AND ($2::text IS NULL OR status = $2) \
               AND ($3::text IS NULL OR mode = $3) \
             ORDER BY submitted_at DESC, id DESC \
             LIMIT $4 OFFSET $5"
        ))
        .bind(tenant)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.mode.map(|m| m.as_str()))
        .bind(i64::from(filter.limit()))
        .bind(i64::from(filter.offset()))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(submission_from_row).collect()
    }

    async fn live_history(&self, tenant: TenantId) -> Result<Vec<SubmissionRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {SUBMISSION_COLUMNS} FROM submission_records \
             WHERE tenant_id = $1 AND {LIVE_ACCEPTED} \
             ORDER BY invoice_counter ASC"
        ))
        .bind(tenant)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(submission_from_row).collect()
    }
}
