use actix_web::{HttpResponse, web};

use crate::{
    models::{credential_model::TenantId, enrollment_dto::EnrollDto},
    routes::AppState,
};

/// Exchanges the tenant's CSR and portal OTP for a compliance CSID.
pub async fn enroll_compliance(
    tenant: web::Path<TenantId>,
    dto: web::Json<EnrollDto>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, actix_web::Error> {
    let otp = dto.parse()?;
    let record = state
        .provisioner
        .issue_compliance_csid(tenant.into_inner(), otp)
        .await?;
    Ok(HttpResponse::Ok().json(record.view()))
}

pub async fn enroll_production(
    tenant: web::Path<TenantId>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, actix_web::Error> {
    let record = state
        .provisioner
        .issue_production_csid(tenant.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(record.view()))
}
