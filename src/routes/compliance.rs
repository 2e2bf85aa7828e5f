use actix_web::{HttpResponse, web};

use crate::{
    models::{credential_model::TenantId, onboard_dto::ComplianceCheckDto},
    routes::AppState,
};

/// Runs the canned compliance documents for the seller profile.
pub async fn run_compliance_checks(
    tenant: web::Path<TenantId>,
    dto: web::Json<ComplianceCheckDto>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, actix_web::Error> {
    let report = state
        .submissions
        .run_compliance_checks(tenant.into_inner(), &dto.seller)
        .await?;
    Ok(HttpResponse::Ok().json(report))
}
