use actix_web::{HttpResponse, web};

use crate::{
    models::{
        credential_model::TenantId,
        onboard_dto::{OnBoardResponseDto, OnboardDto},
    },
    routes::AppState,
};

/// Generates a key pair and CSR for the tenant, superseding any earlier one.
pub async fn on_board(
    tenant: web::Path<TenantId>,
    data: web::Json<OnboardDto>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, actix_web::Error> {
    let config = data.into_inner().into_csr_config();
    let record = state.provisioner.onboard(tenant.into_inner(), config).await?;

    Ok(HttpResponse::Created().json(OnBoardResponseDto {
        message: "credential generated, exchange the CSR for a compliance CSID next".to_owned(),
        credential: record.view(),
    }))
}

pub async fn credential_status(
    tenant: web::Path<TenantId>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, actix_web::Error> {
    let record = state.provisioner.credential(tenant.into_inner()).await?;
    Ok(HttpResponse::Ok().json(record.view()))
}
