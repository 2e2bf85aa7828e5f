use actix_web::{HttpResponse, web};
use tracing::info;

use crate::{
    models::{
        credential_model::TenantId, submission_model::SubmissionFilter,
        submit_invoice_dto::SubmitInvoiceDto,
    },
    routes::AppState,
    services::submission_client::SubmissionRequest,
};

/// Signs the unsigned document and clears or reports it.
pub async fn submit_invoice(
    tenant: web::Path<TenantId>,
    invoice_dto: web::Json<SubmitInvoiceDto>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, actix_web::Error> {
    let intermediate_dto = invoice_dto.into_inner().parse()?;
    let tenant_id = tenant.into_inner();
    info!(tenant = tenant_id, document = %intermediate_dto.document_id, "submission received");

    let outcome = state
        .submissions
        .submit(SubmissionRequest {
            tenant_id,
            document_type: intermediate_dto.document_type,
            document_id: intermediate_dto.document_id,
            unsigned_xml: intermediate_dto.unsigned_xml,
        })
        .await?;
    Ok(HttpResponse::Ok().json(outcome))
}

pub async fn list_submissions(
    tenant: web::Path<TenantId>,
    filter: web::Query<SubmissionFilter>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, actix_web::Error> {
    let records = state
        .submissions
        .history(tenant.into_inner(), &filter)
        .await?;
    Ok(HttpResponse::Ok().json(records))
}

/// Next previous-hash and counter, after verifying the accepted history.
pub async fn chain_status(
    tenant: web::Path<TenantId>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, actix_web::Error> {
    let report = state.submissions.chain_report(tenant.into_inner()).await?;
    Ok(HttpResponse::Ok().json(report))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actix_web::{App, test};
    use serde_json::{Value, json};

    use crate::{
        routes::{configure, tests::state},
        services::test_support::ScriptedAuthority,
    };

    #[actix_web::test]
    async fn undecodable_invoice_is_a_bad_request() {
        let data = state(Arc::new(ScriptedAuthority::new()));
        let app = test::init_service(App::new().app_data(data).configure(configure)).await;
        let req = test::TestRequest::post()
            .uri("/tenants/3/submissions")
            .set_json(json!({
                "document_type": "invoice",
                "document_id": "X-1",
                "invoice": "not base64!"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["kind"], "format");
    }

    #[actix_web::test]
    async fn empty_history_starts_at_genesis() {
        let data = state(Arc::new(ScriptedAuthority::new()));
        let app = test::init_service(App::new().app_data(data).configure(configure)).await;

        let req = test::TestRequest::get().uri("/tenants/3/submissions").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, json!([]));

        let req = test::TestRequest::get().uri("/tenants/3/chain").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["next"]["invoice_counter_value"], 1);
        assert_eq!(body["accepted_submissions"], 0);
    }
}
