use actix_web::{HttpResponse, Responder, web};

use crate::services::{provisioner::Provisioner, submission_client::SubmissionClient};

pub mod compliance;
pub mod enroll;
pub mod on_boarding;
pub mod submit_invoice;

/// Shared by every worker.
pub struct AppState {
    pub provisioner: Provisioner,
    pub submissions: SubmissionClient,
}

pub async fn health_check() -> impl Responder {
    HttpResponse::Ok()
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health_check", web::get().to(health_check))
        .service(
            web::scope("/tenants/{id}")
                .route("/credentials", web::post().to(on_boarding::on_board))
                .route("/credentials", web::get().to(on_boarding::credential_status))
                .route("/csid/compliance", web::post().to(enroll::enroll_compliance))
                .route("/csid/production", web::post().to(enroll::enroll_production))
                .route(
                    "/compliance-checks",
                    web::post().to(compliance::run_compliance_checks),
                )
                .route("/chain", web::get().to(submit_invoice::chain_status))
                .route("/submissions", web::post().to(submit_invoice::submit_invoice))
                .route("/submissions", web::get().to(submit_invoice::list_submissions)),
        );
}
