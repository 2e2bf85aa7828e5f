pub mod credential_model;
pub mod enrollment_dto;
pub mod invoice_model;
pub mod onboard_dto;
pub mod submission_model;
pub mod submit_invoice_dto;
pub mod submit_invoice_response_dto;
