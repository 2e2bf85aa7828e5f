//! ZATCA e-invoicing engine: canonicalization, the per-tenant hash chain,
//! XAdES signing with the QR payload, credential provisioning and
//! submission to the authority.

pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
