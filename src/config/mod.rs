pub mod app_config;
pub mod authority;
pub mod crypto_config;
