use std::sync::Arc;

use actix_web::{App, HttpServer, middleware, web};
use anyhow::Context;
use sqlx::PgPool;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fatoora_server::{
    config::app_config::{AppConfig, CredentialBackend, StorageBackend},
    routes::{self, AppState},
    services::{
        authority_client::HttpAuthorityClient,
        credential_provider::{CredentialProvider, OpenSslCredentialProvider, OpensslCliProvider},
        pg_store::PgStore,
        provisioner::Provisioner,
        store::{CredentialStore, MemoryStore, SubmissionStore},
        submission_client::SubmissionClient,
        tenant_lock::TenantLocks,
    },
};

type Stores = (Arc<dyn CredentialStore>, Arc<dyn SubmissionStore>);

async fn open_stores(config: &AppConfig) -> anyhow::Result<Stores> {
    match config.storage {
        StorageBackend::Postgres => {
            let pool = PgPool::connect(&config.database_url)
                .await
                .context("failed to connect to Postgres")?;
            sqlx::migrate!()
                .run(&pool)
                .await
                .context("failed to apply migrations")?;
            let store = Arc::new(PgStore::new(pool));
            let credentials: Arc<dyn CredentialStore> = store.clone();
            let submissions: Arc<dyn SubmissionStore> = store;
            Ok((credentials, submissions))
        }
        StorageBackend::Memory => {
            info!("using in-memory storage, nothing survives a restart");
            let store = Arc::new(MemoryStore::new());
            let credentials: Arc<dyn CredentialStore> = store.clone();
            let submissions: Arc<dyn SubmissionStore> = store;
            Ok((credentials, submissions))
        }
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let (credentials, submissions) = open_stores(&config).await?;

    let authority = Arc::new(
        HttpAuthorityClient::new(config.authority_timeout, config.authority_base_url.clone())
            .context("failed to build the authority client")?,
    );
    let locks = Arc::new(TenantLocks::new());
    let provider: Arc<dyn CredentialProvider> = match &config.credential_backend {
        CredentialBackend::Native => Arc::new(OpenSslCredentialProvider),
        CredentialBackend::Cli(binary) => Arc::new(OpensslCliProvider {
            binary: binary.clone(),
        }),
    };

    let state = web::Data::new(AppState {
        provisioner: Provisioner::new(
            credentials.clone(),
            provider,
            authority.clone(),
            locks.clone(),
        ),
        submissions: SubmissionClient::new(credentials, submissions, authority, locks),
    });

    info!(
        port = config.port,
        storage = ?config.storage,
        credentials = ?config.credential_backend,
        "server starting"
    );

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(routes::configure)
    })
    .bind(("0.0.0.0", config.port))
    .with_context(|| format!("failed to bind port {}", config.port))?
    .run()
    .await
    .context("server terminated with an error")
}
