use anyhow::{Context, Result};
use axum::Router;
use std::{io::ErrorKind, path::Path, sync::Arc};
use tokio::{fs, net::TcpListener};
use tracing_subscriber::EnvFilter;
use tracking_evidence::{
    config::{AppConfig, MetadataBackend, UPLOAD_BODY_LIMIT},
    routes,
    services::{
        evidence_service::EvidenceService,
        file_store::LocalFileStore,
        metadata_store::{
            InMemoryMetadataStore, JsonFileMetadataStore, MetadataStore, SqliteMetadataStore,
        },
        path_resolver::PathResolver,
        tracking_lookup::StaticTrackingDirectory,
    },
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + run mode ---
    let (cfg, mode) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting tracking-evidence with config: {:?}", cfg);

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)
            .await
            .with_context(|| format!("creating storage directory {}", cfg.storage_dir))?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize metadata store ---
    let metadata: Arc<dyn MetadataStore> = match cfg.metadata_backend {
        MetadataBackend::Memory => {
            tracing::warn!("In-memory metadata backend selected; records are lost on restart");
            Arc::new(InMemoryMetadataStore::new())
        }
        MetadataBackend::Json => Arc::new(
            JsonFileMetadataStore::open(&cfg.metadata_dir)
                .await
                .with_context(|| format!("opening metadata directory {}", cfg.metadata_dir))?,
        ),
        MetadataBackend::Sqlite => Arc::new(open_sqlite(&cfg.database_url).await?),
    };

    // --- Handle migration mode ---
    if mode.migrate {
        if cfg.metadata_backend == MetadataBackend::Sqlite {
            tracing::info!("Database migration complete.");
        } else {
            tracing::info!(
                "Metadata backend {:?} has no schema; nothing to migrate.",
                cfg.metadata_backend
            );
        }
        return Ok(()); // exit after migration
    }

    // --- Initialize core service ---
    let service = EvidenceService::new(
        Arc::new(StaticTrackingDirectory::seeded()),
        PathResolver::new(&cfg.storage_dir),
        Arc::new(LocalFileStore::new(cfg.io_timeout())),
        metadata,
    );

    // --- Handle reconcile mode ---
    if mode.reconcile {
        let report = service.reconcile().await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    // --- Build router ---
    let app: Router = routes::routes::routes(UPLOAD_BODY_LIMIT).with_state(service);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Connect to SQLite (creating the parent directory and database file when
/// missing) and apply the bundled schema.
async fn open_sqlite(db_url: &str) -> Result<SqliteMetadataStore> {
    tracing::debug!("Connecting using raw URL => {}", db_url);

    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).await?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let store = SqliteMetadataStore::connect(db_url)
        .await
        .with_context(|| format!("connecting to {}", db_url))?;
    store.migrate().await.context("running migrations")?;
    Ok(store)
}
