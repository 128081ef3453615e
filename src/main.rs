//! Transport CRM import server - main entry point.
//!
//! Starts the Actix-web server with configured routes and middleware.

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, http::header};
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use transport_crm_import::api::{self, ApiDoc};
use transport_crm_import::config::{Config, ORG_ID_HEADER, StorageBackend, USER_ID_HEADER};
use transport_crm_import::db::{DbPool, UploadRepository};
use transport_crm_import::middleware::RequestLogger;
use transport_crm_import::services::{
    ImportServices, MemoryObjectStore, MemoryUploadRepository, ObjectStore, Storage,
};

/// Perform health check (for Docker healthcheck).
fn health_check() -> bool {
    // Simple check - just verify we can load config
    Config::from_env().is_ok()
}

/// Connect the object store and metadata store for the configured backend.
async fn connect_backends(
    config: &Config,
) -> Result<(Arc<dyn ObjectStore>, Arc<dyn UploadRepository>), String> {
    match config.storage.backend {
        StorageBackend::Memory => {
            warn!("Using in-memory storage - uploads are lost on restart");
            Ok((
                Arc::new(MemoryObjectStore::new()),
                Arc::new(MemoryUploadRepository::new()),
            ))
        }
        StorageBackend::S3 => {
            let pool = DbPool::new(&config.database)
                .await
                .map_err(|e| format!("Failed to initialize database: {}", e))?;
            pool.run_migrations()
                .await
                .map_err(|e| format!("Failed to run migrations: {}", e))?;
            info!("Database migrations complete");

            let storage = Storage::new(&config.storage)
                .await
                .map_err(|e| format!("Failed to initialize storage: {}", e))?;
            info!("Object storage ready (bucket: {})", config.storage.bucket);

            Ok((Arc::new(storage), Arc::new(pool)))
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Check for --health-check flag (used by Docker HEALTHCHECK)
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|arg| arg == "--health-check") {
        dotenvy::dotenv().ok();
        std::process::exit(if health_check() { 0 } else { 1 });
    }

    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            error!("");
            error!("Please check your environment variables:");
            error!("  - RUST_ENV must be set to 'development' or 'production'");
            error!("  - In production, DATABASE_URL and S3 credentials must be set");
            error!("  - In production, values must not match development defaults");
            std::process::exit(1);
        }
    };

    info!("========================================");
    info!("  Transport CRM Import Server");
    info!("  Environment: {}", config.environment);
    info!("========================================");

    if config.is_development() {
        warn!("Running in DEVELOPMENT mode - do not use in production!");
    }

    let (store, repo) = match connect_backends(&config).await {
        Ok(backends) => backends,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let services = ImportServices::new(store, repo, config.import.clone());

    // Start the cleanup background task
    services.start_cleanup();

    info!(
        "Import limits: {}MB max file size, header scan {} rows, history window {} uploads",
        config.import.max_upload_size / 1024 / 1024,
        config.import.header_scan_rows,
        config.import.history_limit
    );

    let bind_address = config.bind_address();
    let is_development = config.is_development();
    let cors_origin = config.server.cors_origin.clone();

    let worker_count = if is_development {
        info!(
            "Starting server at http://{} (4 workers - development mode)",
            bind_address
        );
        4
    } else {
        let cpus = num_cpus::get();
        info!("Starting server at http://{} ({} workers)", bind_address, cpus);
        cpus
    };

    let openapi = ApiDoc::openapi();

    // Start HTTP server
    let server = HttpServer::new(move || {
        let mut cors = Cors::default()
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE])
            .allowed_header(ORG_ID_HEADER)
            .allowed_header(USER_ID_HEADER)
            .max_age(3600);

        if let Some(ref origin) = cors_origin {
            cors = cors.allowed_origin(origin);
        } else if is_development {
            // Permissive CORS for development
            cors = cors
                .allowed_origin("http://localhost:3000")
                .allowed_origin("http://127.0.0.1:3000");
        }

        App::new()
            // Add CORS middleware (must be before other middleware)
            .wrap(cors)
            .wrap(RequestLogger)
            .configure(api::configure_api(services.clone()))
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}").url("/api/v1/openapi.json", openapi.clone()),
            )
    });

    server
        .workers(worker_count)
        .bind(&bind_address)?
        .run()
        .await
}
