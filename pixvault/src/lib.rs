//! # pixvault: image uploads with streamed catalog exports
//!
//! `pixvault` is an HTTP backend that accepts image uploads, stores them in object storage and
//! records each one in a PostgreSQL catalog. The catalog can be exported as a CSV report, which
//! is itself written to object storage and returned as a URL.
//!
//! ## Architecture
//!
//! The HTTP layer ([`api`]) parses requests and maps errors to responses; it is the only place
//! that knows about status codes. The use cases in [`uploads`] hold the behavior and depend on
//! two seams injected through [`AppState`]:
//!
//! - [`db::store::UploadStore`]: the catalog, backed by PostgreSQL through sqlx. Exports read it
//!   with a server-side cursor, one batch at a time.
//! - [`storage::FileStorage`]: object storage, backed by `object_store` (S3-compatible services,
//!   a local directory or memory). Content is streamed, never buffered whole.
//!
//! Exports run as a three-stage pipeline (cursor reader, CSV encoder, storage writer) joined by
//! bounded channels, so memory stays flat however large the catalog grows.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use pixvault::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = pixvault::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     pixvault::telemetry::init_telemetry(config.enable_otel_export, config.log_format)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! }
//! ```
//!
//! ## Database Setup
//!
//! Migrations run automatically on startup:
//!
//! ```no_run
//! # use sqlx::PgPool;
//! # async fn example(pool: PgPool) -> Result<(), sqlx::migrate::MigrateError> {
//! pixvault::migrator().run(&pool).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod api;
pub mod config;
pub mod db;
pub mod errors;
mod openapi;
pub mod storage;
pub mod telemetry;
mod types;
pub mod uploads;

#[cfg(test)]
pub mod test_utils;

use crate::config::{CorsOrigin, StorageConfig};
use crate::db::store::{PostgresUploadStore, UploadStore};
use crate::openapi::ApiDoc;
use crate::storage::{FileStorage, create_file_storage};
use axum::extract::DefaultBodyLimit;
use axum::http::{self, HeaderValue, Method};
use axum::{
    Json, Router,
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
pub use config::Config;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use types::UploadId;

/// Multipart framing allowance on top of the file size limit
const MULTIPART_OVERHEAD_BYTES: u64 = 64 * 1024;

/// Application state shared across all request handlers.
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .uploads(Arc::new(PostgresUploadStore::new(pool)))
///     .storage(create_file_storage(&config.storage)?)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub uploads: Arc<dyn UploadStore>,
    pub storage: Arc<dyn FileStorage>,
}

/// Get the pixvault database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Connect the pool and bring the schema up to date
async fn setup_database(config: &Config) -> anyhow::Result<PgPool> {
    let settings = &config.database.pool;
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(settings.acquire_timeout())
        .idle_timeout(settings.idle_timeout())
        .max_lifetime(settings.max_lifetime())
        .connect(&config.database.url)
        .await?;

    migrator().run(&pool).await?;
    info!(max_connections = settings.max_connections, "Database ready");

    Ok(pool)
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let allow_origin = if config.cors.allowed_origins.iter().any(|o| matches!(o, CorsOrigin::Wildcard)) {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in &config.cors.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                // Url serialization adds a trailing slash that browsers never send
                origins.push(url.as_str().trim_end_matches('/').parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([http::header::CONTENT_TYPE])
        .allow_credentials(config.cors.allow_credentials);

    if let Some(max_age) = config.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router with all endpoints and middleware.
///
/// Routes:
/// - `POST /uploads`, `POST /uploads/exports`: the upload API
/// - `GET /healthz`: liveness
/// - `GET /openapi.json`, `GET /docs`: API documentation
/// - `GET /files/*`: stored objects, only with the `local` storage backend
/// - `GET /internal/metrics`: Prometheus metrics, only when `enable_metrics` is set
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let body_limit = state.config.uploads.max_file_size.saturating_add(MULTIPART_OVERHEAD_BYTES);
    let body_limit = usize::try_from(body_limit).unwrap_or(usize::MAX);

    let local_files = match &state.config.storage {
        StorageConfig::Local { path, .. } => Some(path.clone()),
        _ => None,
    };
    let cors_layer = create_cors_layer(&state.config)?;
    let enable_metrics = state.config.enable_metrics;

    let mut router = Router::new()
        .route(
            "/uploads",
            post(api::handlers::uploads::upload_image).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/uploads/exports", post(api::handlers::uploads::export_uploads))
        .route("/healthz", get(|| async { "OK" }))
        .route("/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .with_state(state);

    if let Some(path) = local_files {
        debug!(path = %path.display(), "Serving stored objects under /files");
        router = router.nest_service("/files", ServeDir::new(path));
    }

    router = router.layer(cors_layer);

    if enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// The running service: configuration, connection pool and router.
///
/// 1. **Create**: [`Application::new`] connects to the database, runs migrations and builds the
///    storage backend
/// 2. **Serve**: [`Application::serve`] binds the listener and handles requests
/// 3. **Shutdown**: when the shutdown future resolves, in-flight requests finish, then the pool
///    is closed and pending spans are flushed
pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting pixvault with configuration: {:#?}", config);

        let pool = setup_database(&config).await?;
        let storage = create_file_storage(&config.storage)?;

        let state = AppState::builder()
            .config(config.clone())
            .uploads(Arc::new(PostgresUploadStore::new(pool.clone())))
            .storage(storage)
            .build();
        let router = build_router(state)?;

        Ok(Self { router, config, pool })
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "pixvault listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Closing database connections...");
        self.pool.close().await;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::CorsOrigin;
    use crate::test_utils::{create_test_app, create_test_config, create_test_state};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_healthz() {
        let (server, _uploads, _memory) = create_test_app(create_test_config());

        let response = server.get("/healthz").await;
        response.assert_status_ok();
        assert_eq!(response.text(), "OK");
    }

    #[tokio::test]
    async fn test_openapi_document_is_served() {
        let (server, _uploads, _memory) = create_test_app(create_test_config());

        let response = server.get("/openapi.json").await;
        response.assert_status_ok();
        let doc: serde_json::Value = response.json();
        assert!(doc["paths"]["/uploads"]["post"].is_object());
        assert!(doc["paths"]["/uploads/exports"]["post"].is_object());
    }

    #[tokio::test]
    async fn test_metrics_endpoint_absent_by_default() {
        let (server, _uploads, _memory) = create_test_app(create_test_config());

        let response = server.get("/internal/metrics").await;
        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_local_backend_serves_stored_objects() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("images")).unwrap();
        std::fs::write(dir.path().join("images").join("cat.png"), b"meow").unwrap();

        let mut config = create_test_config();
        config.storage = StorageConfig::Local {
            path: dir.path().to_path_buf(),
            public_url: "http://localhost:3333/files/".to_string(),
        };
        let (state, _uploads, _memory) = create_test_state(config);
        let server = axum_test::TestServer::new(build_router(state).unwrap()).unwrap();

        let response = server.get("/files/images/cat.png").await;
        response.assert_status_ok();
        assert_eq!(response.text(), "meow");
    }

    #[tokio::test]
    async fn test_cors_allows_configured_origin() {
        let mut config = create_test_config();
        config.cors.allowed_origins = vec![CorsOrigin::Url("https://app.example.com".parse().unwrap())];
        let (server, _uploads, _memory) = create_test_app(config);

        let response = server
            .get("/healthz")
            .add_header(http::header::ORIGIN, HeaderValue::from_static("https://app.example.com"))
            .await;

        response.assert_status_ok();
        assert_eq!(
            response.header(http::header::ACCESS_CONTROL_ALLOW_ORIGIN),
            "https://app.example.com"
        );
    }

    #[test]
    fn test_cors_layer_accepts_default_config() {
        assert!(create_cors_layer(&Config::default()).is_ok());
    }
}
