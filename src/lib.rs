//! CMS Backend - library for app logic and testing

pub mod auth;
pub mod content;
pub mod db;
pub mod logging;
pub mod media;
pub mod routes;

use std::net::SocketAddr;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method};
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, limit::RequestBodyLimitLayer,
    services::ServeDir, trace::TraceLayer,
};

use auth::recovery::ResetTokenStore;
use auth::session::SessionStore;
use media::MediaStore;

/// Gallery uploads carry several images per request; the cap leaves room for
/// a handful of 5 MB files plus multipart overhead.
const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Shared application state, injected into every handler. No globals: the
/// pool, session store, reset-token store, and media store all travel
/// through here.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub sessions: SessionStore,
    pub reset_tokens: ResetTokenStore,
    pub media: MediaStore,
}

/// Configure CORS from environment variables.
/// Uses ALLOWED_ORIGINS (comma-separated) or FRONTEND_ORIGIN.
/// Falls back to localhost origins for development.
pub fn configure_cors() -> CorsLayer {
    let allowed_origins = std::env::var("ALLOWED_ORIGINS")
        .ok()
        .and_then(|s| {
            let origins: Vec<HeaderValue> = s
                .split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                None
            } else {
                Some(origins)
            }
        })
        .or_else(|| {
            std::env::var("FRONTEND_ORIGIN")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(|origin| vec![origin])
        })
        .unwrap_or_else(|| {
            vec![
                "http://localhost:3000".parse().unwrap(),
                "http://127.0.0.1:3000".parse().unwrap(),
            ]
        });

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([axum::http::header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// Create and configure the application router.
pub fn create_app(state: AppState) -> Router {
    let cors = configure_cors();
    let uploads_dir = state.media.dir().to_path_buf();

    Router::new()
        .route("/api/auth/login", post(routes::auth::login))
        .route("/api/auth/logout", post(routes::auth::logout))
        .route("/api/auth/session", get(routes::auth::session_info))
        .route("/api/recovery/verify-code", post(routes::recovery::verify_code))
        .route(
            "/api/recovery/reset-password",
            post(routes::recovery::reset_password),
        )
        .route(
            "/api/galleries",
            get(routes::galleries::list_galleries).post(routes::galleries::create_gallery),
        )
        .route(
            "/api/galleries/{id}",
            axum::routing::patch(routes::galleries::update_gallery)
                .delete(routes::galleries::delete_gallery),
        )
        .route(
            "/api/blog",
            get(routes::blog::list_posts).post(routes::blog::create_post),
        )
        // GET matches by slug; PATCH/DELETE parse the same segment as an id.
        .route(
            "/api/blog/{slug}",
            get(routes::blog::get_post)
                .patch(routes::blog::update_post)
                .delete(routes::blog::delete_post),
        )
        .route("/health", get(routes::health::health_ping))
        .route("/health/database", get(routes::health::health_database))
        .nest_service("/uploads", ServeDir::new(uploads_dir))
        .layer(logging::middleware::propagate_request_id_layer())
        .layer(middleware::from_fn(logging::middleware::log_request))
        .layer(logging::middleware::request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES))
        .layer(cors)
        .with_state(state)
}

/// Run the server (used by main).
pub async fn run() {
    dotenvy::dotenv().ok();

    // Guards MUST be held for the process lifetime; dropping them early
    // shuts down background log-writer threads and loses buffered log lines.
    let _log_guards = logging::init();

    let pool = match db::init_pool(None).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Failed to initialize database pool: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = db::run_migrations(&pool).await {
        tracing::error!("Failed to run database migrations: {}", e);
        std::process::exit(1);
    }

    // First boot: create the admin row and show the generated credentials
    // exactly once. They are never written anywhere in plaintext.
    match auth::credentials::bootstrap_admin(&pool).await {
        Ok(Some(creds)) => {
            tracing::warn!(
                "First run: admin account created. Record these credentials now; \
                 they will not be shown again.\n  username: {}\n  password: {}\n  \
                 recovery code 1: {}\n  recovery code 2: {}",
                creds.username,
                creds.password,
                creds.recovery_code1,
                creds.recovery_code2
            );
        }
        Ok(None) => {}
        Err(e) => {
            tracing::error!("Failed to bootstrap admin account: {}", e);
            std::process::exit(1);
        }
    }

    let upload_dir =
        std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "public/uploads".to_string());
    let media = MediaStore::new(&upload_dir);
    if let Err(e) = media.ensure_dir().await {
        tracing::error!("Failed to create upload directory {}: {}", upload_dir, e);
        std::process::exit(1);
    }

    let state = AppState {
        pool,
        sessions: SessionStore::new(),
        reset_tokens: ResetTokenStore::new(),
        media,
    };
    let app = create_app(state);

    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(3000);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .expect("Invalid HOST/PORT configuration");
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app).await.expect("Server error");
}
