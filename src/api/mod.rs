use crate::auth::{AuthConfig, FixedWindowLimiter, SessionEngine, TokenCodec};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    routing::{delete, get, patch, post, put},
    Extension, Router,
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::postgres::PgCredentialStore;
use crate::auth::registry::{MemoryTokenRegistry, TokenRegistry};

pub mod handlers;
mod openapi;

pub use openapi::ApiDoc;

/// Build the application router around an engine and limiter.
///
/// Used directly by the server below and by the integration tests, which
/// supply an in-memory credential store.
pub fn router(engine: Arc<SessionEngine>, limiter: Arc<FixedWindowLimiter>) -> Router {
    Router::new()
        .route("/", get(handlers::root::root))
        .route("/health", get(handlers::health::health))
        .route("/v1/user/signup", post(handlers::user::signup))
        .route("/v1/user/login", post(handlers::user::login))
        .route("/v1/user/refresh", put(handlers::user::refresh))
        .route("/v1/user/logout", delete(handlers::user::logout))
        .route("/v1/user/modify", patch(handlers::user::modify))
        .route("/v1/user/auth_history", get(handlers::user::auth_history))
        .route("/v1/user/roles", get(handlers::user::my_roles))
        .route("/v1/user/:user_id/roles", get(handlers::user::user_roles))
        .route(
            "/v1/role",
            post(handlers::roles::create_role).get(handlers::roles::view_roles),
        )
        .route(
            "/v1/role/:role_id",
            put(handlers::roles::update_role).delete(handlers::roles::delete_role),
        )
        .route("/v1/role/assign/:user_id", post(handlers::roles::assign_role))
        .route(
            "/v1/role/revoke/:user_id",
            delete(handlers::roles::revoke_role),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(Extension(engine))
        .layer(Extension(limiter))
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, dsn: String, config: AuthConfig) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let store = Arc::new(PgCredentialStore::new(pool.clone()));
    let registry: Arc<dyn TokenRegistry> = Arc::new(MemoryTokenRegistry::new());
    let codec = TokenCodec::new(
        config.secret_key(),
        config.access_token_ttl_minutes(),
        config.refresh_token_ttl_minutes(),
    );
    let engine = Arc::new(SessionEngine::new(store, Arc::clone(&registry), codec));
    let limiter = Arc::new(FixedWindowLimiter::new(
        registry,
        config.rate_limit_per_minute(),
    ));

    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_origin(Any);

    let app = router(engine, limiter)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors),
        )
        .layer(Extension(pool));

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
