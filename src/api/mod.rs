use crate::auth::{
    AuthConfig, SessionFlows,
    permissions::PgPermissionDirectory,
};
use anyhow::{Context, Result, anyhow};
use axum::{
    Extension,
    body::Body,
    extract::MatchedPath,
    http::{
        HeaderName, HeaderValue, Method, Request,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::head,
};
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpListener, signal, sync::mpsc};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, info, info_span, warn};
use ulid::Ulid;
use url::Url;
use utoipa_axum::router::OpenApiRouter;
use utoipa_swagger_ui::SwaggerUi;

pub(crate) mod handlers;
// OpenAPI router wiring and route registration live in openapi.rs.
mod openapi;

pub use handlers::auth::AuthState;
pub use openapi::openapi;

/// Build the API router with all documented routes registered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, dsn: &SecretString, cache_url: &str, config: AuthConfig) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(dsn.expose_secret())
        .await
        .context("Failed to connect to database")?;

    let cache = redis::Client::open(cache_url).context("Invalid cache URL")?;

    let permissions = Arc::new(PgPermissionDirectory::new(pool.clone()));
    let state = Arc::new(AuthState::new(
        SessionFlows::new(pool.clone(), cache, &config, permissions),
        config,
    ));

    let cors = cors_layer(state.config().frontend_origin())?;

    // Build the router from OpenAPI-wired routes, then extend it with
    // non-doc routes like `HEAD /health` and the swagger mount.
    let (router, api) = router().split_for_parts();
    let mut app = router
        .merge(SwaggerUi::new("/v1/docs").url("/v1/docs/openapi.json", api))
        .route("/health", head(handlers::health::health))
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
                .layer(Extension(state.clone()))
                .layer(Extension(pool.clone())),
        );
    if let Some(cors) = cors {
        app = app.layer(cors);
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    spawn_shutdown_listener(tx);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    // ConnectInfo carries the peer socket into handlers for the client-ip
    // fallback behind the proxy headers.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
        .with_graceful_shutdown(async move {
            rx.recv().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

/// Signals the serve loop on ctrl-c or SIGTERM.
fn spawn_shutdown_listener(tx: mpsc::UnboundedSender<()>) {
    tokio::spawn(async move {
        let terminate = async {
            #[cfg(unix)]
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(err) => {
                    warn!("Failed to install SIGTERM handler: {err}");
                    std::future::pending::<()>().await;
                }
            }
            #[cfg(not(unix))]
            std::future::pending::<()>().await;
        };
        tokio::select! {
            _ = signal::ctrl_c() => {},
            () = terminate => {},
        }
        let _ = tx.send(());
    });
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

/// Credentialed CORS for the configured frontend origin; no layer when no
/// frontend is configured.
fn cors_layer(frontend_origin: Option<&str>) -> Result<Option<CorsLayer>> {
    let Some(origin) = frontend_origin else {
        return Ok(None);
    };
    let parsed =
        Url::parse(origin).with_context(|| format!("Invalid frontend origin: {origin}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("Frontend origin must include a valid host: {origin}"))?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let value = HeaderValue::from_str(&format!("{}://{}{}", parsed.scheme(), host, port))
        .context("Failed to build frontend origin header")?;

    Ok(Some(
        CorsLayer::new()
            .allow_headers([CONTENT_TYPE, AUTHORIZATION])
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_origin(AllowOrigin::exact(value))
            .allow_credentials(true),
    ))
}
