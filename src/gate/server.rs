//! Gate server — router assembly, origin pass-through, graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::handler::{GateContext, gate_middleware};
use crate::config::Config;
use crate::store::{HttpParameterStore, ParameterStore};
use crate::{Error, Result};

/// Largest request/response body buffered during origin pass-through.
const MAX_PROXY_BODY: usize = 16 * 1024 * 1024;

/// The identity gate server.
pub struct Gate {
    config: Config,
    context: Arc<GateContext>,
}

impl Gate {
    /// Create a gate backed by the configured HTTP parameter store.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or clients cannot
    /// be built.
    pub fn new(config: Config) -> Result<Self> {
        let store: Arc<dyn ParameterStore> = Arc::new(HttpParameterStore::new(
            &config.store.base_url,
            config.store.timeout,
        )?);
        Self::with_store(config, store)
    }

    /// Create a gate with an injected parameter store (tests use this to
    /// substitute an in-memory double).
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_store(config: Config, store: Arc<dyn ParameterStore>) -> Result<Self> {
        config.validate()?;
        let context = Arc::new(GateContext::new(&config, store)?);
        Ok(Self { config, context })
    }

    /// Build the router: everything behind the gate middleware except the
    /// configured public paths.
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health))
            .fallback(forward)
            .layer(middleware::from_fn_with_state(
                Arc::clone(&self.context),
                gate_middleware,
            ))
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::clone(&self.context))
    }

    /// Bind and serve until ctrl-c or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot bind or the server fails.
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let listener = TcpListener::bind(addr).await?;
        info!(
            addr = %addr,
            issuers = self.config.gate.allowed_issuers.len(),
            origin = self.config.origin.url.as_deref().unwrap_or("(built-in demo)"),
            "Gate listening"
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }
}

/// Liveness probe (public path).
async fn health() -> &'static str {
    "ok"
}

/// Post-gate handler: forward the (already annotated) request to the origin,
/// or answer from the built-in demo origin when none is configured.
async fn forward(State(ctx): State<Arc<GateContext>>, request: Request<Body>) -> Response {
    match ctx.origin_url.clone() {
        Some(origin) => proxy(&ctx, &origin, request).await,
        None => (StatusCode::OK, "Hey from secure endpoint!").into_response(),
    }
}

/// Buffer the request and replay it against the origin, then mirror the
/// origin's response back.
async fn proxy(ctx: &GateContext, origin: &str, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();

    let body = match axum::body::to_bytes(body, MAX_PROXY_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "Failed to read request body");
            return (StatusCode::BAD_REQUEST, "invalid request body").into_response();
        }
    };

    let path_and_query = parts
        .uri
        .path_and_query()
        .map_or("/", |pq| pq.as_str());
    let url = format!("{}{}", origin.trim_end_matches('/'), path_and_query);

    let mut headers = parts.headers;
    headers.remove(header::HOST);

    let upstream = ctx
        .http
        .request(parts.method, &url)
        .headers(headers)
        .body(body)
        .send()
        .await;

    let upstream = match upstream {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, url = %url, "Origin request failed");
            return (StatusCode::BAD_GATEWAY, "origin unavailable").into_response();
        }
    };

    let status = upstream.status();
    let upstream_headers = upstream.headers().clone();
    let bytes = match upstream.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, url = %url, "Failed to read origin response");
            return (StatusCode::BAD_GATEWAY, "origin unavailable").into_response();
        }
    };

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    for (name, value) in &upstream_headers {
        // The body is re-framed by axum; hop-by-hop framing must not leak.
        if *name == header::TRANSFER_ENCODING || *name == header::CONNECTION {
            continue;
        }
        response.headers_mut().append(name.clone(), value.clone());
    }
    response
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => warn!(error = %e, "Failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received ctrl-c, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
