//! Gate middleware — the per-request credential state machine.
//!
//! `Start → HasCredential? → FetchMaterials → Unwrap → {Authorized | Rejected}`
//!
//! A request without an `Authorization` header is rejected before any store
//! call is made. Store and material failures are the infrastructure class
//! (500); both unwrap failure classes collapse into one generic 401 so the
//! response never discloses whether decryption or verification failed.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, HeaderValue, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::material::CertificateMaterial;
use crate::store::{CertificateSource, ParameterStore};
use crate::token;

/// Shared per-process gate state. Explicitly constructed and injected; the
/// store behind [`CertificateSource`] is a trait object so tests substitute
/// a double without touching process globals.
pub struct GateContext {
    /// Per-request certificate fetcher.
    pub source: CertificateSource,
    /// Trusted issuers (exact match).
    pub allowed_issuers: Vec<String>,
    /// Paths that bypass the gate.
    pub public_paths: Vec<String>,
    /// Header carrying the verified subject.
    pub user_id_header: HeaderName,
    /// Header carrying the verified email.
    pub user_email_header: HeaderName,
    /// Upstream origin base URL; `None` enables the built-in demo origin.
    pub origin_url: Option<String>,
    /// Client used for origin pass-through.
    pub http: reqwest::Client,
}

impl GateContext {
    /// Build the context from configuration and an injected store.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured header name is invalid or the proxy
    /// client cannot be built.
    pub fn new(config: &Config, store: Arc<dyn ParameterStore>) -> crate::Result<Self> {
        let source = CertificateSource::new(
            store,
            &config.store.encryption_parameter,
            &config.store.signing_parameter,
        );

        let user_id_header = HeaderName::from_bytes(config.gate.user_id_header.as_bytes())
            .map_err(|e| crate::Error::Config(format!("Invalid user id header name: {e}")))?;
        let user_email_header = HeaderName::from_bytes(config.gate.user_email_header.as_bytes())
            .map_err(|e| crate::Error::Config(format!("Invalid user email header name: {e}")))?;

        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| crate::Error::Config(format!("Failed to build origin client: {e}")))?;

        Ok(Self {
            source,
            allowed_issuers: config.gate.allowed_issuers.clone(),
            public_paths: config.gate.public_paths.clone(),
            user_id_header,
            user_email_header,
            origin_url: config.origin.url.clone(),
            http,
        })
    }

    /// Check if a path bypasses the gate.
    #[must_use]
    pub fn is_public_path(&self, path: &str) -> bool {
        self.public_paths.iter().any(|p| path.starts_with(p))
    }
}

/// Why a request was rejected. `NoCredential` and `InvalidCredential` are
/// caller faults (401); `MaterialsUnavailable` is a gate misconfiguration
/// (500) and is logged loudly enough to page operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// No `Authorization` header was presented.
    NoCredential,
    /// The credential failed decryption or verification.
    InvalidCredential,
    /// Certificate material could not be fetched or parsed.
    MaterialsUnavailable,
}

impl Rejection {
    fn status(self) -> StatusCode {
        match self {
            Self::NoCredential | Self::InvalidCredential => StatusCode::UNAUTHORIZED,
            Self::MaterialsUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Response body. Deliberately generic: no cryptographic failure detail
    /// ever reaches the caller.
    fn body(self) -> &'static str {
        match self {
            Self::NoCredential => "User is not authenticated, no auth header present",
            Self::InvalidCredential => "User is not authenticated",
            Self::MaterialsUnavailable => "An error occurred while validating the request",
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        (
            self.status(),
            [(header::CONTENT_TYPE, "text/html")],
            self.body(),
        )
            .into_response()
    }
}

/// Gate middleware: validate the bearer credential and annotate the
/// forwarded request with verified identity headers.
pub async fn gate_middleware(
    State(ctx): State<Arc<GateContext>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_owned();

    if ctx.is_public_path(&path) {
        debug!(path = %path, "Public path, skipping gate");
        return next.run(request).await;
    }

    // Short-circuit before any store call for anonymous requests.
    let bearer = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let Some(bearer) = bearer else {
        debug!(path = %path, "No auth header present");
        return Rejection::NoCredential.into_response();
    };

    let materials = match ctx.source.fetch().await {
        Ok(materials) => materials,
        Err(e) => {
            error!(error = %e, "Failed to fetch certificate material");
            return Rejection::MaterialsUnavailable.into_response();
        }
    };

    let signing = match CertificateMaterial::split(&materials.signing) {
        Ok(material) => material,
        Err(e) => {
            error!(error = %e, role = "signing", "Stored certificate material is malformed");
            return Rejection::MaterialsUnavailable.into_response();
        }
    };
    let encryption = match CertificateMaterial::split(&materials.encryption) {
        Ok(material) => material,
        Err(e) => {
            error!(error = %e, role = "encryption", "Stored certificate material is malformed");
            return Rejection::MaterialsUnavailable.into_response();
        }
    };

    match token::unwrap_credential(&bearer, &signing, &encryption, &ctx.allowed_issuers) {
        Ok(identity) => {
            let headers = request.headers_mut();
            headers.insert(
                ctx.user_id_header.clone(),
                header_value(&identity.subject),
            );
            headers.insert(
                ctx.user_email_header.clone(),
                header_value(&identity.email),
            );
            debug!(subject = %identity.subject, path = %path, "Authorized request");
            next.run(request).await
        }
        Err(e) => {
            // Which stage failed stays in the logs only.
            warn!(error = %e, path = %path, "Credential rejected");
            Rejection::InvalidCredential.into_response()
        }
    }
}

/// Claim values are attacker-influenced; anything that is not a valid header
/// value degrades to empty rather than failing the request.
fn header_value(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).unwrap_or_else(|_| HeaderValue::from_static(""))
}
