//! authgate — request-time identity gate.
//!
//! Sits in front of an HTTP origin and resolves encrypted bearer
//! credentials into verified identity attributes:
//!
//! 1. Fetch the signing and encryption certificate material (dual-PEM
//!    blobs) from an external parameter store — fresh on every request.
//! 2. Decrypt the compact-JWE outer envelope with the encryption private
//!    key.
//! 3. Verify the inner signed token (pinned RS256, issuer allow-list).
//! 4. Forward the request with `x-user-id` / `x-user-email` set, or reject
//!    with a generic authentication error.
//!
//! The gate is stateless per request: nothing is cached or persisted, so a
//! rotated key is live on the next request.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod error;
pub mod gate;
pub mod keygen;
pub mod material;
pub mod store;
pub mod token;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
