//! Error types for authgate

use std::io;

use thiserror::Error;

/// Result type alias for authgate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level authgate errors
///
/// Component failures in the unwrap pipeline carry their own enums
/// ([`crate::material::MaterialError`], [`crate::store::StoreError`],
/// [`crate::token::TokenError`]); this type covers configuration, startup,
/// and CLI concerns.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Key or certificate generation error
    #[error("Key generation error: {0}")]
    Keygen(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
