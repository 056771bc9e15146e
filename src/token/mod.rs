//! Credential unwrapping — decrypt-then-verify over provided key material.
//!
//! A presented credential is a nested envelope: the issuer signed the claim
//! set, then encrypted the signed token. [`unwrap_credential`] reverses
//! that: strip the bearer scheme, decrypt the compact JWE with the
//! encryption role's private key ([`jwe`]), verify the inner signed token
//! against the signing role's certificate and the issuer allow-list
//! ([`verify`]).
//!
//! The pipeline performs no I/O; callers supply the per-request
//! [`CertificateMaterial`] for both roles, which keeps it unit-testable with
//! locally generated keys.

pub mod issue;
pub mod jwe;
pub mod verify;

pub use issue::{CredentialRequest, IssueError, issue_credential};
pub use jwe::{ContentEncryption, JweError};
pub use verify::{IdentityClaims, VerifyError};

use crate::material::CertificateMaterial;

/// Literal scheme prefix stripped from the `Authorization` header value.
pub const BEARER_SCHEME: &str = "Bearer ";

/// Classified failures of the unwrap pipeline.
///
/// The gate collapses both variants into one caller-visible rejection; the
/// distinction exists for operational logging only.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// The outer encrypted envelope could not be opened.
    #[error("credential decryption failed: {0}")]
    Decryption(#[from] JweError),

    /// The inner signed token failed verification.
    #[error("credential verification failed: {0}")]
    Verification(#[from] VerifyError),
}

/// Unwrap a bearer credential into verified identity claims.
///
/// `bearer` is the raw `Authorization` header value; a leading `"Bearer "`
/// is stripped if present. Decryption strictly precedes verification.
///
/// # Errors
///
/// [`TokenError::Decryption`] for any failure opening the outer envelope
/// (including an empty or malformed remainder after scheme stripping);
/// [`TokenError::Verification`] for signature, issuer, expiry, or claim
/// failures on the inner token.
pub fn unwrap_credential(
    bearer: &str,
    signing: &CertificateMaterial,
    encryption: &CertificateMaterial,
    allowed_issuers: &[String],
) -> Result<IdentityClaims, TokenError> {
    let token = bearer.strip_prefix(BEARER_SCHEME).unwrap_or(bearer);
    let signed_token = jwe::decrypt_compact(token, &encryption.private_key_pem)?;
    let identity =
        verify::verify_signed_token(&signed_token, &signing.certificate_pem, allowed_issuers)?;
    Ok(identity)
}
