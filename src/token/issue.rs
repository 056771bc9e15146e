//! Credential issuance — the inverse pipeline, for tooling and tests.
//!
//! The gate never issues credentials in production; a real issuer does. This
//! module exists for the `authgate token issue` CLI helper and for
//! round-trip tests: sign a claim set with the signing role's private key
//! (RS256), then encrypt the signed token to the encryption role's
//! certificate as a compact JWE.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::Value;

use super::jwe::{self, ContentEncryption, JweError};
use super::verify;

/// Errors raised while building a credential.
#[derive(Debug, thiserror::Error)]
pub enum IssueError {
    /// The signing key could not be parsed, or signing failed.
    #[error("signing failed: {0}")]
    Sign(#[from] jsonwebtoken::errors::Error),

    /// The encryption certificate could not be parsed.
    #[error("invalid encryption certificate: {0}")]
    Certificate(String),

    /// The outer envelope could not be built.
    #[error(transparent)]
    Encrypt(#[from] JweError),
}

/// Attributes of a credential to mint.
#[derive(Debug)]
pub struct CredentialRequest<'a> {
    /// `sub` claim.
    pub subject: &'a str,
    /// `email` claim; omitted from the token when `None`.
    pub email: Option<&'a str>,
    /// `iss` claim.
    pub issuer: &'a str,
    /// Token lifetime (sets `exp` relative to now).
    pub lifetime: Duration,
}

/// Sign an arbitrary claim set with RS256.
///
/// # Errors
///
/// Returns [`IssueError::Sign`] if the key PEM is invalid or encoding fails.
pub fn sign_claims(
    claims: &serde_json::Map<String, Value>,
    signing_key_pem: &str,
) -> Result<String, IssueError> {
    let key = EncodingKey::from_rsa_pem(signing_key_pem.as_bytes())?;
    Ok(jsonwebtoken::encode(
        &Header::new(Algorithm::RS256),
        claims,
        &key,
    )?)
}

/// Encrypt an already-signed token to the encryption certificate.
///
/// # Errors
///
/// Returns [`IssueError`] if the certificate is unusable or encryption fails.
pub fn encrypt_signed(
    signed_token: &str,
    encryption_certificate_pem: &str,
    enc: ContentEncryption,
) -> Result<String, IssueError> {
    let recipient = verify::certificate_rsa_public_key(encryption_certificate_pem)
        .map_err(|e| IssueError::Certificate(e.to_string()))?;
    Ok(jwe::encrypt_compact(
        signed_token.as_bytes(),
        &recipient,
        enc,
    )?)
}

/// Mint a complete credential: standard claims, RS256 signature, compact-JWE
/// envelope (A256GCM).
///
/// # Errors
///
/// Returns [`IssueError`] if either pipeline stage fails.
pub fn issue_credential(
    request: &CredentialRequest<'_>,
    signing_key_pem: &str,
    encryption_certificate_pem: &str,
) -> Result<String, IssueError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs();

    let mut claims = serde_json::Map::new();
    claims.insert("sub".to_string(), Value::String(request.subject.to_string()));
    if let Some(email) = request.email {
        claims.insert("email".to_string(), Value::String(email.to_string()));
    }
    claims.insert("iss".to_string(), Value::String(request.issuer.to_string()));
    claims.insert("iat".to_string(), Value::Number(now.into()));
    claims.insert(
        "exp".to_string(),
        Value::Number((now + request.lifetime.as_secs()).into()),
    );

    let signed = sign_claims(&claims, signing_key_pem)?;
    encrypt_signed(&signed, encryption_certificate_pem, ContentEncryption::A256Gcm)
}
