//! Signed-token verification — the inner envelope.
//!
//! The decrypted payload is a three-segment signed token. It is verified
//! against the signing role's public certificate with a pinned asymmetric
//! algorithm set and an exact-match issuer allow-list, then normalized into
//! [`IdentityClaims`].
//!
//! # Security properties
//!
//! - [`ACCEPTED_ALGORITHMS`] is the only algorithm source; the token's own
//!   `alg` header merely has to be a member, so an attacker cannot downgrade
//!   to a symmetric scheme keyed by the public certificate.
//! - `exp` and `iss` are required claims; a token missing either is
//!   structurally invalid.

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use rsa::RsaPublicKey;
use rsa::pkcs1::{DecodeRsaPublicKey, EncodeRsaPublicKey};
use rsa::pkcs8::LineEnding;
use serde_json::Value;

/// The only signature algorithms this gate accepts.
pub const ACCEPTED_ALGORITHMS: &[Algorithm] = &[Algorithm::RS256];

/// Errors raised while verifying the inner signed token.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// The signing certificate could not be parsed or carries a non-RSA key.
    #[error("invalid signing certificate: {0}")]
    Certificate(String),

    /// Signature, issuer, expiry, or claim-structure failure.
    #[error("token verification failed: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

/// Verified identity attributes extracted from a valid credential.
///
/// `subject` and `email` default to empty strings when the corresponding
/// claim is absent; the full decoded claim set is kept in `claims` for
/// callers that need more than the two normalized fields.
#[derive(Debug, Clone)]
pub struct IdentityClaims {
    /// `sub` claim, or empty.
    pub subject: String,
    /// `email` claim, or empty.
    pub email: String,
    /// All decoded claims.
    pub claims: serde_json::Map<String, Value>,
}

/// Verify a signed token against the signing certificate and the issuer
/// allow-list, returning the normalized claim set.
///
/// # Errors
///
/// Returns [`VerifyError`] on any signature mismatch, issuer mismatch,
/// expired token, or structurally missing claim.
pub fn verify_signed_token(
    token: &str,
    certificate_pem: &str,
    allowed_issuers: &[String],
) -> Result<IdentityClaims, VerifyError> {
    let public_key = certificate_rsa_public_key(certificate_pem)?;
    let public_key_pem = public_key
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(|e| VerifyError::Certificate(format!("key re-encoding failed: {e}")))?;
    let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())?;

    let mut validation = Validation::new(Algorithm::RS256);
    validation.algorithms = ACCEPTED_ALGORITHMS.to_vec();
    validation.set_required_spec_claims(&["exp", "iss"]);
    validation.set_issuer(allowed_issuers);
    validation.validate_aud = false;

    let data =
        jsonwebtoken::decode::<serde_json::Map<String, Value>>(token, &decoding_key, &validation)?;

    Ok(IdentityClaims::from_claims(data.claims))
}

impl IdentityClaims {
    fn from_claims(claims: serde_json::Map<String, Value>) -> Self {
        let subject = string_claim(&claims, "sub");
        let email = string_claim(&claims, "email");
        Self {
            subject,
            email,
            claims,
        }
    }
}

fn string_claim(claims: &serde_json::Map<String, Value>, name: &str) -> String {
    claims
        .get(name)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Extract the RSA public key from a PEM-encoded X.509 certificate.
pub(crate) fn certificate_rsa_public_key(
    certificate_pem: &str,
) -> Result<RsaPublicKey, VerifyError> {
    let (_, pem) = x509_parser::pem::parse_x509_pem(certificate_pem.as_bytes())
        .map_err(|e| VerifyError::Certificate(format!("not valid PEM: {e}")))?;
    let certificate = pem
        .parse_x509()
        .map_err(|e| VerifyError::Certificate(format!("not a valid X.509 certificate: {e}")))?;

    RsaPublicKey::from_pkcs1_der(certificate.public_key().subject_public_key.data.as_ref())
        .map_err(|e| VerifyError::Certificate(format!("certificate key is not RSA: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepted_algorithms_are_asymmetric_only() {
        assert_eq!(ACCEPTED_ALGORITHMS, &[Algorithm::RS256]);
    }

    #[test]
    fn identity_defaults_missing_claims_to_empty() {
        let mut claims = serde_json::Map::new();
        claims.insert("iss".to_string(), Value::String("issuer".to_string()));

        let identity = IdentityClaims::from_claims(claims);
        assert_eq!(identity.subject, "");
        assert_eq!(identity.email, "");
        assert_eq!(identity.claims.len(), 1);
    }

    #[test]
    fn identity_extracts_subject_and_email() {
        let mut claims = serde_json::Map::new();
        claims.insert("sub".to_string(), Value::String("1234567890".to_string()));
        claims.insert(
            "email".to_string(),
            Value::String("user@example.com".to_string()),
        );
        claims.insert("name".to_string(), Value::String("John Doe".to_string()));

        let identity = IdentityClaims::from_claims(claims);
        assert_eq!(identity.subject, "1234567890");
        assert_eq!(identity.email, "user@example.com");
        assert_eq!(
            identity.claims.get("name").and_then(Value::as_str),
            Some("John Doe")
        );
    }

    #[test]
    fn non_string_claims_normalize_to_empty() {
        let mut claims = serde_json::Map::new();
        claims.insert("sub".to_string(), Value::Number(42.into()));

        let identity = IdentityClaims::from_claims(claims);
        assert_eq!(identity.subject, "");
    }

    #[test]
    fn rejects_garbage_certificate() {
        let err = certificate_rsa_public_key("not a pem").unwrap_err();
        assert!(matches!(err, VerifyError::Certificate(_)));
    }
}
