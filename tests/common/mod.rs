//! Shared test helpers — locally generated key material and credential
//! issuance mirroring what a real issuer produces.

#![allow(dead_code)]

use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use authgate::keygen::{self, GeneratedMaterial};
use authgate::token::ContentEncryption;
use authgate::token::issue;
use serde_json::Value;

/// Issuer used throughout the integration tests.
pub const TEST_ISSUER: &str = "https://example-issuer/";

/// A signing/encryption certificate pair playing the role of the issuer's
/// key infrastructure.
pub struct TestAuthority {
    pub signing: GeneratedMaterial,
    pub encryption: GeneratedMaterial,
}

impl TestAuthority {
    pub fn generate() -> Self {
        Self {
            signing: keygen::generate_self_signed("test signing", 7).unwrap(),
            encryption: keygen::generate_self_signed("test encryption", 7).unwrap(),
        }
    }

    /// Dual-PEM blob for the signing role, as stored.
    pub fn signing_blob(&self) -> String {
        self.signing.dual_pem()
    }

    /// Dual-PEM blob for the encryption role, as stored.
    pub fn encryption_blob(&self) -> String {
        self.encryption.dual_pem()
    }
}

/// Process-wide authority. RSA key generation is slow enough that tests
/// share one set unless they specifically need foreign keys.
pub fn authority() -> &'static TestAuthority {
    static AUTHORITY: OnceLock<TestAuthority> = OnceLock::new();
    AUTHORITY.get_or_init(TestAuthority::generate)
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// Standard claim set: `sub`, optional `email`, `iss`, `iat`, one-hour `exp`.
pub fn standard_claims(
    subject: &str,
    email: Option<&str>,
    issuer: &str,
) -> serde_json::Map<String, Value> {
    let now = unix_now();
    let mut claims = serde_json::Map::new();
    claims.insert("sub".to_string(), Value::String(subject.to_string()));
    if let Some(email) = email {
        claims.insert("email".to_string(), Value::String(email.to_string()));
    }
    claims.insert("name".to_string(), Value::String("John Doe".to_string()));
    claims.insert("iss".to_string(), Value::String(issuer.to_string()));
    claims.insert("iat".to_string(), Value::Number(now.into()));
    claims.insert("exp".to_string(), Value::Number((now + 3600).into()));
    claims
}

/// Sign `claims` with the authority's signing key and encrypt to its
/// encryption certificate — the issuer side of the pipeline.
pub fn issue_token(authority: &TestAuthority, claims: &serde_json::Map<String, Value>) -> String {
    let signed = issue::sign_claims(claims, &authority.signing.private_key_pem).unwrap();
    issue::encrypt_signed(
        &signed,
        &authority.encryption.certificate_pem,
        ContentEncryption::A256Gcm,
    )
    .unwrap()
}

/// Full `Authorization` header value for `claims`.
pub fn issue_bearer(authority: &TestAuthority, claims: &serde_json::Map<String, Value>) -> String {
    format!("Bearer {}", issue_token(authority, claims))
}
