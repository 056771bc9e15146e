//! Compact JWE decryption for the encrypted outer envelope.
//!
//! Credentials arrive as a five-segment compact serialization:
//! `header.encrypted_key.iv.ciphertext.tag`, each segment base64url without
//! padding. The content-encryption key is unwrapped with the encryption
//! role's RSA private key, then the payload is decrypted with the symmetric
//! content algorithm named in the protected header.
//!
//! # Security properties
//!
//! - Both algorithm slots are pinned: the header's `alg`/`enc` values select
//!   only within [`KeyManagement`] and [`ContentEncryption`]; anything else
//!   is rejected before key material is touched.
//! - The additional authenticated data is the protected header exactly as
//!   transmitted, so header tampering invalidates the payload.
//! - CBC-HMAC authentication tags are compared in constant time, and MAC,
//!   padding, and key-unwrap failures all collapse into one
//!   [`JweError::Decrypt`] variant.

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use rand_core::{OsRng, RngCore};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde::Deserialize;
use sha2::{Sha256, Sha512};
use subtle::ConstantTimeEq;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Errors raised while unwrapping or building a compact JWE.
#[derive(Debug, thiserror::Error)]
pub enum JweError {
    /// The token is not a structurally valid compact JWE.
    #[error("not a compact JWE: {0}")]
    Format(String),

    /// The header names a key-management algorithm outside the pinned set.
    #[error("key-management algorithm '{0}' is not allowed")]
    KeyAlgorithm(String),

    /// The header names a content-encryption algorithm outside the pinned set.
    #[error("content-encryption algorithm '{0}' is not allowed")]
    ContentAlgorithm(String),

    /// The provided key material could not be parsed.
    #[error("invalid key material: {0}")]
    Key(String),

    /// Key unwrap, tag check, or content decryption failed.
    #[error("payload decryption failed")]
    Decrypt,

    /// Content encryption failed while building a token.
    #[error("payload encryption failed")]
    Encrypt,

    /// The decrypted payload is not valid UTF-8.
    #[error("decrypted payload is not UTF-8")]
    Utf8,
}

/// Pinned key-management algorithms (RSA-OAEP family only; RSA1_5 and all
/// symmetric wraps are rejected).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyManagement {
    /// RSA-OAEP with SHA-1 (the JOSE default for `RSA-OAEP`).
    RsaOaep,
    /// RSA-OAEP with SHA-256.
    RsaOaep256,
}

impl KeyManagement {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "RSA-OAEP" => Some(Self::RsaOaep),
            "RSA-OAEP-256" => Some(Self::RsaOaep256),
            _ => None,
        }
    }

    /// JOSE registry name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::RsaOaep => "RSA-OAEP",
            Self::RsaOaep256 => "RSA-OAEP-256",
        }
    }

    fn padding(self) -> Oaep {
        match self {
            Self::RsaOaep => Oaep::new::<sha1::Sha1>(),
            Self::RsaOaep256 => Oaep::new::<Sha256>(),
        }
    }
}

/// Pinned content-encryption algorithms: what a node-jose or OpenIddict
/// issuer produces for RSA recipients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncryption {
    /// AES-256-GCM.
    A256Gcm,
    /// AES-128-CBC with HMAC-SHA-256.
    A128CbcHs256,
    /// AES-256-CBC with HMAC-SHA-512.
    A256CbcHs512,
}

impl ContentEncryption {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "A256GCM" => Some(Self::A256Gcm),
            "A128CBC-HS256" => Some(Self::A128CbcHs256),
            "A256CBC-HS512" => Some(Self::A256CbcHs512),
            _ => None,
        }
    }

    /// JOSE registry name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::A256Gcm => "A256GCM",
            Self::A128CbcHs256 => "A128CBC-HS256",
            Self::A256CbcHs512 => "A256CBC-HS512",
        }
    }

    /// Required content-encryption key length in bytes.
    fn key_len(self) -> usize {
        match self {
            Self::A256Gcm | Self::A128CbcHs256 => 32,
            Self::A256CbcHs512 => 64,
        }
    }

    /// Required initialization-vector length in bytes.
    fn iv_len(self) -> usize {
        match self {
            Self::A256Gcm => 12,
            Self::A128CbcHs256 | Self::A256CbcHs512 => 16,
        }
    }
}

#[derive(Debug, Deserialize)]
struct JweHeader {
    alg: String,
    enc: String,
}

/// Decrypt a compact-serialized JWE with the encryption role's private key,
/// returning the UTF-8 plaintext (the inner signed token).
///
/// # Errors
///
/// Structural problems report which segment is malformed; every cryptographic
/// failure is the single [`JweError::Decrypt`] variant so callers cannot be
/// used as a padding or key oracle.
pub fn decrypt_compact(token: &str, private_key_pem: &str) -> Result<String, JweError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 5 {
        return Err(JweError::Format(format!(
            "expected five dot-separated segments, found {}",
            segments.len()
        )));
    }

    let protected = segments[0];
    let header_bytes = decode_segment(protected, "protected header")?;
    let header: JweHeader = serde_json::from_slice(&header_bytes)
        .map_err(|_| JweError::Format("protected header is not valid JSON".to_string()))?;

    let alg = KeyManagement::from_name(&header.alg)
        .ok_or_else(|| JweError::KeyAlgorithm(header.alg.clone()))?;
    let enc = ContentEncryption::from_name(&header.enc)
        .ok_or_else(|| JweError::ContentAlgorithm(header.enc.clone()))?;

    let encrypted_key = decode_segment(segments[1], "encrypted key")?;
    let iv = decode_segment(segments[2], "initialization vector")?;
    let ciphertext = decode_segment(segments[3], "ciphertext")?;
    let tag = decode_segment(segments[4], "authentication tag")?;

    let private_key = rsa_private_key_from_pem(private_key_pem)?;
    let cek = private_key
        .decrypt(alg.padding(), &encrypted_key)
        .map_err(|_| JweError::Decrypt)?;
    if cek.len() != enc.key_len() || iv.len() != enc.iv_len() {
        return Err(JweError::Decrypt);
    }

    // AAD is the protected header exactly as transmitted.
    let aad = protected.as_bytes();
    let plaintext = match enc {
        ContentEncryption::A256Gcm => decrypt_gcm(&cek, &iv, &ciphertext, &tag, aad)?,
        ContentEncryption::A128CbcHs256 => {
            let (mac_key, enc_key) = cek.split_at(16);
            let expected = hmac_tag::<Hmac<Sha256>>(mac_key, aad, &iv, &ciphertext)?;
            verify_tag(&expected[..16], &tag)?;
            Aes128CbcDec::new_from_slices(enc_key, &iv)
                .map_err(|_| JweError::Decrypt)?
                .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
                .map_err(|_| JweError::Decrypt)?
        }
        ContentEncryption::A256CbcHs512 => {
            let (mac_key, enc_key) = cek.split_at(32);
            let expected = hmac_tag::<Hmac<Sha512>>(mac_key, aad, &iv, &ciphertext)?;
            verify_tag(&expected[..32], &tag)?;
            Aes256CbcDec::new_from_slices(enc_key, &iv)
                .map_err(|_| JweError::Decrypt)?
                .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
                .map_err(|_| JweError::Decrypt)?
        }
    };

    String::from_utf8(plaintext).map_err(|_| JweError::Utf8)
}

/// Encrypt `plaintext` to `recipient` as a compact JWE (`RSA-OAEP` key
/// wrap). Used by the `token issue` CLI helper and round-trip tests; the
/// gate itself only decrypts.
///
/// # Errors
///
/// Returns [`JweError::Encrypt`] if key wrap or content encryption fails.
pub fn encrypt_compact(
    plaintext: &[u8],
    recipient: &RsaPublicKey,
    enc: ContentEncryption,
) -> Result<String, JweError> {
    let header = serde_json::json!({
        "alg": KeyManagement::RsaOaep.name(),
        "enc": enc.name(),
    });
    let protected = URL_SAFE_NO_PAD.encode(header.to_string());

    let mut cek = vec![0u8; enc.key_len()];
    OsRng.fill_bytes(&mut cek);
    let mut iv = vec![0u8; enc.iv_len()];
    OsRng.fill_bytes(&mut iv);

    let encrypted_key = recipient
        .encrypt(&mut OsRng, KeyManagement::RsaOaep.padding(), &cek)
        .map_err(|_| JweError::Encrypt)?;

    let aad = protected.as_bytes();
    let (ciphertext, tag) = match enc {
        ContentEncryption::A256Gcm => {
            let cipher = Aes256Gcm::new_from_slice(&cek).map_err(|_| JweError::Encrypt)?;
            let mut sealed = cipher
                .encrypt(Nonce::from_slice(&iv), Payload { msg: plaintext, aad })
                .map_err(|_| JweError::Encrypt)?;
            let tag = sealed.split_off(sealed.len() - 16);
            (sealed, tag)
        }
        ContentEncryption::A128CbcHs256 => {
            let (mac_key, enc_key) = cek.split_at(16);
            let ciphertext = Aes128CbcEnc::new_from_slices(enc_key, &iv)
                .map_err(|_| JweError::Encrypt)?
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext);
            let tag = hmac_tag::<Hmac<Sha256>>(mac_key, aad, &iv, &ciphertext)?[..16].to_vec();
            (ciphertext, tag)
        }
        ContentEncryption::A256CbcHs512 => {
            let (mac_key, enc_key) = cek.split_at(32);
            let ciphertext = Aes256CbcEnc::new_from_slices(enc_key, &iv)
                .map_err(|_| JweError::Encrypt)?
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext);
            let tag = hmac_tag::<Hmac<Sha512>>(mac_key, aad, &iv, &ciphertext)?[..32].to_vec();
            (ciphertext, tag)
        }
    };

    Ok(format!(
        "{protected}.{}.{}.{}.{}",
        URL_SAFE_NO_PAD.encode(encrypted_key),
        URL_SAFE_NO_PAD.encode(iv),
        URL_SAFE_NO_PAD.encode(ciphertext),
        URL_SAFE_NO_PAD.encode(tag),
    ))
}

fn decode_segment(segment: &str, what: &str) -> Result<Vec<u8>, JweError> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| JweError::Format(format!("{what} is not base64url")))
}

fn rsa_private_key_from_pem(pem: &str) -> Result<RsaPrivateKey, JweError> {
    use rsa::pkcs1::DecodeRsaPrivateKey;
    use rsa::pkcs8::DecodePrivateKey;

    if pem.contains("BEGIN RSA PRIVATE KEY") {
        RsaPrivateKey::from_pkcs1_pem(pem).map_err(|e| JweError::Key(e.to_string()))
    } else {
        RsaPrivateKey::from_pkcs8_pem(pem).map_err(|e| JweError::Key(e.to_string()))
    }
}

fn decrypt_gcm(
    cek: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, JweError> {
    if tag.len() != 16 {
        return Err(JweError::Decrypt);
    }
    let cipher = Aes256Gcm::new_from_slice(cek).map_err(|_| JweError::Decrypt)?;
    let mut sealed = Vec::with_capacity(ciphertext.len() + tag.len());
    sealed.extend_from_slice(ciphertext);
    sealed.extend_from_slice(tag);
    cipher
        .decrypt(Nonce::from_slice(iv), Payload { msg: &sealed, aad })
        .map_err(|_| JweError::Decrypt)
}

/// HMAC over `aad || iv || ciphertext || bitlen(aad)` per the CBC-HMAC
/// composition.
fn hmac_tag<M>(mac_key: &[u8], aad: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, JweError>
where
    M: Mac + hmac::digest::KeyInit,
{
    let mut mac = <M as Mac>::new_from_slice(mac_key).map_err(|_| JweError::Decrypt)?;
    mac.update(aad);
    mac.update(iv);
    mac.update(ciphertext);
    mac.update(&((aad.len() as u64) * 8).to_be_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

fn verify_tag(expected: &[u8], received: &[u8]) -> Result<(), JweError> {
    if expected.len() == received.len() && bool::from(expected.ct_eq(received)) {
        Ok(())
    } else {
        Err(JweError::Decrypt)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::OnceLock;

    use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
    use rsa::pkcs8::EncodePrivateKey;

    use super::*;

    fn test_key() -> &'static (RsaPrivateKey, RsaPublicKey, String) {
        static KEY: OnceLock<(RsaPrivateKey, RsaPublicKey, String)> = OnceLock::new();
        KEY.get_or_init(|| {
            let private = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
            let public = RsaPublicKey::from(&private);
            let pem = private
                .to_pkcs8_pem(rsa::pkcs8::LineEnding::LF)
                .unwrap()
                .to_string();
            (private, public, pem)
        })
    }

    #[test]
    fn round_trip_a256gcm() {
        let (_, public, pem) = test_key();
        let token =
            encrypt_compact(b"inner.signed.token", public, ContentEncryption::A256Gcm).unwrap();
        let plaintext = decrypt_compact(&token, pem).unwrap();
        assert_eq!(plaintext, "inner.signed.token");
    }

    #[test]
    fn round_trip_a128cbc_hs256() {
        let (_, public, pem) = test_key();
        let token =
            encrypt_compact(b"payload", public, ContentEncryption::A128CbcHs256).unwrap();
        assert_eq!(decrypt_compact(&token, pem).unwrap(), "payload");
    }

    #[test]
    fn round_trip_a256cbc_hs512() {
        let (_, public, pem) = test_key();
        let token =
            encrypt_compact(b"payload", public, ContentEncryption::A256CbcHs512).unwrap();
        assert_eq!(decrypt_compact(&token, pem).unwrap(), "payload");
    }

    #[test]
    fn rejects_wrong_segment_count() {
        let (_, _, pem) = test_key();
        let err = decrypt_compact("a.b.c", pem).unwrap_err();
        assert!(matches!(err, JweError::Format(_)));
    }

    #[test]
    fn rejects_unpinned_key_algorithm() {
        let (_, _, pem) = test_key();
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"RSA1_5","enc":"A256GCM"}"#);
        let token = format!("{header}.AA.AA.AA.AA");
        let err = decrypt_compact(&token, pem).unwrap_err();
        assert!(matches!(err, JweError::KeyAlgorithm(alg) if alg == "RSA1_5"));
    }

    #[test]
    fn rejects_unpinned_content_algorithm() {
        let (_, _, pem) = test_key();
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"RSA-OAEP","enc":"A128GCM"}"#);
        let token = format!("{header}.AA.AA.AA.AA");
        let err = decrypt_compact(&token, pem).unwrap_err();
        assert!(matches!(err, JweError::ContentAlgorithm(enc) if enc == "A128GCM"));
    }

    #[test]
    fn rejects_tampered_ciphertext() {
        let (_, public, pem) = test_key();
        let token = encrypt_compact(b"payload", public, ContentEncryption::A256Gcm).unwrap();

        let mut segments: Vec<String> = token.split('.').map(str::to_string).collect();
        let mut ciphertext = URL_SAFE_NO_PAD.decode(&segments[3]).unwrap();
        ciphertext[0] ^= 0x01;
        segments[3] = URL_SAFE_NO_PAD.encode(ciphertext);

        let err = decrypt_compact(&segments.join("."), pem).unwrap_err();
        assert!(matches!(err, JweError::Decrypt));
    }

    #[test]
    fn rejects_tampered_header() {
        let (_, public, pem) = test_key();
        let token = encrypt_compact(b"payload", public, ContentEncryption::A256Gcm).unwrap();

        // Re-encode an equivalent header with extra whitespace: same JSON,
        // different AAD bytes, so authentication must fail.
        let mut segments: Vec<String> = token.split('.').map(str::to_string).collect();
        segments[0] = URL_SAFE_NO_PAD.encode(r#"{"alg":"RSA-OAEP", "enc":"A256GCM"}"#);

        let err = decrypt_compact(&segments.join("."), pem).unwrap_err();
        assert!(matches!(err, JweError::Decrypt));
    }

    #[test]
    fn rejects_wrong_key() {
        let (_, public, _) = test_key();
        let other = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let other_pem = other
            .to_pkcs8_pem(rsa::pkcs8::LineEnding::LF)
            .unwrap()
            .to_string();

        let token = encrypt_compact(b"payload", public, ContentEncryption::A256Gcm).unwrap();
        let err = decrypt_compact(&token, &other_pem).unwrap_err();
        assert!(matches!(err, JweError::Decrypt));
    }
}
