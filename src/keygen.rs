//! Certificate material generation — seeding the parameter store.
//!
//! The gate only ever reads key material, but operators need a way to mint
//! the two self-signed RSA certificate/key pairs the store holds. This
//! module backs the `authgate keys generate` CLI command and the test
//! fixtures; output is the exact dual-PEM blob format the store records use
//! (certificate first, then PKCS#8 private key, joined by a newline).

use rand_core::OsRng;
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair, PKCS_RSA_SHA256};
use rsa::RsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};

use crate::{Error, Result};

/// RSA modulus size for generated keys.
const RSA_BITS: usize = 2048;

/// One generated certificate/key pair in PEM form.
#[derive(Debug)]
pub struct GeneratedMaterial {
    /// PEM-encoded self-signed certificate.
    pub certificate_pem: String,
    /// PEM-encoded PKCS#8 private key.
    pub private_key_pem: String,
}

impl GeneratedMaterial {
    /// Render as the dual-PEM blob format stored in the parameter store.
    #[must_use]
    pub fn dual_pem(&self) -> String {
        format!(
            "{}\n{}",
            self.certificate_pem.trim_end(),
            self.private_key_pem.trim_end()
        )
    }
}

/// Generate an RSA-2048 key pair and a self-signed certificate for it.
///
/// # Errors
///
/// Returns [`Error::Keygen`] if key generation, PEM serialisation, or
/// certificate signing fails.
pub fn generate_self_signed(common_name: &str, validity_days: u32) -> Result<GeneratedMaterial> {
    let private_key = RsaPrivateKey::new(&mut OsRng, RSA_BITS)
        .map_err(|e| Error::Keygen(format!("RSA key generation failed: {e}")))?;
    let private_key_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| Error::Keygen(format!("key serialisation failed: {e}")))?
        .to_string();

    // rcgen cannot generate RSA keys itself, but signs fine with an
    // imported one.
    let key_pair = KeyPair::from_pem_and_sign_algo(&private_key_pem, &PKCS_RSA_SHA256)
        .map_err(|e| Error::Keygen(format!("key import failed: {e}")))?;

    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    params.distinguished_name = dn;
    params.not_after = validity_to_date(validity_days)?;

    let certificate = params
        .self_signed(&key_pair)
        .map_err(|e| Error::Keygen(format!("certificate generation failed: {e}")))?;

    Ok(GeneratedMaterial {
        certificate_pem: certificate.pem(),
        private_key_pem,
    })
}

fn validity_to_date(days: u32) -> Result<time::OffsetDateTime> {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now_secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| Error::Keygen(format!("system time error: {e}")))?
        .as_secs();

    let future_secs = now_secs.saturating_add(u64::from(days) * 86_400);

    time::OffsetDateTime::from_unix_timestamp(i64::try_from(future_secs).unwrap_or(i64::MAX))
        .map_err(|e| Error::Keygen(format!("date calculation error: {e}")))
}
