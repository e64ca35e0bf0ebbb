//! TLS module for managing certificates and private keys.

pub mod certificate;
pub mod key;
pub mod pem;
pub mod template;

pub use certificate::{load_certificate, load_certificate_chain, Certificate, Subject};
pub use key::{load_key, Passphrase, PrivateKey};
pub use pem::PemCipher;
pub use template::{CertTemplate, ExtendedKeyUsage, KeyUsage, SerialNumber};

use rand::{CryptoRng, RngCore};
use rcgen::KeyPair;
use rustls::pki_types::PrivatePkcs8KeyDer;

use crate::error::{CertError, Result};

/// Generate a self-signed certificate and private key
///
/// The key is drawn from `rng`, which must be a cryptographically secure source.
pub fn generate_self_signed<R: RngCore + CryptoRng>(
    template: &CertTemplate,
    rng: &mut R,
) -> Result<(Certificate, PrivateKey)> {
    template.validate()?;
    template.validate_key_bits()?;
    tracing::debug!(
        "Generating {}-bit RSA key for {:?}",
        template.key_bits,
        template.subject.common_name
    );
    let key = PrivateKey::generate(rng, template.key_bits)?;
    let cert = sign(template, &key, rng)?;
    Ok((cert, key))
}

/// Issue a self-signed certificate for an existing key.
pub fn certify_key<R: RngCore + CryptoRng>(
    template: &CertTemplate,
    key: &PrivateKey,
    rng: &mut R,
) -> Result<Certificate> {
    template.validate()?;
    sign(template, key, rng)
}

fn sign<R: RngCore + CryptoRng>(
    template: &CertTemplate,
    key: &PrivateKey,
    rng: &mut R,
) -> Result<Certificate> {
    let serial = template.serial.resolve(rng)?;
    let params = template.to_params(serial)?;

    let pkcs8 = key.to_pkcs8_der()?;
    let key_pair = KeyPair::from_pkcs8_der_and_sign_algo(
        &PrivatePkcs8KeyDer::from(pkcs8.as_slice()),
        &rcgen::PKCS_RSA_SHA256,
    )
    .map_err(|e| CertError::Crypto(format!("key cannot sign certificates: {e}")))?;

    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| CertError::Crypto(format!("certificate signing failed: {e}")))?;
    Certificate::from_der(cert.der().clone())
}
