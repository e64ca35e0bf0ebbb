//! Private key handling utilities

use std::{fmt, fs, path::Path};

use rand::{CryptoRng, RngCore};
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey, LineEnding};
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs1KeyDer};
use serde::{Deserialize, Deserializer};
use zeroize::Zeroizing;

use crate::error::{CertError, Result};
use crate::tls::pem::{self, PemCipher};

/// Secret used to decrypt or encrypt a private key. Empty means "no passphrase".
#[derive(Clone, Default)]
pub struct Passphrase(Zeroizing<String>);

impl Passphrase {
    pub fn new(secret: impl Into<String>) -> Self {
        Passphrase(Zeroizing::new(secret.into()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl From<&str> for Passphrase {
    fn from(secret: &str) -> Self {
        Passphrase::new(secret)
    }
}

impl From<String> for Passphrase {
    fn from(secret: String) -> Self {
        Passphrase::new(secret)
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(<redacted>)")
    }
}

impl<'de> Deserialize<'de> for Passphrase {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        String::deserialize(deserializer).map(Passphrase::from)
    }
}

/// An RSA private key. Never printed; zeroized when dropped.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey {
    inner: RsaPrivateKey,
}

impl PrivateKey {
    /// Generate a fresh key of `bits` bits from `rng`.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R, bits: usize) -> Result<Self> {
        let inner = RsaPrivateKey::new(rng, bits)
            .map_err(|e| CertError::Crypto(format!("RSA key generation failed: {e}")))?;
        Ok(Self { inner })
    }

    /// Parse a PKCS #1 `RSAPrivateKey` structure.
    pub fn from_pkcs1_der(der: &[u8]) -> Result<Self> {
        let inner = RsaPrivateKey::from_pkcs1_der(der)
            .map_err(|e| CertError::format(format!("invalid PKCS #1 private key: {e}")))?;
        Ok(Self { inner })
    }

    /// Parse an unencrypted PKCS #8 `PrivateKeyInfo` holding an RSA key.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        let inner = RsaPrivateKey::from_pkcs8_der(der)
            .map_err(|e| CertError::format(format!("invalid PKCS #8 RSA private key: {e}")))?;
        Ok(Self { inner })
    }

    pub fn public_key(&self) -> RsaPublicKey {
        self.inner.to_public_key()
    }

    /// Modulus size in bits.
    pub fn bits(&self) -> usize {
        self.inner.size() * 8
    }

    pub fn as_rsa(&self) -> &RsaPrivateKey {
        &self.inner
    }

    pub fn to_pkcs1_der(&self) -> Result<Zeroizing<Vec<u8>>> {
        let doc = self
            .inner
            .to_pkcs1_der()
            .map_err(|e| CertError::Crypto(format!("failed to encode private key: {e}")))?;
        Ok(Zeroizing::new(doc.as_bytes().to_vec()))
    }

    pub fn to_pkcs8_der(&self) -> Result<Zeroizing<Vec<u8>>> {
        let doc = self
            .inner
            .to_pkcs8_der()
            .map_err(|e| CertError::Crypto(format!("failed to encode private key: {e}")))?;
        Ok(Zeroizing::new(doc.as_bytes().to_vec()))
    }

    /// Cleartext `RSA PRIVATE KEY` PEM.
    pub fn to_pkcs1_pem(&self) -> Result<Zeroizing<String>> {
        self.inner
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| CertError::Crypto(format!("failed to encode private key: {e}")))
    }

    /// `RSA PRIVATE KEY` PEM encrypted under `passphrase` with a legacy `DEK-Info` header.
    pub fn to_encrypted_pem<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        passphrase: &Passphrase,
        cipher: PemCipher,
    ) -> Result<String> {
        let der = self.to_pkcs1_der()?;
        pem::encrypt_block(rng, pem::RSA_PRIVATE_KEY, &der, passphrase, cipher)
    }

    /// The key in the form rustls expects.
    pub fn to_rustls(&self) -> Result<PrivateKeyDer<'static>> {
        let der = self.to_pkcs1_der()?;
        Ok(PrivateKeyDer::Pkcs1(PrivatePkcs1KeyDer::from(der.to_vec())))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("bits", &self.bits())
            .finish_non_exhaustive()
    }
}

/// Decode a private key from PEM bytes held in memory.
///
/// Accepts `RSA PRIVATE KEY` (cleartext or encrypted) and cleartext `PRIVATE KEY` blocks.
pub fn decode_key(input: &[u8], passphrase: Option<&Passphrase>) -> Result<PrivateKey> {
    let block = pem::decode_block(input, &[pem::RSA_PRIVATE_KEY, pem::PRIVATE_KEY], passphrase)?;

    if !block.was_encrypted && passphrase.is_some_and(|p| !p.is_empty()) {
        tracing::debug!("passphrase supplied for a cleartext key, ignoring it");
    }

    let parsed = if block.label == pem::PRIVATE_KEY {
        PrivateKey::from_pkcs8_der(&block.contents)
    } else {
        PrivateKey::from_pkcs1_der(&block.contents)
    };

    match parsed {
        // Garbage after decryption means the padding check was fooled by a wrong passphrase.
        Err(CertError::Format { reason, .. }) if block.was_encrypted => Err(CertError::decryption(
            format!("incorrect passphrase ({reason})"),
        )),
        other => other,
    }
}

/// Load private key from a file
pub fn load_key(key_path: &Path, passphrase: Option<&Passphrase>) -> Result<PrivateKey> {
    let data = Zeroizing::new(fs::read(key_path).map_err(|e| CertError::io(key_path, e))?);
    let key = decode_key(&data, passphrase).map_err(|e| e.in_file(key_path))?;
    tracing::debug!("Loaded {}-bit private key from {}", key.bits(), key_path.display());
    Ok(key)
}
