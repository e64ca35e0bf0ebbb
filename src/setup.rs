//! Provisioning strategies and the orchestrator that runs them.

use std::path::{Path, PathBuf};

use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use rustls::pki_types::CertificateDer;
use serde::Deserialize;

use crate::error::{CertError, Result};
use crate::tls::{self, CertTemplate, Certificate, Passphrase, PrivateKey};

/// Where the proxy's certificate and key come from.
#[derive(Debug, Clone)]
pub enum CertSetup {
    /// Both halves are on disk. The key may be encrypted.
    LoadPair {
        cert_path: PathBuf,
        key_path: PathBuf,
        passphrase: Option<Passphrase>,
    },
    /// Only the key is on disk; a self-signed certificate is issued for it from `template`.
    LoadKey {
        key_path: PathBuf,
        passphrase: Option<Passphrase>,
        template: CertTemplate,
    },
    /// Nothing on disk; key and self-signed certificate are generated.
    GenerateSelfSigned { template: CertTemplate },
}

impl CertSetup {
    pub fn load_pair(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        CertSetup::LoadPair {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
            passphrase: None,
        }
    }

    pub fn load_key(key_path: impl Into<PathBuf>, template: CertTemplate) -> Self {
        CertSetup::LoadKey {
            key_path: key_path.into(),
            passphrase: None,
            template,
        }
    }

    pub fn generate(template: CertTemplate) -> Self {
        CertSetup::GenerateSelfSigned { template }
    }

    /// Set the key passphrase. No effect on `GenerateSelfSigned`.
    pub fn with_passphrase(mut self, secret: impl Into<Passphrase>) -> Self {
        match &mut self {
            CertSetup::LoadPair { passphrase, .. } | CertSetup::LoadKey { passphrase, .. } => {
                *passphrase = Some(secret.into());
            }
            CertSetup::GenerateSelfSigned { .. } => {}
        }
        self
    }

    /// Run [`cert_and_key`] with the operating system's random source.
    pub fn provision(&self) -> Result<CertifiedKey> {
        cert_and_key(self, &mut OsRng)
    }
}

/// Flat form of [`CertSetup`] as it appears in a configuration file.
///
/// Empty paths count as unset.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CertConfig {
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    pub passphrase: Option<Passphrase>,
    pub template: Option<CertTemplate>,
}

impl TryFrom<CertConfig> for CertSetup {
    type Error = CertError;

    fn try_from(config: CertConfig) -> Result<Self> {
        let cert_file = config.cert_file.filter(|p| !p.as_os_str().is_empty());
        let key_file = config.key_file.filter(|p| !p.as_os_str().is_empty());
        let passphrase = config.passphrase.filter(|p| !p.is_empty());

        match (cert_file, key_file, config.template) {
            (Some(cert_path), Some(key_path), template) => {
                if template.is_some() {
                    tracing::debug!("certificate and key files set, ignoring template");
                }
                Ok(CertSetup::LoadPair {
                    cert_path,
                    key_path,
                    passphrase,
                })
            }
            (Some(cert_path), None, _) => Err(CertError::Configuration(format!(
                "certificate file {} has no key file",
                cert_path.display()
            ))),
            (None, Some(key_path), Some(template)) => Ok(CertSetup::LoadKey {
                key_path,
                passphrase,
                template,
            }),
            (None, Some(key_path), None) => Err(CertError::Configuration(format!(
                "key file {} has neither a certificate file nor a template to certify it with",
                key_path.display()
            ))),
            (None, None, Some(template)) => Ok(CertSetup::GenerateSelfSigned { template }),
            (None, None, None) => Err(CertError::Configuration(
                "no certificate or key file and no template to generate from".to_string(),
            )),
        }
    }
}

/// A certificate chain and the private key matching its leaf.
#[derive(Debug, Clone)]
pub struct CertifiedKey {
    certificate: Certificate,
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKey,
}

impl CertifiedKey {
    /// The leaf certificate.
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// Leaf first, then any intermediates that came with it.
    pub fn chain(&self) -> &[CertificateDer<'static>] {
        &self.chain
    }

    pub fn key(&self) -> &PrivateKey {
        &self.key
    }

    pub fn into_parts(self) -> (Certificate, PrivateKey) {
        (self.certificate, self.key)
    }

    fn self_signed(certificate: Certificate, key: PrivateKey) -> Self {
        let chain = vec![certificate.der().clone()];
        CertifiedKey {
            certificate,
            chain,
            key,
        }
    }
}

/// Produce the certificate and key described by `setup`.
///
/// `rng` is only consumed when something is generated. Failures are returned as-is;
/// nothing is retried and nothing falls back to a generated substitute.
pub fn cert_and_key<R: RngCore + CryptoRng>(
    setup: &CertSetup,
    rng: &mut R,
) -> Result<CertifiedKey> {
    match setup {
        CertSetup::LoadPair {
            cert_path,
            key_path,
            passphrase,
        } => {
            tracing::info!(
                "Loading certificate from {} and key from {}",
                cert_path.display(),
                key_path.display()
            );
            load_pair(cert_path, key_path, passphrase.as_ref())
        }
        CertSetup::LoadKey {
            key_path,
            passphrase,
            template,
        } => {
            tracing::info!(
                "Loading key from {}, issuing self-signed certificate for {:?}",
                key_path.display(),
                template.subject.common_name
            );
            let key = tls::load_key(key_path, passphrase.as_ref())?;
            let certificate = tls::certify_key(template, &key, rng)?;
            Ok(CertifiedKey::self_signed(certificate, key))
        }
        CertSetup::GenerateSelfSigned { template } => {
            tracing::info!(
                "Generating self-signed certificate for {:?}",
                template.subject.common_name
            );
            let (certificate, key) = tls::generate_self_signed(template, rng)?;
            Ok(CertifiedKey::self_signed(certificate, key))
        }
    }
}

fn load_pair(
    cert_path: &Path,
    key_path: &Path,
    passphrase: Option<&Passphrase>,
) -> Result<CertifiedKey> {
    let chain = tls::load_certificate_chain(cert_path)?;
    let leaf = chain
        .first()
        .cloned()
        .ok_or_else(|| CertError::format("no certificates found").in_file(cert_path))?;
    let certificate = Certificate::from_der(leaf).map_err(|e| e.in_file(cert_path))?;
    let key = tls::load_key(key_path, passphrase)?;

    if !certificate.matches_key(&key) {
        return Err(CertError::Configuration(format!(
            "certificate {} was not issued for key {}",
            cert_path.display(),
            key_path.display()
        )));
    }

    Ok(CertifiedKey {
        certificate,
        chain,
        key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(json: &str) -> CertConfig {
        serde_json::from_str(json).unwrap()
    }

    const TEMPLATE: &str = r#"{
        "subject": { "common_name": "proxy.local" },
        "not_before": "2024-01-01T00:00:00Z",
        "not_after": "2034-01-01T00:00:00Z"
    }"#;

    #[test]
    fn both_files_load_a_pair() {
        let setup = CertSetup::try_from(config(
            r#"{
                "cert_file": "/etc/proxy/cert.pem",
                "key_file": "/etc/proxy/key.pem",
                "passphrase": "pw"
            }"#,
        ))
        .unwrap();
        match setup {
            CertSetup::LoadPair {
                cert_path,
                key_path,
                passphrase,
            } => {
                assert_eq!(cert_path, PathBuf::from("/etc/proxy/cert.pem"));
                assert_eq!(key_path, PathBuf::from("/etc/proxy/key.pem"));
                assert!(passphrase.is_some());
            }
            other => panic!("unexpected setup {other:?}"),
        }
    }

    #[test]
    fn certificate_without_key_is_rejected() {
        let err =
            CertSetup::try_from(config(r#"{ "cert_file": "/etc/proxy/cert.pem" }"#)).unwrap_err();
        assert!(matches!(err, CertError::Configuration(_)));
    }

    #[test]
    fn key_without_template_is_rejected() {
        let err =
            CertSetup::try_from(config(r#"{ "key_file": "/etc/proxy/key.pem" }"#)).unwrap_err();
        assert!(matches!(err, CertError::Configuration(_)));
    }

    #[test]
    fn key_with_template_certifies_the_key() {
        let json = format!(
            r#"{{ "key_file": "/etc/proxy/key.pem", "passphrase": "", "template": {TEMPLATE} }}"#
        );
        let setup = CertSetup::try_from(config(&json)).unwrap();
        match setup {
            CertSetup::LoadKey { passphrase, .. } => assert!(passphrase.is_none()),
            other => panic!("unexpected setup {other:?}"),
        }
    }

    #[test]
    fn template_alone_generates() {
        let json = format!(r#"{{ "cert_file": "", "key_file": "", "template": {TEMPLATE} }}"#);
        let setup = CertSetup::try_from(config(&json)).unwrap();
        assert!(matches!(setup, CertSetup::GenerateSelfSigned { .. }));
    }

    #[test]
    fn empty_config_is_rejected() {
        let err = CertSetup::try_from(CertConfig::default()).unwrap_err();
        assert!(matches!(err, CertError::Configuration(_)));
    }

    #[test]
    fn passphrase_is_ignored_for_generation() {
        let setup = CertSetup::generate(CertTemplate::new("proxy")).with_passphrase("pw");
        assert!(matches!(setup, CertSetup::GenerateSelfSigned { .. }));
    }

    #[test]
    fn passphrase_never_shows_in_debug_output() {
        let setup = CertSetup::load_pair("cert.pem", "key.pem").with_passphrase("hunter2");
        assert!(!format!("{setup:?}").contains("hunter2"));
    }
}
