//! Certificate handling utilities

use std::{fs, path::Path};

use rsa::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;
use rustls::pki_types::CertificateDer;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use x509_parser::prelude::{FromDer, X509Certificate, X509Name};
use x509_parser::x509::AttributeTypeAndValue;

use crate::error::{CertError, Result};
use crate::tls::key::PrivateKey;
use crate::tls::pem;

/// Distinguished name fields a proxy certificate carries. Absent fields are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Subject {
    pub common_name: String,
    pub organization: String,
    pub locality: String,
    pub province: String,
    pub country: String,
    pub email: String,
}

impl Subject {
    fn from_name(name: &X509Name<'_>) -> Self {
        Subject {
            common_name: first_value(name.iter_common_name()),
            organization: first_value(name.iter_organization()),
            locality: first_value(name.iter_locality()),
            province: first_value(name.iter_state_or_province()),
            country: first_value(name.iter_country()),
            email: first_value(name.iter_email()),
        }
    }
}

fn first_value<'a, 'b: 'a>(
    mut attrs: impl Iterator<Item = &'a AttributeTypeAndValue<'b>>,
) -> String {
    attrs
        .next()
        .and_then(|attr| attr.as_str().ok())
        .map(str::to_owned)
        .unwrap_or_default()
}

/// A parsed X.509 certificate together with its DER encoding.
#[derive(Debug, Clone)]
pub struct Certificate {
    der: CertificateDer<'static>,
    subject: Subject,
    issuer: Subject,
    serial: Vec<u8>,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
    public_key: RsaPublicKey,
}

impl Certificate {
    /// Parse a DER-encoded certificate. Only RSA subject keys are accepted.
    pub fn from_der(der: CertificateDer<'static>) -> Result<Self> {
        let (subject, issuer, serial, not_before, not_after, public_key) = {
            let (_, parsed) = X509Certificate::from_der(der.as_ref())
                .map_err(|e| CertError::format(format!("invalid X.509 certificate: {e}")))?;
            let public_key =
                RsaPublicKey::from_public_key_der(parsed.public_key().raw).map_err(|e| {
                    CertError::format(format!("certificate key is not a usable RSA key: {e}"))
                })?;
            let validity = parsed.validity();
            (
                Subject::from_name(parsed.subject()),
                Subject::from_name(parsed.issuer()),
                parsed.raw_serial().to_vec(),
                validity.not_before.to_datetime(),
                validity.not_after.to_datetime(),
                public_key,
            )
        };

        Ok(Certificate {
            der,
            subject,
            issuer,
            serial,
            not_before,
            not_after,
            public_key,
        })
    }

    pub fn der(&self) -> &CertificateDer<'static> {
        &self.der
    }

    pub fn to_pem(&self) -> String {
        pem::encode_block(pem::CERTIFICATE, self.der.as_ref())
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    pub fn issuer(&self) -> &Subject {
        &self.issuer
    }

    /// Big-endian serial number as it appears in the encoding.
    pub fn serial(&self) -> &[u8] {
        &self.serial
    }

    pub fn not_before(&self) -> OffsetDateTime {
        self.not_before
    }

    pub fn not_after(&self) -> OffsetDateTime {
        self.not_after
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    pub fn is_self_issued(&self) -> bool {
        self.subject == self.issuer
    }

    /// True when `key` is the private half of this certificate's public key.
    pub fn matches_key(&self, key: &PrivateKey) -> bool {
        self.public_key == key.public_key()
    }
}

/// Decode the first `CERTIFICATE` block of PEM bytes held in memory.
pub fn decode_certificate(input: &[u8]) -> Result<Certificate> {
    let block = pem::decode_block(input, &[pem::CERTIFICATE], None)?;
    Certificate::from_der(CertificateDer::from(block.contents.to_vec()))
}

/// Load a certificate from a file. Files ending in `.der` hold raw DER.
pub fn load_certificate(cert_path: &Path) -> Result<Certificate> {
    let data = fs::read(cert_path).map_err(|e| CertError::io(cert_path, e))?;
    let cert = if is_der(cert_path) {
        Certificate::from_der(CertificateDer::from(data))
    } else {
        decode_certificate(&data)
    };
    let cert = cert.map_err(|e| e.in_file(cert_path))?;
    tracing::debug!(
        "Loaded certificate for {:?} from {}",
        cert.subject().common_name,
        cert_path.display()
    );
    Ok(cert)
}

/// Load certificate chain from a file
pub fn load_certificate_chain(cert_path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let data = fs::read(cert_path).map_err(|e| CertError::io(cert_path, e))?;
    let chain = if is_der(cert_path) {
        vec![CertificateDer::from(data)]
    } else {
        rustls_pemfile::certs(&mut &*data)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| {
                CertError::format(format!("invalid PEM-encoded certificate: {e}"))
                    .in_file(cert_path)
            })?
    };
    if chain.is_empty() {
        return Err(CertError::format("no certificates found").in_file(cert_path));
    }
    Ok(chain)
}

fn is_der(path: &Path) -> bool {
    path.extension().map_or(false, |x| x == "der")
}
