//! Certificate templates: the metadata a generated certificate is built from.

use std::net::IpAddr;

use rand::{CryptoRng, RngCore};
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue,
    ExtendedKeyUsagePurpose, Ia5String, IsCa, KeyUsagePurpose, PrintableString, SanType,
};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::error::{CertError, Result};
use crate::tls::certificate::Subject;

pub const DEFAULT_KEY_BITS: usize = 2048;
pub const MIN_KEY_BITS: usize = 2048;
pub const MAX_KEY_BITS: usize = 4096;

const SERIAL_LEN: usize = 16;
const MAX_SERIAL_LEN: usize = 20;
const PKCS9_EMAIL_ADDRESS: [u64; 7] = [1, 2, 840, 113549, 1, 9, 1];

/// How a generated certificate's serial number is chosen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerialNumber {
    /// 128 bits from the caller's random source, positive and fixed-width.
    #[default]
    Random,
    /// A caller-chosen big-endian value. Every certificate from the template shares it.
    ///
    /// The bytes are the minimal DER content of a positive integer: the first byte is
    /// in `0x01..=0x7f`, so the certificate carries exactly these bytes.
    Fixed(Vec<u8>),
}

impl SerialNumber {
    pub fn resolve<R: RngCore + CryptoRng>(&self, rng: &mut R) -> Result<Vec<u8>> {
        match self {
            SerialNumber::Random => {
                let mut serial = vec![0u8; SERIAL_LEN];
                rng.try_fill_bytes(&mut serial)
                    .map_err(|e| CertError::Crypto(format!("random source failed: {e}")))?;
                // Clear the sign bit, set the next one so the encoding never shrinks.
                serial[0] = (serial[0] & 0x7f) | 0x40;
                Ok(serial)
            }
            SerialNumber::Fixed(serial) => Ok(serial.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyUsage {
    DigitalSignature,
    ContentCommitment,
    KeyEncipherment,
    DataEncipherment,
    KeyAgreement,
    KeyCertSign,
    CrlSign,
}

impl From<KeyUsage> for KeyUsagePurpose {
    fn from(usage: KeyUsage) -> Self {
        match usage {
            KeyUsage::DigitalSignature => KeyUsagePurpose::DigitalSignature,
            KeyUsage::ContentCommitment => KeyUsagePurpose::ContentCommitment,
            KeyUsage::KeyEncipherment => KeyUsagePurpose::KeyEncipherment,
            KeyUsage::DataEncipherment => KeyUsagePurpose::DataEncipherment,
            KeyUsage::KeyAgreement => KeyUsagePurpose::KeyAgreement,
            KeyUsage::KeyCertSign => KeyUsagePurpose::KeyCertSign,
            KeyUsage::CrlSign => KeyUsagePurpose::CrlSign,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtendedKeyUsage {
    ServerAuth,
    ClientAuth,
}

impl From<ExtendedKeyUsage> for ExtendedKeyUsagePurpose {
    fn from(usage: ExtendedKeyUsage) -> Self {
        match usage {
            ExtendedKeyUsage::ServerAuth => ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsage::ClientAuth => ExtendedKeyUsagePurpose::ClientAuth,
        }
    }
}

/// Everything needed to issue a self-signed certificate.
///
/// Built either with [`CertTemplate::new`] and the chained setters, or deserialized
/// from the proxy's configuration file (validity timestamps are RFC 3339).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertTemplate {
    pub subject: Subject,
    #[serde(default)]
    pub dns_names: Vec<String>,
    #[serde(default)]
    pub ip_addresses: Vec<IpAddr>,
    #[serde(with = "time::serde::rfc3339")]
    pub not_before: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub not_after: OffsetDateTime,
    #[serde(default)]
    pub serial: SerialNumber,
    #[serde(default = "default_key_usages")]
    pub key_usages: Vec<KeyUsage>,
    #[serde(default = "default_extended_key_usages")]
    pub extended_key_usages: Vec<ExtendedKeyUsage>,
    #[serde(default)]
    pub is_ca: bool,
    #[serde(default = "default_key_bits")]
    pub key_bits: usize,
}

fn default_key_usages() -> Vec<KeyUsage> {
    vec![KeyUsage::DigitalSignature, KeyUsage::KeyEncipherment]
}

fn default_extended_key_usages() -> Vec<ExtendedKeyUsage> {
    vec![ExtendedKeyUsage::ServerAuth]
}

fn default_key_bits() -> usize {
    DEFAULT_KEY_BITS
}

impl CertTemplate {
    /// A template valid from now for 365 days, with a random serial and a 2048-bit key.
    pub fn new(common_name: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        let now = now - Duration::nanoseconds(i64::from(now.nanosecond()));
        CertTemplate {
            subject: Subject {
                common_name: common_name.into(),
                ..Subject::default()
            },
            dns_names: Vec::new(),
            ip_addresses: Vec::new(),
            not_before: now,
            not_after: now + Duration::days(365),
            serial: SerialNumber::Random,
            key_usages: default_key_usages(),
            extended_key_usages: default_extended_key_usages(),
            is_ca: false,
            key_bits: DEFAULT_KEY_BITS,
        }
    }

    pub fn organization(mut self, organization: impl Into<String>) -> Self {
        self.subject.organization = organization.into();
        self
    }

    pub fn locality(mut self, locality: impl Into<String>) -> Self {
        self.subject.locality = locality.into();
        self
    }

    pub fn province(mut self, province: impl Into<String>) -> Self {
        self.subject.province = province.into();
        self
    }

    pub fn country(mut self, country: impl Into<String>) -> Self {
        self.subject.country = country.into();
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.subject.email = email.into();
        self
    }

    pub fn dns_name(mut self, name: impl Into<String>) -> Self {
        self.dns_names.push(name.into());
        self
    }

    pub fn ip_address(mut self, ip: IpAddr) -> Self {
        self.ip_addresses.push(ip);
        self
    }

    pub fn validity(mut self, not_before: OffsetDateTime, not_after: OffsetDateTime) -> Self {
        self.not_before = not_before;
        self.not_after = not_after;
        self
    }

    pub fn serial(mut self, serial: SerialNumber) -> Self {
        self.serial = serial;
        self
    }

    pub fn key_usages(mut self, usages: Vec<KeyUsage>) -> Self {
        self.key_usages = usages;
        self
    }

    /// Mark the certificate as a CA. Required before `KeyCertSign` may be asserted.
    pub fn ca(mut self, is_ca: bool) -> Self {
        self.is_ca = is_ca;
        self
    }

    pub fn key_bits(mut self, bits: usize) -> Self {
        self.key_bits = bits;
        self
    }

    /// Reject templates that cannot produce a usable certificate.
    pub fn validate(&self) -> Result<()> {
        if self.subject.common_name.trim().is_empty() {
            return Err(config_error("common name must not be empty"));
        }
        if self.not_after <= self.not_before {
            return Err(config_error(format!(
                "validity window ends ({}) before it starts ({})",
                self.not_after, self.not_before
            )));
        }
        if let SerialNumber::Fixed(serial) = &self.serial {
            validate_fixed_serial(serial)?;
        }
        if self.key_usages.contains(&KeyUsage::KeyCertSign) && !self.is_ca {
            return Err(config_error(
                "keyCertSign key usage is only allowed on a CA certificate",
            ));
        }
        Ok(())
    }

    /// Reject key sizes outside the supported range.
    pub fn validate_key_bits(&self) -> Result<()> {
        if !(MIN_KEY_BITS..=MAX_KEY_BITS).contains(&self.key_bits) {
            return Err(config_error(format!(
                "key size {} is outside {MIN_KEY_BITS}..={MAX_KEY_BITS} bits",
                self.key_bits
            )));
        }
        Ok(())
    }

    /// Translate into rcgen parameters with the given serial number.
    pub(crate) fn to_params(&self, serial: Vec<u8>) -> Result<CertificateParams> {
        let mut params = CertificateParams::default();
        params.distinguished_name = self.distinguished_name()?;

        for name in &self.dns_names {
            let name = Ia5String::try_from(name.as_str())
                .map_err(|e| config_error(format!("invalid DNS name {name:?}: {e}")))?;
            params.subject_alt_names.push(SanType::DnsName(name));
        }
        for ip in &self.ip_addresses {
            params.subject_alt_names.push(SanType::IpAddress(*ip));
        }

        params.not_before = self.not_before;
        params.not_after = self.not_after;
        params.serial_number = Some(rcgen::SerialNumber::from(serial));
        params.key_usages = self.key_usages.iter().copied().map(Into::into).collect();
        params.extended_key_usages = self
            .extended_key_usages
            .iter()
            .copied()
            .map(Into::into)
            .collect();
        params.is_ca = if self.is_ca {
            IsCa::Ca(BasicConstraints::Unconstrained)
        } else {
            IsCa::NoCa
        };
        Ok(params)
    }

    fn distinguished_name(&self) -> Result<DistinguishedName> {
        let subject = &self.subject;
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, subject.common_name.as_str());
        if !subject.organization.is_empty() {
            dn.push(DnType::OrganizationName, subject.organization.as_str());
        }
        if !subject.locality.is_empty() {
            dn.push(DnType::LocalityName, subject.locality.as_str());
        }
        if !subject.province.is_empty() {
            dn.push(DnType::StateOrProvinceName, subject.province.as_str());
        }
        if !subject.country.is_empty() {
            let country = PrintableString::try_from(subject.country.as_str())
                .map_err(|e| config_error(format!("invalid country {:?}: {e}", subject.country)))?;
            dn.push(DnType::CountryName, DnValue::PrintableString(country));
        }
        if !subject.email.is_empty() {
            let email = Ia5String::try_from(subject.email.as_str())
                .map_err(|e| config_error(format!("invalid email {:?}: {e}", subject.email)))?;
            dn.push(
                DnType::CustomDnType(PKCS9_EMAIL_ADDRESS.to_vec()),
                DnValue::Ia5String(email),
            );
        }
        Ok(dn)
    }
}

fn validate_fixed_serial(serial: &[u8]) -> Result<()> {
    if serial.is_empty() || serial.len() > MAX_SERIAL_LEN {
        return Err(config_error(format!(
            "fixed serial number must be 1 to {MAX_SERIAL_LEN} bytes, got {}",
            serial.len()
        )));
    }
    if serial.iter().all(|b| *b == 0) {
        return Err(config_error("fixed serial number must be positive"));
    }
    if serial[0] == 0x00 {
        return Err(config_error(
            "fixed serial number must not have leading zero bytes",
        ));
    }
    if serial[0] & 0x80 != 0 {
        return Err(config_error(format!(
            "fixed serial number must start with a byte below 0x80, got {:#04x}",
            serial[0]
        )));
    }
    Ok(())
}

fn config_error(reason: impl Into<String>) -> CertError {
    CertError::Configuration(reason.into())
}
