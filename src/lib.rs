//! Certificate and private key provisioning for TLS proxies.
//!
//! A [`CertSetup`] says where the pair comes from: both halves on disk, a key on disk
//! certified with a template, or everything generated. [`cert_and_key`] turns it into a
//! [`CertifiedKey`] whose certificate always belongs to its key.

pub mod endpoint;
pub mod error;
pub mod setup;
pub mod tls;

pub use error::{CertError, Result};
pub use setup::{cert_and_key, CertConfig, CertSetup, CertifiedKey};
pub use tls::{CertTemplate, Certificate, Passphrase, PemCipher, PrivateKey};
