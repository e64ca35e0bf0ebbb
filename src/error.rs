//! Error type shared by every provisioning step.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Origin used for data that did not come from a file.
pub(crate) const IN_MEMORY: &str = "<memory>";

/// Errors returned while loading, decrypting or generating certificate material.
#[derive(Debug, Error)]
pub enum CertError {
    /// The file is missing or unreadable.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Malformed PEM or DER, or a block of an unexpected type.
    #[error("{origin}: malformed certificate data: {reason}")]
    Format { origin: String, reason: String },

    /// Wrong or missing passphrase for an encrypted key.
    #[error("{origin}: cannot decrypt private key: {reason}")]
    Decryption { origin: String, reason: String },

    /// Key generation or signing failed.
    #[error("crypto failure: {0}")]
    Crypto(String),

    /// The configuration describes an unusable combination.
    #[error("invalid certificate setup: {0}")]
    Configuration(String),
}

impl CertError {
    pub(crate) fn format(reason: impl Into<String>) -> Self {
        CertError::Format {
            origin: IN_MEMORY.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn decryption(reason: impl Into<String>) -> Self {
        CertError::Decryption {
            origin: IN_MEMORY.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        CertError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Attach the file the failing data was read from.
    pub(crate) fn in_file(self, path: &Path) -> Self {
        match self {
            CertError::Format { reason, .. } => CertError::Format {
                origin: path.display().to_string(),
                reason,
            },
            CertError::Decryption { reason, .. } => CertError::Decryption {
                origin: path.display().to_string(),
                reason,
            },
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, CertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_file_replaces_origin() {
        let err = CertError::format("no PEM block").in_file(Path::new("/etc/proxy/cert.pem"));
        assert_eq!(
            err.to_string(),
            "/etc/proxy/cert.pem: malformed certificate data: no PEM block"
        );
    }

    #[test]
    fn in_file_keeps_other_kinds() {
        let err = CertError::Crypto("rng".into()).in_file(Path::new("x"));
        assert!(matches!(err, CertError::Crypto(_)));
    }
}
