//! Turning provisioned material into configuration for a TLS listener.

use std::sync::Arc;

use rustls::ServerConfig;

use crate::error::{CertError, Result};
use crate::setup::{CertSetup, CertifiedKey};

/// Builds a rustls server configuration presenting `certified`.
///
/// rustls refuses keys it cannot sign with (RSA below 2048 bits, for one), so this
/// also checks that the pair is usable on a live connection.
pub fn server_config(certified: &CertifiedKey) -> Result<ServerConfig> {
    let key = certified.key().to_rustls()?;
    ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| CertError::Crypto(format!("no usable TLS protocol versions: {e}")))?
        .with_no_client_auth()
        .with_single_cert(certified.chain().to_vec(), key)
        .map_err(|e| CertError::Crypto(format!("TLS stack rejected certificate and key: {e}")))
}

/// Provisions the pair described by `setup` and returns server configuration for it.
pub fn configure_server(setup: &CertSetup) -> Result<ServerConfig> {
    let certified = setup.provision()?;
    let config = server_config(&certified)?;
    tracing::info!(
        "TLS server configured with certificate for {:?}",
        certified.certificate().subject().common_name
    );
    Ok(config)
}
