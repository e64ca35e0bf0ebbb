//! This example provisions a certificate and key the way a proxy listener would,
//! and optionally writes them out as PEM.

use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use proxycert::endpoint::server_config;
use proxycert::{CertConfig, CertSetup, CertTemplate, Passphrase, PemCipher};
use rand::rngs::OsRng;

use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Command line arguments for the provisioner.
#[derive(Parser, Debug)]
struct Args {
    /// PEM certificate to load.
    #[arg(short = 'c', long = "cert", help = "PEM certificate to load.")]
    cert_file: Option<PathBuf>,
    /// PEM private key to load.
    #[arg(short = 'k', long = "key", help = "PEM private key to load.")]
    key_file: Option<PathBuf>,
    /// Passphrase of an encrypted private key.
    #[arg(short = 'p', long = "passphrase", help = "Passphrase of an encrypted private key.")]
    passphrase: Option<String>,
    /// Common name used when a certificate has to be issued.
    #[arg(
        short = 'n',
        long = "name",
        help = "Common name used when a certificate has to be issued."
    )]
    common_name: Option<String>,
    /// Where to write the certificate.
    #[arg(long = "out-cert", help = "Where to write the certificate.")]
    out_cert: Option<PathBuf>,
    /// Where to write the private key.
    #[arg(long = "out-key", help = "Where to write the private key.")]
    out_key: Option<PathBuf>,
    /// Encrypt the written key with this passphrase (AES-256-CBC).
    #[arg(
        long = "out-passphrase",
        help = "Encrypt the written key with this passphrase (AES-256-CBC)."
    )]
    out_passphrase: Option<String>,
}

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default subscriber failed");

    let args = Args::parse();

    let config = CertConfig {
        cert_file: args.cert_file,
        key_file: args.key_file,
        passphrase: args.passphrase.map(Passphrase::from),
        template: args.common_name.map(|name| CertTemplate::new(name.clone()).dns_name(name)),
    };
    let setup = CertSetup::try_from(config)?;
    let certified = setup.provision()?;

    let cert = certified.certificate();
    info!(
        "Certificate for {:?}, valid {} to {}, serial {}",
        cert.subject().common_name,
        cert.not_before(),
        cert.not_after(),
        hex::encode(cert.serial())
    );

    // Make sure a TLS listener would accept the pair.
    server_config(&certified)?;

    if let Some(path) = args.out_cert {
        fs::write(&path, cert.to_pem())?;
        info!("Certificate written to {}", path.display());
    }
    if let Some(path) = args.out_key {
        let key = certified.key();
        match args.out_passphrase {
            Some(secret) => {
                let secret = Passphrase::from(secret);
                let pem = key.to_encrypted_pem(&mut OsRng, &secret, PemCipher::Aes256Cbc)?;
                fs::write(&path, pem)?;
            }
            None => fs::write(&path, key.to_pkcs1_pem()?.as_bytes())?,
        }
        info!("Private key written to {}", path.display());
    }

    Ok(())
}
