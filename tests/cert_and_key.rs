//! End-to-end provisioning: generate, persist, reload.

use std::fs;
use std::net::{IpAddr, Ipv4Addr};

use proxycert::endpoint::server_config;
use proxycert::{
    cert_and_key, CertConfig, CertError, CertSetup, CertTemplate, Passphrase, PemCipher, PrivateKey,
};
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;

fn proxy_template() -> CertTemplate {
    CertTemplate::new("3xLOGIC Inc")
        .organization("infinias")
        .locality("Indianapolis")
        .province("Indiana")
        .country("US")
        .email("support@infinias.com")
        .dns_name("localhost")
        .ip_address(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

fn random_passphrase(len: usize) -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[test]
fn generated_pair_survives_every_reload_path() {
    let template = proxy_template();
    let generated = cert_and_key(&CertSetup::generate(template.clone()), &mut OsRng).unwrap();
    let (cert, key) = (generated.certificate(), generated.key());

    assert!(cert.matches_key(key));
    assert_eq!(cert.subject(), &template.subject);

    let dir = tempfile::tempdir().unwrap();
    let cert_path = dir.path().join("cert.pem");
    let clear_key_path = dir.path().join("clearkey.pem");
    let crypt_key_path = dir.path().join("cryptkey.pem");

    fs::write(&cert_path, cert.to_pem()).unwrap();
    fs::write(&clear_key_path, key.to_pkcs1_pem().unwrap().as_bytes()).unwrap();

    let passphrase = random_passphrase(10);
    let encrypted = key
        .to_encrypted_pem(&mut OsRng, &Passphrase::from(passphrase.as_str()), PemCipher::Aes256Cbc)
        .unwrap();
    fs::write(&crypt_key_path, encrypted).unwrap();

    let setups = [
        CertSetup::load_key(&clear_key_path, template.clone()),
        CertSetup::load_key(&crypt_key_path, template.clone()).with_passphrase(passphrase.as_str()),
        CertSetup::load_pair(&cert_path, &clear_key_path),
        CertSetup::load_pair(&cert_path, &crypt_key_path).with_passphrase(passphrase.as_str()),
    ];

    for setup in &setups {
        let reloaded = cert_and_key(setup, &mut OsRng).unwrap();
        assert_eq!(reloaded.key(), key, "{setup:?}");
        assert!(reloaded.certificate().matches_key(reloaded.key()), "{setup:?}");
        assert_eq!(reloaded.certificate().subject(), &template.subject, "{setup:?}");
    }

    let pair = cert_and_key(&setups[3], &mut OsRng).unwrap();
    assert_eq!(pair.certificate().der(), cert.der());

    let rekeyed = cert_and_key(&setups[0], &mut OsRng).unwrap();
    assert_ne!(rekeyed.certificate().serial(), cert.serial());

    let err = cert_and_key(
        &CertSetup::load_pair(&cert_path, &crypt_key_path).with_passphrase("wrong"),
        &mut OsRng,
    )
    .unwrap_err();
    assert!(matches!(err, CertError::Decryption { .. }), "{err}");
}

#[test]
fn mismatched_files_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let cert_path = dir.path().join("cert.pem");
    let key_path = dir.path().join("key.pem");

    let generated = cert_and_key(&CertSetup::generate(proxy_template()), &mut OsRng).unwrap();
    let stranger = PrivateKey::generate(&mut OsRng, 2048).unwrap();

    fs::write(&cert_path, generated.certificate().to_pem()).unwrap();
    fs::write(&key_path, stranger.to_pkcs1_pem().unwrap().as_bytes()).unwrap();

    let err = cert_and_key(&CertSetup::load_pair(&cert_path, &key_path), &mut OsRng).unwrap_err();
    assert!(matches!(err, CertError::Configuration(_)), "{err}");
}

#[test]
fn certificate_without_key_never_generates() {
    let dir = tempfile::tempdir().unwrap();
    let cert_path = dir.path().join("cert.pem");

    let config = CertConfig {
        cert_file: Some(cert_path),
        template: Some(proxy_template()),
        ..CertConfig::default()
    };
    let err = CertSetup::try_from(config).unwrap_err();
    assert!(matches!(err, CertError::Configuration(_)), "{err}");
}

#[test]
fn generated_pair_is_accepted_by_rustls() {
    let certified = CertSetup::generate(proxy_template()).provision().unwrap();
    assert!(server_config(&certified).is_ok());
}
