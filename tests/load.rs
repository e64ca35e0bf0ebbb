//! Loading certificates and keys produced by other tools.

use std::fs;
use std::path::PathBuf;

use proxycert::tls::{load_certificate, load_certificate_chain, load_key};
use proxycert::{CertError, CertSetup, CertTemplate, Passphrase};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

#[test]
fn certificate_from_pem_file() {
    let cert = load_certificate(&fixture("legacy_cert.pem")).unwrap();

    let der = fs::read(fixture("legacy_cert.der")).unwrap();
    assert_eq!(&cert.der()[..], der.as_slice());

    let subject = cert.subject();
    assert_eq!(subject.common_name, "3xLOGIC Inc");
    assert_eq!(subject.organization, "infinias");
    assert_eq!(subject.locality, "Indianapolis");
    assert_eq!(subject.province, "Indiana");
    assert_eq!(subject.country, "US");
    assert_eq!(subject.email, "support@infinias.com");
    assert!(cert.is_self_issued());
    assert_eq!(
        cert.serial(),
        &[
            0x61, 0xde, 0x33, 0x28, 0x04, 0xff, 0xbb, 0xa0, 0x42, 0xe9, 0xa3, 0x86, 0x41, 0x5c,
            0xf8, 0x4a
        ]
    );
}

#[test]
fn certificate_from_der_file() {
    let from_der = load_certificate(&fixture("legacy_cert.der")).unwrap();
    let from_pem = load_certificate(&fixture("legacy_cert.pem")).unwrap();
    assert_eq!(from_der.der(), from_pem.der());
}

#[test]
fn key_file_is_not_a_certificate() {
    let err = load_certificate(&fixture("legacy_key.pem")).unwrap_err();
    match err {
        CertError::Format { origin, .. } => assert!(origin.ends_with("legacy_key.pem")),
        other => panic!("expected a format error, got {other:?}"),
    }
}

#[test]
fn chain_holds_every_certificate_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chain.pem");
    let leaf = fs::read_to_string(fixture("legacy_cert.pem")).unwrap();
    fs::write(&path, format!("{leaf}{leaf}")).unwrap();

    let chain = load_certificate_chain(&path).unwrap();
    assert_eq!(chain.len(), 2);
    assert_eq!(chain[0], chain[1]);

    let empty = dir.path().join("empty.pem");
    fs::write(&empty, "").unwrap();
    assert!(matches!(
        load_certificate_chain(&empty),
        Err(CertError::Format { .. })
    ));
}

#[test]
fn cleartext_key_loads_without_passphrase() {
    let key = load_key(&fixture("legacy_key.pem"), None).unwrap();
    assert_eq!(key.bits(), 1024);

    let empty = Passphrase::from("");
    let again = load_key(&fixture("legacy_key.pem"), Some(&empty)).unwrap();
    assert_eq!(key, again);
}

#[test]
fn pkcs8_key_matches_pkcs1_key() {
    let pkcs1 = load_key(&fixture("legacy_key.pem"), None).unwrap();
    let pkcs8 = load_key(&fixture("legacy_key_pkcs8.pem"), None).unwrap();
    assert_eq!(pkcs1, pkcs8);
}

#[test]
fn encrypted_key_loads_with_passphrase() {
    let secret = Passphrase::from("secret");
    let decrypted = load_key(&fixture("legacy_key_encrypted.pem"), Some(&secret)).unwrap();
    let cleartext = load_key(&fixture("legacy_key.pem"), None).unwrap();
    assert_eq!(decrypted, cleartext);
}

#[test]
fn encrypted_key_rejects_wrong_or_missing_passphrase() {
    let path = fixture("legacy_key_encrypted.pem");

    let wrong = Passphrase::from("not-the-secret");
    let err = load_key(&path, Some(&wrong)).unwrap_err();
    assert!(matches!(err, CertError::Decryption { .. }), "{err}");

    let err = load_key(&path, None).unwrap_err();
    assert!(matches!(err, CertError::Decryption { .. }), "{err}");
}

#[test]
fn missing_key_file_names_the_path() {
    let path = fixture("does_not_exist.pem");
    match load_key(&path, None).unwrap_err() {
        CertError::Io { path: reported, .. } => assert_eq!(reported, path),
        other => panic!("expected an I/O error, got {other:?}"),
    }
}

#[test]
fn legacy_pair_loads_together() {
    let setup = CertSetup::load_pair(
        fixture("legacy_cert.pem"),
        fixture("legacy_key_encrypted.pem"),
    )
    .with_passphrase("secret");
    let certified = setup.provision().unwrap();

    assert!(certified.certificate().matches_key(certified.key()));
    assert_eq!(certified.chain().len(), 1);
    assert_eq!(certified.certificate().subject().common_name, "3xLOGIC Inc");
}

#[test]
fn legacy_key_is_too_small_to_certify() {
    let setup = CertSetup::load_key(fixture("legacy_key.pem"), CertTemplate::new("proxy.local"));
    assert!(matches!(setup.provision(), Err(CertError::Crypto(_))));
}
