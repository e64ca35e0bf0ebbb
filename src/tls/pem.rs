//! PEM block decoding, including legacy OpenSSL encrypted blocks
//! (`Proc-Type: 4,ENCRYPTED` with a `DEK-Info` header).

use aes::{Aes128, Aes192, Aes256};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use des::TdesEde3;
use md5::{Digest, Md5};
use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;

use crate::error::{CertError, Result};
use crate::tls::key::Passphrase;

pub const CERTIFICATE: &str = "CERTIFICATE";
pub const RSA_PRIVATE_KEY: &str = "RSA PRIVATE KEY";
pub const PRIVATE_KEY: &str = "PRIVATE KEY";

const PROC_TYPE: &str = "Proc-Type";
const DEK_INFO: &str = "DEK-Info";
const ENCRYPTED: &str = "4,ENCRYPTED";

/// Symmetric ciphers accepted in a `DEK-Info` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PemCipher {
    Aes128Cbc,
    Aes192Cbc,
    Aes256Cbc,
    DesEde3Cbc,
}

impl PemCipher {
    pub fn name(self) -> &'static str {
        match self {
            PemCipher::Aes128Cbc => "AES-128-CBC",
            PemCipher::Aes192Cbc => "AES-192-CBC",
            PemCipher::Aes256Cbc => "AES-256-CBC",
            PemCipher::DesEde3Cbc => "DES-EDE3-CBC",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "AES-128-CBC" => Some(PemCipher::Aes128Cbc),
            "AES-192-CBC" => Some(PemCipher::Aes192Cbc),
            "AES-256-CBC" => Some(PemCipher::Aes256Cbc),
            "DES-EDE3-CBC" => Some(PemCipher::DesEde3Cbc),
            _ => None,
        }
    }

    fn key_len(self) -> usize {
        match self {
            PemCipher::Aes128Cbc => 16,
            PemCipher::Aes192Cbc => 24,
            PemCipher::Aes256Cbc => 32,
            PemCipher::DesEde3Cbc => 24,
        }
    }

    fn block_len(self) -> usize {
        match self {
            PemCipher::DesEde3Cbc => 8,
            _ => 16,
        }
    }

    /// Returns `None` when the padding is invalid, which almost always means a wrong passphrase.
    fn decrypt(self, key: &[u8], iv: &[u8], data: &[u8]) -> Result<Option<Vec<u8>>> {
        let plain = match self {
            PemCipher::Aes128Cbc => cbc::Decryptor::<Aes128>::new_from_slices(key, iv)
                .map_err(invalid_length)?
                .decrypt_padded_vec_mut::<Pkcs7>(data),
            PemCipher::Aes192Cbc => cbc::Decryptor::<Aes192>::new_from_slices(key, iv)
                .map_err(invalid_length)?
                .decrypt_padded_vec_mut::<Pkcs7>(data),
            PemCipher::Aes256Cbc => cbc::Decryptor::<Aes256>::new_from_slices(key, iv)
                .map_err(invalid_length)?
                .decrypt_padded_vec_mut::<Pkcs7>(data),
            PemCipher::DesEde3Cbc => cbc::Decryptor::<TdesEde3>::new_from_slices(key, iv)
                .map_err(invalid_length)?
                .decrypt_padded_vec_mut::<Pkcs7>(data),
        };
        Ok(plain.ok())
    }

    fn encrypt(self, key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        let sealed = match self {
            PemCipher::Aes128Cbc => cbc::Encryptor::<Aes128>::new_from_slices(key, iv)
                .map_err(invalid_length)?
                .encrypt_padded_vec_mut::<Pkcs7>(data),
            PemCipher::Aes192Cbc => cbc::Encryptor::<Aes192>::new_from_slices(key, iv)
                .map_err(invalid_length)?
                .encrypt_padded_vec_mut::<Pkcs7>(data),
            PemCipher::Aes256Cbc => cbc::Encryptor::<Aes256>::new_from_slices(key, iv)
                .map_err(invalid_length)?
                .encrypt_padded_vec_mut::<Pkcs7>(data),
            PemCipher::DesEde3Cbc => cbc::Encryptor::<TdesEde3>::new_from_slices(key, iv)
                .map_err(invalid_length)?
                .encrypt_padded_vec_mut::<Pkcs7>(data),
        };
        Ok(sealed)
    }
}

fn invalid_length(e: impl std::fmt::Display) -> CertError {
    CertError::Crypto(format!("cipher setup failed: {e}"))
}

/// A decoded PEM block.
pub struct Block {
    pub label: String,
    pub contents: Zeroizing<Vec<u8>>,
    /// Set when the block carried `Proc-Type: 4,ENCRYPTED` and was decrypted.
    pub was_encrypted: bool,
}

/// Decode the first PEM block in `input`.
///
/// The block label must be one of `expected`. Encrypted blocks are decrypted with
/// `passphrase`; an empty passphrase counts as none.
pub fn decode_block(
    input: &[u8],
    expected: &[&str],
    passphrase: Option<&Passphrase>,
) -> Result<Block> {
    let block =
        ::pem::parse(input).map_err(|e| CertError::format(format!("no PEM block found: {e}")))?;

    if !expected.contains(&block.tag()) {
        return Err(CertError::format(format!(
            "unexpected PEM block type {:?}, expected one of {:?}",
            block.tag(),
            expected
        )));
    }

    let headers = block.headers();
    let encrypted = headers
        .get(PROC_TYPE)
        .is_some_and(|value| value.trim() == ENCRYPTED);

    if !encrypted {
        return Ok(Block {
            label: block.tag().to_string(),
            contents: Zeroizing::new(block.contents().to_vec()),
            was_encrypted: false,
        });
    }

    let dek_info = headers
        .get(DEK_INFO)
        .ok_or_else(|| CertError::format("encrypted block has no DEK-Info header"))?;
    let (cipher, iv) = parse_dek_info(dek_info)?;

    let passphrase = match passphrase {
        Some(p) if !p.is_empty() => p,
        _ => {
            return Err(CertError::decryption(
                "key is encrypted but no passphrase was supplied",
            ))
        }
    };

    let data = block.contents();
    if data.is_empty() || data.len() % cipher.block_len() != 0 {
        return Err(CertError::format(format!(
            "encrypted data length {} is not a multiple of the {} block size",
            data.len(),
            cipher.name()
        )));
    }

    let key = derive_key(passphrase.as_bytes(), &iv[..8], cipher.key_len());
    let plain = cipher
        .decrypt(&key, &iv, data)?
        .ok_or_else(|| CertError::decryption("incorrect passphrase"))?;

    Ok(Block {
        label: block.tag().to_string(),
        contents: Zeroizing::new(plain),
        was_encrypted: true,
    })
}

fn parse_dek_info(value: &str) -> Result<(PemCipher, Vec<u8>)> {
    let (name, iv_hex) = value
        .split_once(',')
        .ok_or_else(|| CertError::format(format!("malformed DEK-Info header {value:?}")))?;
    let cipher = PemCipher::from_name(name.trim())
        .ok_or_else(|| CertError::format(format!("unsupported PEM cipher {:?}", name.trim())))?;
    let iv = hex::decode(iv_hex.trim())
        .map_err(|e| CertError::format(format!("malformed DEK-Info IV: {e}")))?;
    if iv.len() != cipher.block_len() {
        return Err(CertError::format(format!(
            "DEK-Info IV is {} bytes, {} needs {}",
            iv.len(),
            cipher.name(),
            cipher.block_len()
        )));
    }
    Ok((cipher, iv))
}

/// OpenSSL `EVP_BytesToKey` with MD5 and a single iteration.
fn derive_key(passphrase: &[u8], salt: &[u8], len: usize) -> Zeroizing<Vec<u8>> {
    let mut key = Zeroizing::new(Vec::with_capacity(len + 16));
    while key.len() < len {
        let mut hasher = Md5::new();
        if key.len() >= 16 {
            hasher.update(&key[key.len() - 16..]);
        }
        hasher.update(passphrase);
        hasher.update(salt);
        key.extend_from_slice(&hasher.finalize());
    }
    key.truncate(len);
    key
}

/// Encode `der` as a cleartext PEM block.
pub fn encode_block(label: &str, der: &[u8]) -> String {
    ::pem::encode(&::pem::Pem::new(label, der.to_vec()))
}

/// Encrypt `der` under `passphrase` and encode it as a legacy encrypted PEM block.
///
/// The IV is drawn from `rng`; its first eight bytes double as the key derivation salt.
pub fn encrypt_block<R: RngCore + CryptoRng>(
    rng: &mut R,
    label: &str,
    der: &[u8],
    passphrase: &Passphrase,
    cipher: PemCipher,
) -> Result<String> {
    if passphrase.is_empty() {
        return Err(CertError::Configuration(
            "refusing to encrypt a key with an empty passphrase".to_string(),
        ));
    }

    let mut iv = vec![0u8; cipher.block_len()];
    rng.try_fill_bytes(&mut iv)
        .map_err(|e| CertError::Crypto(format!("random source failed: {e}")))?;

    let key = derive_key(passphrase.as_bytes(), &iv[..8], cipher.key_len());
    let sealed = cipher.encrypt(&key, &iv, der)?;

    let mut out = String::new();
    out.push_str(&format!("-----BEGIN {label}-----\n"));
    out.push_str(&format!("{PROC_TYPE}: {ENCRYPTED}\n"));
    out.push_str(&format!("{DEK_INFO}: {},{}\n\n", cipher.name(), hex::encode_upper(&iv)));
    let body = STANDARD.encode(&sealed);
    for line in body.as_bytes().chunks(64) {
        out.push_str(&String::from_utf8_lossy(line));
        out.push('\n');
    }
    out.push_str(&format!("-----END {label}-----\n"));
    Ok(out)
}
