//! Secret generation and RSA encryption for the public-key challenge.
//!
//! The daemon encrypts a random secret with the principal's public key
//! (PKCS#1 v1.5); only the holder of the private key can send it back.

use rand::RngCore;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};

use crate::constants::SECRET_LEN;
use crate::error::{Error, Result};

/// Generate a random challenge secret.
pub fn generate_secret() -> [u8; SECRET_LEN] {
    let mut secret = [0u8; SECRET_LEN];
    rand::thread_rng().fill_bytes(&mut secret);
    secret
}

/// Parse a PEM public key.
///
/// Accepts SPKI (`PUBLIC KEY`) and PKCS#1 (`RSA PUBLIC KEY`).
pub fn parse_public_key(pem: &[u8]) -> Result<RsaPublicKey> {
    let pem = std::str::from_utf8(pem).map_err(|_| Error::Key {
        message: "public key is not valid PEM text".to_string(),
    })?;

    if let Ok(key) = RsaPublicKey::from_public_key_pem(pem) {
        return Ok(key);
    }
    RsaPublicKey::from_pkcs1_pem(pem).map_err(|e| Error::Key {
        message: format!("failed to parse public key: {}", e),
    })
}

/// Parse a PEM private key.
///
/// Accepts PKCS#8 (`PRIVATE KEY`) and PKCS#1 (`RSA PRIVATE KEY`).
pub fn parse_private_key(pem: &str) -> Result<RsaPrivateKey> {
    if let Ok(key) = RsaPrivateKey::from_pkcs8_pem(pem) {
        return Ok(key);
    }
    RsaPrivateKey::from_pkcs1_pem(pem).map_err(|e| Error::Key {
        message: format!("failed to parse private key: {}", e),
    })
}

/// Encrypt `secret` to `key`.
pub fn encrypt_secret(key: &RsaPublicKey, secret: &[u8]) -> Result<Vec<u8>> {
    key.encrypt(&mut rand::thread_rng(), Pkcs1v15Encrypt, secret)
        .map_err(|e| Error::Key {
            message: format!("encryption failed: {}", e),
        })
}

/// Decrypt a challenge ciphertext.
pub fn decrypt_secret(key: &RsaPrivateKey, ciphertext: &[u8]) -> Result<Vec<u8>> {
    key.decrypt(Pkcs1v15Encrypt, ciphertext)
        .map_err(|e| Error::Key {
            message: format!("decryption failed: {}", e),
        })
}

/// Compare two secrets without short-circuiting on the first difference.
pub fn secrets_match(expected: &[u8], received: &[u8]) -> bool {
    if expected.len() != received.len() {
        return false;
    }
    expected
        .iter()
        .zip(received)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
