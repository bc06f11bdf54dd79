//! Result store crypto: blob encryption and detached integrity signatures
//!
//! Encryption is AES-256-GCM with the key derived from the configured
//! passphrase via SHA-256 and a random nonce prefixed to the blob.
//! Integrity is HMAC-SHA256 over the final on-disk bytes, hex-encoded
//! into a sidecar file, so verification happens before any decrypt.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::{EngineError, Result};

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 12;

/// Symmetric cipher over the serialized result blob
pub struct StoreCipher {
    key: Vec<u8>,
}

impl StoreCipher {
    /// Derive a 256-bit key from an operator-supplied passphrase
    pub fn new(passphrase: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(passphrase.as_bytes());
        Self {
            key: hasher.finalize().to_vec(),
        }
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| EngineError::Integrity(format!("encrypt failed: {}", e)))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    pub fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>> {
        if blob.len() < NONCE_LEN {
            return Err(EngineError::Integrity("ciphertext too short".to_string()));
        }
        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| EngineError::Integrity(format!("decrypt failed: {}", e)))
    }
}

/// Keyed-hash signer for the detached sidecar signature
pub struct IntegritySigner {
    key: Vec<u8>,
}

impl IntegritySigner {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.as_bytes().to_vec(),
        }
    }

    /// Hex-encoded HMAC-SHA256 over the given bytes
    pub fn sign(&self, data: &[u8]) -> String {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.key)
            .expect("HMAC can take key of any size");
        mac.update(data);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Constant-time verification of a hex sidecar signature
    pub fn verify(&self, data: &[u8], signature: &str) -> bool {
        let expected = match hex::decode(signature.trim()) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.key)
            .expect("HMAC can take key of any size");
        mac.update(data);
        mac.verify_slice(&expected).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cipher_round_trip() {
        let cipher = StoreCipher::new("hunter2");
        let blob = cipher.encrypt(b"[{\"module\":\"x\"}]").expect("encrypt");
        assert_ne!(blob.first(), Some(&b'['));
        let plain = cipher.decrypt(&blob).expect("decrypt");
        assert_eq!(plain, b"[{\"module\":\"x\"}]");
    }

    #[test]
    fn test_wrong_passphrase_rejected() {
        let blob = StoreCipher::new("a").encrypt(b"data").expect("encrypt");
        assert!(StoreCipher::new("b").decrypt(&blob).is_err());
    }

    #[test]
    fn test_signature_detects_tamper() {
        let signer = IntegritySigner::new("secret");
        let sig = signer.sign(b"payload");
        assert!(signer.verify(b"payload", &sig));
        assert!(!signer.verify(b"payloae", &sig));
        assert!(!signer.verify(b"payload", "not-hex"));
    }
}
