//! AES-GCM masking of event payloads before they leave the process.

use aes_gcm::aead::consts::U12;
use aes_gcm::aead::Aead;
use aes_gcm::{aes::Aes192, Aes128Gcm, Aes256Gcm, AesGcm, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

const NONCE_LENGTH: usize = 12;

type Aes192Gcm = AesGcm<Aes192, U12>;

#[derive(Debug, Error)]
pub enum MaskingError {
    #[error("invalid key length: expected 16, 24 or 32 bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
    #[error("payload could not be serialised: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("ciphertext missing nonce")]
    MissingNonce,
    #[error("encryption failure")]
    EncryptFailure,
    #[error("decryption failure")]
    DecryptFailure,
}

#[derive(Clone)]
enum Cipher {
    Aes128(Aes128Gcm),
    Aes192(Aes192Gcm),
    Aes256(Aes256Gcm),
}

/// Cipher context built once at startup and handed to whoever needs to mask.
#[derive(Clone)]
pub struct DataMasker {
    cipher: Arc<Cipher>,
}

impl DataMasker {
    pub fn from_base64(value: &str) -> Result<Self, MaskingError> {
        let decoded = BASE64_STANDARD.decode(value.trim())?;
        Self::from_bytes(&decoded)
    }

    /// Key size picks the AES variant.
    pub fn from_bytes(key: &[u8]) -> Result<Self, MaskingError> {
        let invalid = |_| MaskingError::InvalidKeyLength(key.len());
        let cipher = match key.len() {
            16 => Cipher::Aes128(Aes128Gcm::new_from_slice(key).map_err(invalid)?),
            24 => Cipher::Aes192(Aes192Gcm::new_from_slice(key).map_err(invalid)?),
            32 => Cipher::Aes256(Aes256Gcm::new_from_slice(key).map_err(invalid)?),
            other => return Err(MaskingError::InvalidKeyLength(other)),
        };
        Ok(Self {
            cipher: Arc::new(cipher),
        })
    }

    /// Serialise `value` to JSON and encrypt it. Output is nonce || ciphertext.
    pub fn mask<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, MaskingError> {
        let plaintext = serde_json::to_vec(value)?;

        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let mut ciphertext = match self.cipher.as_ref() {
            Cipher::Aes128(c) => c.encrypt(nonce, plaintext.as_slice()),
            Cipher::Aes192(c) => c.encrypt(nonce, plaintext.as_slice()),
            Cipher::Aes256(c) => c.encrypt(nonce, plaintext.as_slice()),
        }
        .map_err(|_| MaskingError::EncryptFailure)?;

        let mut output = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        output.extend_from_slice(&nonce_bytes);
        output.append(&mut ciphertext);
        Ok(output)
    }

    pub fn unmask<T: DeserializeOwned>(&self, masked: &[u8]) -> Result<T, MaskingError> {
        if masked.len() <= NONCE_LENGTH {
            return Err(MaskingError::MissingNonce);
        }
        let (nonce_bytes, encrypted) = masked.split_at(NONCE_LENGTH);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = match self.cipher.as_ref() {
            Cipher::Aes128(c) => c.decrypt(nonce, encrypted),
            Cipher::Aes192(c) => c.decrypt(nonce, encrypted),
            Cipher::Aes256(c) => c.decrypt(nonce, encrypted),
        }
        .map_err(|_| MaskingError::DecryptFailure)?;

        Ok(serde_json::from_slice(&plaintext)?)
    }
}

impl std::fmt::Debug for DataMasker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataMasker")
            .field("key", &"***redacted***")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_mask_round_trip_for_each_key_size() {
        for size in [16usize, 24, 32] {
            let masker = DataMasker::from_bytes(&vec![7u8; size]).unwrap();
            let payload = json!({"session_id": "cs_1", "amount": "100.00"});
            let masked = masker.mask(&payload).unwrap();
            assert!(!masked.windows(4).any(|w| w == b"cs_1"));
            let recovered: Value = masker.unmask(&masked).unwrap();
            assert_eq!(recovered, payload);
        }
    }

    #[test]
    fn test_rejects_bad_key_length() {
        assert!(matches!(
            DataMasker::from_bytes(&[1u8; 20]),
            Err(MaskingError::InvalidKeyLength(20))
        ));
    }

    #[test]
    fn test_wrong_key_cannot_unmask() {
        let a = DataMasker::from_bytes(&[1u8; 32]).unwrap();
        let b = DataMasker::from_bytes(&[2u8; 32]).unwrap();
        let masked = a.mask(&json!({"k": 1})).unwrap();
        assert!(matches!(
            b.unmask::<Value>(&masked),
            Err(MaskingError::DecryptFailure)
        ));
    }

    #[test]
    fn test_base64_key_parsing() {
        let encoded = BASE64_STANDARD.encode([9u8; 16]);
        assert!(DataMasker::from_base64(&encoded).is_ok());
        assert!(DataMasker::from_base64("%%%").is_err());
    }
}
