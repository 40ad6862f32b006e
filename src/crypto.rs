use aes_gcm::aead::{Aead, KeyInit, Nonce};
use aes_gcm::Aes256Gcm;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;

use crate::error::AppError;

pub const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// AES-256-GCM for phone numbers at rest. Payload layout is
/// base64(`ciphertext || nonce`) with the 12-byte nonce at the end.
#[derive(Clone)]
pub struct PhoneCipher {
    cipher: Aes256Gcm,
}

impl PhoneCipher {
    pub fn new(key: &[u8]) -> Result<Self, AppError> {
        if key.len() != KEY_LEN {
            return Err(AppError::Crypto(format!(
                "encryption key must be {KEY_LEN} bytes, got {}",
                key.len()
            )));
        }

        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|err| AppError::Crypto(format!("invalid key: {err}")))?;

        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, AppError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::<Aes256Gcm>::from_slice(&nonce_bytes);

        let mut payload = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| AppError::Crypto("encryption failed".to_string()))?;
        payload.extend_from_slice(&nonce_bytes);

        Ok(STANDARD.encode(payload))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String, AppError> {
        let payload = STANDARD
            .decode(encoded)
            .map_err(|err| AppError::Crypto(format!("payload is not base64: {err}")))?;

        if payload.len() <= NONCE_LEN {
            return Err(AppError::Crypto("payload too short".to_string()));
        }

        let (ciphertext, nonce_bytes) = payload.split_at(payload.len() - NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::<Aes256Gcm>::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| AppError::Crypto("decryption failed".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|err| AppError::Crypto(format!("plaintext is not utf8: {err}")))
    }
}

impl std::fmt::Debug for PhoneCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PhoneCipher(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::validate_phone;

    const KEY: &[u8; KEY_LEN] = b"0123456789abcdef0123456789abcdef";

    #[test]
    fn valid_phones_survive_a_round_trip() {
        let cipher = PhoneCipher::new(KEY).unwrap();
        for raw in ["+79991234567", "8 (912) 000-11-22", "89030000000"] {
            let phone = validate_phone(raw).unwrap();
            let sealed = cipher.encrypt(&phone).unwrap();
            assert_ne!(sealed, phone);
            assert_eq!(cipher.decrypt(&sealed).unwrap(), phone);
        }
    }

    #[test]
    fn nonces_differ_between_encryptions() {
        let cipher = PhoneCipher::new(KEY).unwrap();
        let first = cipher.encrypt("+79991234567").unwrap();
        let second = cipher.encrypt("+79991234567").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn wrong_key_length_is_rejected() {
        assert!(matches!(PhoneCipher::new(b"short"), Err(AppError::Crypto(_))));
    }

    #[test]
    fn tampered_payload_fails_to_decrypt() {
        let cipher = PhoneCipher::new(KEY).unwrap();
        let other = PhoneCipher::new(b"fedcba9876543210fedcba9876543210").unwrap();
        let sealed = cipher.encrypt("+79991234567").unwrap();

        assert!(matches!(other.decrypt(&sealed), Err(AppError::Crypto(_))));
        assert!(matches!(cipher.decrypt("not base64!"), Err(AppError::Crypto(_))));
        assert!(matches!(cipher.decrypt("AAAA"), Err(AppError::Crypto(_))));
    }
}
