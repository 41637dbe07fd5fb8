use aes_gcm::{
    aead::{ consts::U16, AeadInPlace, KeyInit },
    aes::Aes256,
    AesGcm,
    Nonce,
    Tag,
};
use zeroize::Zeroizing;

use super::kdf::{ random_bytes, KEY_LEN };
use crate::error::{ AppError, Result };

/// AES-256-GCM with a 16-byte IV, matching the stored blob layout.
pub(crate) type Aes256Gcm16 = AesGcm<Aes256, U16>;

pub const IV_LEN: usize = 16;
pub const TAG_LEN: usize = 16;

/// Output of a single authenticated encryption.
pub(crate) struct Sealed {
    pub iv: [u8; IV_LEN],
    pub tag: [u8; TAG_LEN],
    pub ciphertext: Vec<u8>,
}

pub(crate) fn gcm_from_key(key: &[u8]) -> Result<Aes256Gcm16> {
    if key.len() != KEY_LEN {
        return Err(AppError::Encryption("Encryption key must be 32 bytes".to_string()));
    }

    Aes256Gcm16::new_from_slice(key).map_err(|e| AppError::Encryption(e.to_string()))
}

pub(crate) fn seal(cipher: &Aes256Gcm16, plaintext: &[u8]) -> Result<Sealed> {
    let iv = random_bytes::<IV_LEN>();
    let mut buffer = plaintext.to_vec();

    let tag = cipher
        .encrypt_in_place_detached(Nonce::<U16>::from_slice(&iv), b"", &mut buffer)
        .map_err(|e| AppError::Encryption(e.to_string()))?;

    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(tag.as_slice());

    Ok(Sealed {
        iv,
        tag: tag_bytes,
        ciphertext: buffer,
    })
}

/// Authenticated decryption. Any length or tag problem yields `None`.
pub(crate) fn open(
    cipher: &Aes256Gcm16,
    iv: &[u8],
    tag: &[u8],
    ciphertext: &[u8]
) -> Option<Zeroizing<String>> {
    if iv.len() != IV_LEN || tag.len() != TAG_LEN {
        return None;
    }

    let mut buffer = Zeroizing::new(ciphertext.to_vec());
    cipher
        .decrypt_in_place_detached(
            Nonce::<U16>::from_slice(iv),
            b"",
            buffer.as_mut_slice(),
            Tag::<U16>::from_slice(tag)
        )
        .ok()?;

    let text = std::str::from_utf8(buffer.as_slice()).ok()?;
    Some(Zeroizing::new(text.to_string()))
}

/// Cipher for secrets cached inside a session.
///
/// The key is random and lives only in process memory, so blobs produced here
/// are useless once the session (or the process) is gone. Format:
/// `ivHex:tagHex:ciphertextHex`.
pub struct SessionCipher {
    cipher: Aes256Gcm16,
}

impl SessionCipher {
    pub fn generate() -> Result<Self> {
        let key = Zeroizing::new(random_bytes::<KEY_LEN>());
        Self::new(key.as_ref())
    }

    pub fn new(key: &[u8]) -> Result<Self> {
        Ok(Self { cipher: gcm_from_key(key)? })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let sealed = seal(&self.cipher, plaintext.as_bytes())?;

        Ok(
            format!(
                "{}:{}:{}",
                hex::encode(sealed.iv),
                hex::encode(sealed.tag),
                hex::encode(&sealed.ciphertext)
            )
        )
    }

    pub fn decrypt(&self, blob: &str) -> Option<Zeroizing<String>> {
        let fields: Vec<&str> = blob.split(':').collect();
        let [iv_hex, tag_hex, ciphertext_hex] = fields.as_slice() else {
            return None;
        };

        let iv = hex::decode(iv_hex).ok()?;
        let tag = hex::decode(tag_hex).ok()?;
        let ciphertext = hex::decode(ciphertext_hex).ok()?;

        open(&self.cipher, &iv, &tag, &ciphertext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt() {
        let key = [0u8; 32];
        let cipher = SessionCipher::new(&key).unwrap();

        let plaintext = "test private key 0x1234567890abcdef";
        let encrypted = cipher.encrypt(plaintext).unwrap();
        let decrypted = cipher.decrypt(&encrypted).unwrap();

        assert_eq!(plaintext, decrypted.as_str());
        assert_eq!(encrypted.split(':').count(), 3);
    }

    #[test]
    fn test_different_nonces() {
        let cipher = SessionCipher::generate().unwrap();

        let plaintext = "same plaintext";
        let encrypted1 = cipher.encrypt(plaintext).unwrap();
        let encrypted2 = cipher.encrypt(plaintext).unwrap();

        // Different nonces should produce different ciphertexts
        assert_ne!(encrypted1, encrypted2);

        assert_eq!(cipher.decrypt(&encrypted1).unwrap().as_str(), plaintext);
        assert_eq!(cipher.decrypt(&encrypted2).unwrap().as_str(), plaintext);
    }

    #[test]
    fn test_other_session_key_cannot_decrypt() {
        let first = SessionCipher::generate().unwrap();
        let second = SessionCipher::generate().unwrap();

        let encrypted = first.encrypt("secret").unwrap();
        assert!(second.decrypt(&encrypted).is_none());
    }

    #[test]
    fn test_tampered_blob_fails_closed() {
        let cipher = SessionCipher::generate().unwrap();
        let encrypted = cipher.encrypt("secret").unwrap();

        let mut fields: Vec<String> = encrypted.split(':').map(str::to_string).collect();
        let flipped = if fields[2].starts_with('0') { "1" } else { "0" };
        fields[2].replace_range(0..1, flipped);

        assert!(cipher.decrypt(&fields.join(":")).is_none());
        assert!(cipher.decrypt("abcd").is_none());
        assert!(cipher.decrypt("00:11").is_none());
    }
}
