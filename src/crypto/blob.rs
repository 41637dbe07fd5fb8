use std::fmt;

use aes::Aes256;
use cbc::cipher::{ block_padding::Pkcs7, BlockDecryptMut, KeyIvInit };
use zeroize::Zeroizing;

use super::encryption::{ gcm_from_key, open, seal, IV_LEN, TAG_LEN };
use super::kdf::{ derive_key, random_bytes, KEY_LEN, SALT_LEN };
use crate::enums::EncryptionVersion;
use crate::error::{ AppError, Result };

type Aes256CbcDec = cbc::Decryptor<Aes256>;

const AES_BLOCK_LEN: usize = 16;

/// A stored wallet secret, tagged by wire format.
///
/// The tag comes from the number of colon-separated fields alone:
/// two fields is the legacy `ivHex:ciphertextHex` layout, four is
/// `saltHex:ivHex:tagHex:ciphertextHex`. Anything else is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncryptedBlob {
    Legacy {
        iv: Vec<u8>,
        ciphertext: Vec<u8>,
    },
    Password {
        salt: Vec<u8>,
        iv: Vec<u8>,
        tag: Vec<u8>,
        ciphertext: Vec<u8>,
    },
}

impl EncryptedBlob {
    pub fn parse(raw: &str) -> Option<Self> {
        let fields: Vec<&str> = raw.trim().split(':').collect();

        match fields.as_slice() {
            [iv, ciphertext] => {
                let iv = hex::decode(iv).ok()?;
                let ciphertext = hex::decode(ciphertext).ok()?;
                let valid =
                    iv.len() == IV_LEN &&
                    !ciphertext.is_empty() &&
                    ciphertext.len() % AES_BLOCK_LEN == 0;
                valid.then_some(EncryptedBlob::Legacy { iv, ciphertext })
            }
            [salt, iv, tag, ciphertext] => {
                let salt = hex::decode(salt).ok()?;
                let iv = hex::decode(iv).ok()?;
                let tag = hex::decode(tag).ok()?;
                let ciphertext = hex::decode(ciphertext).ok()?;
                let valid =
                    salt.len() == SALT_LEN &&
                    iv.len() == IV_LEN &&
                    tag.len() == TAG_LEN &&
                    !ciphertext.is_empty();
                valid.then_some(EncryptedBlob::Password { salt, iv, tag, ciphertext })
            }
            _ => None,
        }
    }

    pub fn version(&self) -> EncryptionVersion {
        match self {
            EncryptedBlob::Legacy { .. } => EncryptionVersion::Legacy,
            EncryptedBlob::Password { .. } => EncryptionVersion::Password,
        }
    }

    /// Decrypt with whichever key the format calls for.
    pub fn decrypt(
        &self,
        password: &str,
        user_id: &str,
        legacy: &LegacyCipher
    ) -> Option<Zeroizing<String>> {
        match self {
            EncryptedBlob::Legacy { iv, ciphertext } => legacy.decrypt(iv, ciphertext),
            EncryptedBlob::Password { salt, iv, tag, ciphertext } => {
                let key = derive_key(password, user_id, salt);
                let cipher = gcm_from_key(key.as_ref()).ok()?;
                open(&cipher, iv, tag, ciphertext)
            }
        }
    }
}

impl fmt::Display for EncryptedBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncryptedBlob::Legacy { iv, ciphertext } => {
                write!(f, "{}:{}", hex::encode(iv), hex::encode(ciphertext))
            }
            EncryptedBlob::Password { salt, iv, tag, ciphertext } =>
                write!(
                    f,
                    "{}:{}:{}:{}",
                    hex::encode(salt),
                    hex::encode(iv),
                    hex::encode(tag),
                    hex::encode(ciphertext)
                ),
        }
    }
}

/// Encrypt a secret under a key derived from the user's password.
pub fn encrypt_with_password(plaintext: &str, password: &str, user_id: &str) -> Result<String> {
    let salt = random_bytes::<SALT_LEN>();
    let key = derive_key(password, user_id, &salt);
    let cipher = gcm_from_key(key.as_ref())?;
    let sealed = seal(&cipher, plaintext.as_bytes())?;

    let blob = EncryptedBlob::Password {
        salt: salt.to_vec(),
        iv: sealed.iv.to_vec(),
        tag: sealed.tag.to_vec(),
        ciphertext: sealed.ciphertext,
    };

    Ok(blob.to_string())
}

/// Decrypt a password-format blob. Legacy or malformed input yields `None`.
pub fn decrypt_with_password(raw: &str, password: &str, user_id: &str) -> Option<Zeroizing<String>> {
    match EncryptedBlob::parse(raw)? {
        EncryptedBlob::Password { salt, iv, tag, ciphertext } => {
            let key = derive_key(password, user_id, &salt);
            let cipher = gcm_from_key(key.as_ref()).ok()?;
            open(&cipher, &iv, &tag, &ciphertext)
        }
        EncryptedBlob::Legacy { .. } => None,
    }
}

/// Read-only access to secrets written under the old server-wide key.
///
/// AES-256-CBC has no integrity tag; this type deliberately offers no
/// encryption method so nothing new is ever written in this format.
pub struct LegacyCipher {
    key: Zeroizing<[u8; KEY_LEN]>,
}

impl LegacyCipher {
    pub fn new(key: &[u8]) -> Result<Self> {
        if key.len() != KEY_LEN {
            return Err(AppError::Encryption("Legacy encryption key must be 32 bytes".to_string()));
        }

        let mut buf = Zeroizing::new([0u8; KEY_LEN]);
        buf.copy_from_slice(key);
        Ok(Self { key: buf })
    }

    fn decrypt(&self, iv: &[u8], ciphertext: &[u8]) -> Option<Zeroizing<String>> {
        let decryptor = Aes256CbcDec::new_from_slices(self.key.as_ref(), iv).ok()?;
        let plaintext = Zeroizing::new(decryptor.decrypt_padded_vec_mut::<Pkcs7>(ciphertext).ok()?);
        let text = std::str::from_utf8(plaintext.as_slice()).ok()?;
        Some(Zeroizing::new(text.to_string()))
    }
}
