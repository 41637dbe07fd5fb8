mod blob;
mod encryption;
mod kdf;

pub use blob::{ decrypt_with_password, encrypt_with_password, EncryptedBlob, LegacyCipher };
pub use encryption::SessionCipher;
pub use kdf::{ derive_key, hash_password, verify_password, PBKDF2_ITERATIONS };

#[cfg(test)]
pub(crate) use blob::test_support::legacy_encrypt;
