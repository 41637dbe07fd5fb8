use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// PBKDF2-HMAC-SHA256 rounds for every password-derived key.
pub const PBKDF2_ITERATIONS: u32 = 310_000;

/// AES-256 key length.
pub const KEY_LEN: usize = 32;

/// Length of the random salt used for both password hashes and encrypted blobs.
pub const SALT_LEN: usize = 32;

/// Derive a symmetric key from a user's password.
///
/// The user id is mixed into the PBKDF2 input so identical passwords held by
/// different users never produce the same key, even with a reused salt.
pub fn derive_key(password: &str, user_id: &str, salt: &[u8]) -> Zeroizing<[u8; KEY_LEN]> {
    let material = Zeroizing::new(format!("{}:{}", user_id, password));
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2_hmac::<Sha256>(material.as_bytes(), salt, PBKDF2_ITERATIONS, key.as_mut());
    key
}

pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut out = [0u8; N];
    rand::rng().fill_bytes(&mut out);
    out
}

/// Hash a password for storage as `saltHex:hashHex`.
pub fn hash_password(password: &str, user_id: &str) -> String {
    let salt = random_bytes::<SALT_LEN>();
    let hash = derive_key(password, user_id, &salt);
    format!("{}:{}", hex::encode(salt), hex::encode(hash.as_ref()))
}

/// Check a password against a stored `saltHex:hashHex` value.
///
/// Malformed stored values never verify.
pub fn verify_password(password: &str, user_id: &str, stored: &str) -> bool {
    let mut parts = stored.split(':');
    let (Some(salt_hex), Some(hash_hex), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };

    let (Ok(salt), Ok(expected)) = (hex::decode(salt_hex), hex::decode(hash_hex)) else {
        return false;
    };

    if salt.is_empty() || expected.len() != KEY_LEN {
        return false;
    }

    let derived = derive_key(password, user_id, &salt);
    derived.as_ref().ct_eq(expected.as_slice()).into()
}
