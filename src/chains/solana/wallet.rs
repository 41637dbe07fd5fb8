use solana_keypair::Keypair;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signer::Signer;
use zeroize::Zeroizing;

use crate::error::{ AppError, Result };

/// Parse a base58-encoded 64-byte keypair.
pub fn keypair_from_secret(secret: &str) -> Result<Keypair> {
    let keypair_bytes = Zeroizing::new(
        bs58::decode(secret.trim()).into_vec().map_err(|_| AppError::InvalidPrivateKey)?
    );

    Keypair::try_from(keypair_bytes.as_slice()).map_err(|_| AppError::InvalidPrivateKey)
}

/// Public address for a base58 keypair secret.
pub fn derive_address(secret: &str) -> Result<String> {
    Ok(keypair_from_secret(secret)?.pubkey().to_string())
}

pub fn validate_address(address: &str) -> bool {
    address.parse::<Pubkey>().is_ok()
}
