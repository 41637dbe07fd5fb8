use ethers::core::types::H160;
use ethers::signers::{ LocalWallet, Signer };
use zeroize::Zeroizing;

use crate::error::{ AppError, Result };

/// Public address for a hex private key, with or without `0x`.
pub fn derive_address(private_key: &str) -> Result<String> {
    let private_key = Zeroizing::new(private_key.trim().trim_start_matches("0x").to_string());

    let wallet: LocalWallet = private_key.parse().map_err(|_| AppError::InvalidPrivateKey)?;

    Ok(format!("{:?}", wallet.address()))
}

pub fn validate_address(address: &str) -> bool {
    address.parse::<H160>().is_ok()
}
