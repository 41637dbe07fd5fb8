pub mod evm;
pub mod solana;

use crate::enums::Chain;
use crate::error::Result;

/// Derive the public address controlled by a secret on the given chain.
pub fn derive_address(chain: Chain, secret: &str) -> Result<String> {
    if chain.is_evm() { evm::wallet::derive_address(secret) } else { solana::wallet::derive_address(secret) }
}

pub fn validate_address(chain: Chain, address: &str) -> bool {
    if chain.is_evm() {
        evm::wallet::validate_address(address)
    } else {
        solana::wallet::validate_address(address)
    }
}

/// EVM addresses are case-insensitive (checksum casing); Solana's base58 is not.
pub fn addresses_match(chain: Chain, a: &str, b: &str) -> bool {
    if chain.is_evm() { a.eq_ignore_ascii_case(b) } else { a == b }
}

/// Canonical stored form of an address: lower case on EVM chains, unchanged on Solana.
pub fn normalize_address(chain: Chain, address: &str) -> String {
    let address = address.trim();
    if chain.is_evm() { address.to_ascii_lowercase() } else { address.to_string() }
}
