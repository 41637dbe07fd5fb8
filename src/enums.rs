use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

// ─── Chain ───────────────────────────────────────────────────────────

/// Supported blockchain networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Chain {
    Solana,
    Eth,
    Bsc,
    Base,
}

impl Chain {
    /// Canonical string stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Solana => "SOLANA",
            Chain::Eth => "ETH",
            Chain::Bsc => "BSC",
            Chain::Base => "BASE",
        }
    }

    /// Native token symbol for the chain.
    pub fn native_symbol(&self) -> &'static str {
        match self {
            Chain::Solana => "SOL",
            Chain::Eth => "ETH",
            Chain::Bsc => "BNB",
            Chain::Base => "ETH",
        }
    }

    /// Chain identifier used by the DexScreener API.
    pub fn dexscreener_id(&self) -> &'static str {
        match self {
            Chain::Solana => "solana",
            Chain::Eth => "ethereum",
            Chain::Bsc => "bsc",
            Chain::Base => "base",
        }
    }

    /// Whether this chain uses the EVM (Ethereum Virtual Machine).
    pub fn is_evm(&self) -> bool {
        !matches!(self, Chain::Solana)
    }

    /// Human-readable display name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Chain::Solana => "Solana",
            Chain::Eth => "Ethereum",
            Chain::Bsc => "BSC",
            Chain::Base => "Base",
        }
    }

    pub fn all() -> &'static [Chain] {
        &[Chain::Solana, Chain::Eth, Chain::Bsc, Chain::Base]
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SOLANA" | "SOL" => Ok(Chain::Solana),
            "ETH" | "ETHEREUM" => Ok(Chain::Eth),
            "BSC" | "BNB" => Ok(Chain::Bsc),
            "BASE" => Ok(Chain::Base),
            _ => Err(AppError::InvalidInput(format!(
                "Unsupported chain: {}. Supported: SOLANA, ETH, BSC, BASE",
                s
            ))),
        }
    }
}

// ─── EncryptionVersion ───────────────────────────────────────────────

/// Encryption scheme recorded next to every stored wallet secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EncryptionVersion {
    /// Single server-side key, AES-256-CBC.
    Legacy,
    /// Per-user password-derived key, AES-256-GCM.
    Password,
}

impl EncryptionVersion {
    pub fn as_i32(&self) -> i32 {
        match self {
            EncryptionVersion::Legacy => 1,
            EncryptionVersion::Password => 2,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(EncryptionVersion::Legacy),
            2 => Some(EncryptionVersion::Password),
            _ => None,
        }
    }
}

// ─── OrderSide ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderSide {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buy" => Ok(OrderSide::Buy),
            "sell" => Ok(OrderSide::Sell),
            _ => Err(AppError::InvalidInput(format!("Invalid order side: {}", s))),
        }
    }
}

// ─── TriggerType ─────────────────────────────────────────────────────

/// Which observed market value a trigger order watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerType {
    Price,
    MarketCap,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::Price => "price",
            TriggerType::MarketCap => "marketcap",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "price" => Ok(TriggerType::Price),
            "marketcap" | "market_cap" | "mcap" => Ok(TriggerType::MarketCap),
            _ => Err(AppError::InvalidInput(format!(
                "Invalid trigger type: {}. Supported: price, marketcap",
                s
            ))),
        }
    }
}

// ─── TriggerCondition ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerCondition {
    Above,
    Below,
}

impl TriggerCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerCondition::Above => "above",
            TriggerCondition::Below => "below",
        }
    }

    /// Inclusive comparison of an observed value against the target.
    pub fn is_met(&self, observed: f64, target: f64) -> bool {
        match self {
            TriggerCondition::Above => observed >= target,
            TriggerCondition::Below => observed <= target,
        }
    }
}

impl fmt::Display for TriggerCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerCondition {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "above" => Ok(TriggerCondition::Above),
            "below" => Ok(TriggerCondition::Below),
            _ => Err(AppError::InvalidInput(format!(
                "Invalid trigger condition: {}. Supported: above, below",
                s
            ))),
        }
    }
}

// ─── AmountType ──────────────────────────────────────────────────────

/// How the `amount` of a trigger order is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmountType {
    /// Fixed amount of the chain's native currency.
    Fixed,
    /// Percentage of token holdings, resolved at execution time.
    Percentage,
}

impl AmountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AmountType::Fixed => "fixed",
            AmountType::Percentage => "percentage",
        }
    }
}

impl fmt::Display for AmountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AmountType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fixed" => Ok(AmountType::Fixed),
            "percentage" | "percent" => Ok(AmountType::Percentage),
            _ => Err(AppError::InvalidInput(format!("Invalid amount type: {}", s))),
        }
    }
}

// ─── OrderStatus ─────────────────────────────────────────────────────

/// Lifecycle of a trigger order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Active,
    Triggered,
    Executed,
    Failed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Active => "active",
            OrderStatus::Triggered => "triggered",
            OrderStatus::Executed => "executed",
            OrderStatus::Failed => "failed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Executed | OrderStatus::Failed | OrderStatus::Cancelled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(OrderStatus::Active),
            "triggered" => Ok(OrderStatus::Triggered),
            "executed" => Ok(OrderStatus::Executed),
            "failed" => Ok(OrderStatus::Failed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            _ => Err(AppError::InvalidInput(format!("Invalid order status: {}", s))),
        }
    }
}
