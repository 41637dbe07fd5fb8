use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use zeroize::Zeroizing;

use crate::enums::Chain;
use crate::error::{ AppError, Result };

const DEFAULT_DEXSCREENER_API_URL: &str = "https://api.dexscreener.com";
const DEFAULT_JUPITER_API_URL: &str = "https://lite-api.jup.ag/swap/v1";
const DEFAULT_SOLANA_RPC_URL: &str = "https://api.mainnet-beta.solana.com";

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub legacy_encryption_key: Zeroizing<Vec<u8>>,
    pub telegram_bot_token: String,
    pub server_host: String,
    pub server_port: u16,
    pub session_timeout: Duration,
    pub session_sweep_interval: Duration,
    pub trigger_poll_interval: Duration,
    pub trigger_poll_jitter: Duration,
    pub price_fetch_delay: Duration,
    pub external_call_timeout: Duration,
    /// How long a submitted transaction may wait for confirmation.
    pub swap_confirm_timeout: Duration,
    /// Bound on a whole swap, submission and confirmation included.
    pub swap_timeout: Duration,
    pub dexscreener_api_url: String,
    pub jupiter_api_url: String,
    pub solana_rpc_url: String,
    /// RPC endpoints for EVM chains; trading is enabled only where one is set.
    pub evm_rpc_urls: HashMap<Chain, String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let database_url = required("DATABASE_URL")?;

        let legacy_encryption_key = Zeroizing::new(
            hex
                ::decode(required("LEGACY_ENCRYPTION_KEY")?)
                .map_err(|_| AppError::Config("LEGACY_ENCRYPTION_KEY must be a valid hex string".to_string()))?
        );

        if legacy_encryption_key.len() != 32 {
            return Err(
                AppError::Config("LEGACY_ENCRYPTION_KEY must be 32 bytes (64 hex characters)".to_string())
            );
        }

        let telegram_bot_token = required("TELEGRAM_BOT_TOKEN")?;

        let mut evm_rpc_urls = HashMap::new();
        for &chain in Chain::all().iter().filter(|c| c.is_evm()) {
            if let Some(url) = optional(&format!("{}_RPC_URL", chain.as_str())) {
                evm_rpc_urls.insert(chain, url);
            }
        }

        let config = Config {
            database_url,
            legacy_encryption_key,
            telegram_bot_token,
            server_host: optional("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            server_port: parsed("SERVER_PORT", 8080)?,
            session_timeout: Duration::from_secs(parsed("SESSION_TIMEOUT_SECS", 1800)?),
            session_sweep_interval: Duration::from_secs(parsed("SESSION_SWEEP_INTERVAL_SECS", 60)?),
            trigger_poll_interval: Duration::from_secs(parsed("TRIGGER_POLL_INTERVAL_SECS", 30)?),
            trigger_poll_jitter: Duration::from_secs(parsed("TRIGGER_POLL_JITTER_SECS", 10)?),
            price_fetch_delay: Duration::from_millis(parsed("PRICE_FETCH_DELAY_MS", 250)?),
            external_call_timeout: Duration::from_secs(parsed("EXTERNAL_CALL_TIMEOUT_SECS", 30)?),
            swap_confirm_timeout: Duration::from_secs(parsed("SWAP_CONFIRM_TIMEOUT_SECS", 60)?),
            swap_timeout: Duration::from_secs(parsed("SWAP_TIMEOUT_SECS", 240)?),
            dexscreener_api_url: optional("DEXSCREENER_API_URL").unwrap_or_else(||
                DEFAULT_DEXSCREENER_API_URL.to_string()
            ),
            jupiter_api_url: optional("JUPITER_API_URL").unwrap_or_else(|| DEFAULT_JUPITER_API_URL.to_string()),
            solana_rpc_url: optional("SOLANA_RPC_URL").unwrap_or_else(|| DEFAULT_SOLANA_RPC_URL.to_string()),
            evm_rpc_urls,
        };

        config.validate()?;
        Ok(config)
    }

    /// Checks the durations are usable together.
    ///
    /// A swap makes up to three plain requests before anything is signed
    /// (quote, transaction build, submission), each bounded by
    /// `external_call_timeout`, and then waits for at most two confirmations
    /// (an ERC-20 approval and the swap itself), each bounded by
    /// `swap_confirm_timeout`. `swap_timeout` wraps the whole swap, so it must
    /// cover that worst case: otherwise the scheduler could mark an order
    /// failed while its transaction is still confirming.
    fn validate(&self) -> Result<()> {
        let positive = [
            ("SESSION_TIMEOUT_SECS", self.session_timeout),
            ("SESSION_SWEEP_INTERVAL_SECS", self.session_sweep_interval),
            ("TRIGGER_POLL_INTERVAL_SECS", self.trigger_poll_interval),
            ("EXTERNAL_CALL_TIMEOUT_SECS", self.external_call_timeout),
            ("SWAP_CONFIRM_TIMEOUT_SECS", self.swap_confirm_timeout),
        ];

        for (name, value) in positive {
            if value.is_zero() {
                return Err(AppError::Config(format!("{} must be greater than zero", name)));
            }
        }

        let worst_case = self.swap_confirm_timeout * 2 + self.external_call_timeout * 3;
        if self.swap_timeout < worst_case {
            return Err(
                AppError::Config(
                    format!(
                        "SWAP_TIMEOUT_SECS must be at least {}s (2 x SWAP_CONFIRM_TIMEOUT_SECS + 3 x EXTERNAL_CALL_TIMEOUT_SECS)",
                        worst_case.as_secs()
                    )
                )
            );
        }
        Ok(())
    }

    /// Session lifetime as a chrono duration, for timestamp arithmetic.
    pub fn session_timeout_chrono(&self) -> Result<chrono::Duration> {
        chrono::Duration
            ::from_std(self.session_timeout)
            .map_err(|_| AppError::Config("SESSION_TIMEOUT_SECS is out of range".to_string()))
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &self.database_url)
            .field("legacy_encryption_key", &"[REDACTED]")
            .field("telegram_bot_token", &"[REDACTED]")
            .field("server_host", &self.server_host)
            .field("server_port", &self.server_port)
            .field("session_timeout", &self.session_timeout)
            .field("session_sweep_interval", &self.session_sweep_interval)
            .field("trigger_poll_interval", &self.trigger_poll_interval)
            .field("trigger_poll_jitter", &self.trigger_poll_jitter)
            .field("price_fetch_delay", &self.price_fetch_delay)
            .field("external_call_timeout", &self.external_call_timeout)
            .field("swap_confirm_timeout", &self.swap_confirm_timeout)
            .field("swap_timeout", &self.swap_timeout)
            .field("dexscreener_api_url", &self.dexscreener_api_url)
            .field("jupiter_api_url", &self.jupiter_api_url)
            .field("solana_rpc_url", &self.solana_rpc_url)
            .field("evm_rpc_urls", &self.evm_rpc_urls)
            .finish()
    }
}

fn required(key: &str) -> Result<String> {
    optional(key).ok_or_else(|| AppError::Config(format!("{} must be set", key)))
}

fn optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed<T: FromStr>(key: &str, default: T) -> Result<T> {
    match optional(key) {
        Some(raw) => raw.parse().map_err(|_| AppError::Config(format!("{} has an invalid value: {}", key, raw))),
        None => Ok(default),
    }
}
