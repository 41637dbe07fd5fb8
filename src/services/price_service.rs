use std::time::Duration;

use async_trait::async_trait;
use serde::{ Deserialize, Serialize };
use tracing::debug;

use crate::enums::Chain;
use crate::error::{ AppError, Result };

const MAX_RETRIES: u32 = 3;

/// Price and market cap of one token, both in USD.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TokenMarketData {
    pub price_usd: f64,
    pub market_cap_usd: Option<f64>,
}

impl TokenMarketData {
    /// Drops readings nothing can be compared against or stored: a
    /// non-finite price makes the whole reading a miss, a non-finite
    /// market cap is treated as unknown.
    pub fn finite(self) -> Option<Self> {
        if !self.price_usd.is_finite() {
            return None;
        }
        Some(Self {
            price_usd: self.price_usd,
            market_cap_usd: self.market_cap_usd.filter(|cap| cap.is_finite()),
        })
    }
}

/// Source of current token prices.
///
/// `Ok(None)` means the provider does not know the token; `Err` is a
/// transient failure. Callers treat both as a miss.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn get_price(&self, chain: Chain, token_address: &str) -> Result<Option<TokenMarketData>>;
}

#[derive(Debug, Deserialize)]
struct DexScreenerTokenResponse {
    #[serde(default)]
    pairs: Option<Vec<DexScreenerPair>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DexScreenerPair {
    chain_id: String,
    base_token: DexScreenerToken,
    price_usd: Option<String>,
    market_cap: Option<f64>,
    fdv: Option<f64>,
    liquidity: Option<DexScreenerLiquidity>,
}

#[derive(Debug, Deserialize)]
struct DexScreenerToken {
    address: String,
}

#[derive(Debug, Deserialize)]
struct DexScreenerLiquidity {
    usd: Option<f64>,
}

/// Market data from the DexScreener public API.
pub struct DexScreenerClient {
    api_url: String,
    client: reqwest::Client,
}

impl DexScreenerClient {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client
            ::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Fetch a URL with retry on 429 rate-limit responses
    async fn fetch_with_retry(&self, url: &str) -> Result<reqwest::Response> {
        let mut last_err = None;
        for attempt in 0..MAX_RETRIES {
            let response = self.client
                .get(url)
                .send().await
                .map_err(|e| AppError::External(format!("DexScreener API error: {}", e)))?;

            if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                let wait_secs = 2u64.pow(attempt + 1);
                debug!(wait_secs, "DexScreener rate limited, backing off");
                tokio::time::sleep(Duration::from_secs(wait_secs)).await;
                last_err = Some(AppError::External("DexScreener rate limited".to_string()));
                continue;
            }

            if !response.status().is_success() {
                return Err(
                    AppError::External(format!("DexScreener API returned status: {}", response.status()))
                );
            }

            return Ok(response);
        }
        Err(
            last_err.unwrap_or_else(||
                AppError::External("DexScreener request failed after retries".to_string())
            )
        )
    }
}

#[async_trait]
impl MarketDataProvider for DexScreenerClient {
    async fn get_price(&self, chain: Chain, token_address: &str) -> Result<Option<TokenMarketData>> {
        let url = format!("{}/latest/dex/tokens/{}", self.api_url, token_address);
        let response = self.fetch_with_retry(&url).await?;

        let body: DexScreenerTokenResponse = response
            .json().await
            .map_err(|e| AppError::External(format!("Failed to parse DexScreener response: {}", e)))?;

        Ok(select_market_data(body.pairs.unwrap_or_default(), chain, token_address))
    }
}

/// Pick the deepest-liquidity pair where the token is the base asset.
fn select_market_data(
    pairs: Vec<DexScreenerPair>,
    chain: Chain,
    token_address: &str
) -> Option<TokenMarketData> {
    pairs
        .into_iter()
        .filter(|p| p.chain_id == chain.dexscreener_id())
        .filter(|p| crate::chains::addresses_match(chain, &p.base_token.address, token_address))
        .filter_map(|p| {
            let price_usd = p.price_usd.as_deref()?.parse::<f64>().ok()?;
            let liquidity = p.liquidity.and_then(|l| l.usd).unwrap_or(0.0);
            let market_cap_usd = p.market_cap.or(p.fdv);
            let data = (TokenMarketData { price_usd, market_cap_usd }).finite()?;
            Some((liquidity, data))
        })
        .max_by(|(a, _), (b, _)| a.total_cmp(b))
        .map(|(_, data)| data)
}
