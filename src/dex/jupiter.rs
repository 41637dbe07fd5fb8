use std::time::Duration;

use async_trait::async_trait;
use base64::{ engine::general_purpose::STANDARD, Engine };
use serde::{ Deserialize, Serialize };
use serde_json::json;
use solana_sdk::signer::Signer;
use tracing::{ debug, info };

use super::{ percentage_of, to_base_units, SwapExecutor, SwapResult };
use crate::chains::solana::wallet::keypair_from_secret;
use crate::enums::Chain;
use crate::error::{ AppError, Result };

const WRAPPED_SOL_MINT: &str = "So11111111111111111111111111111111111111112";
const SOL_DECIMALS: u32 = 9;
const SIGNATURE_LEN: usize = 64;
const CONFIRMATION_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JupiterSwapRequest<'a> {
    quote_response: &'a serde_json::Value,
    user_public_key: String,
    wrap_and_unwrap_sol: bool,
    dynamic_compute_unit_limit: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JupiterSwapResponse {
    swap_transaction: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    message: String,
}

/// Solana swaps routed through the Jupiter aggregator.
///
/// Jupiter builds the transaction; it is signed locally and submitted
/// straight to the configured RPC node.
pub struct JupiterSwapExecutor {
    api_url: String,
    rpc_url: String,
    client: reqwest::Client,
    confirm_timeout: Duration,
}

impl JupiterSwapExecutor {
    /// `timeout` bounds each HTTP request; `confirm_timeout` bounds the
    /// whole wait for a submitted transaction to confirm.
    pub fn new(
        api_url: impl Into<String>,
        rpc_url: impl Into<String>,
        timeout: Duration,
        confirm_timeout: Duration
    ) -> Result<Self> {
        let client = reqwest::Client
            ::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            rpc_url: rpc_url.into(),
            client,
            confirm_timeout,
        })
    }

    async fn swap(&self, secret: &str, input_mint: &str, output_mint: &str, amount: u128, slippage_bps: u32) -> Result<SwapResult> {
        let keypair = keypair_from_secret(secret)?;

        let quote = self.get_quote(input_mint, output_mint, amount, slippage_bps).await?;

        let request = JupiterSwapRequest {
            quote_response: &quote,
            user_public_key: keypair.pubkey().to_string(),
            wrap_and_unwrap_sol: true,
            dynamic_compute_unit_limit: true,
        };

        let response = self.client
            .post(format!("{}/swap", self.api_url))
            .json(&request)
            .send().await
            .map_err(|e| AppError::External(format!("Jupiter swap API error: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::External(format!("Jupiter swap API returned status: {}", response.status())));
        }

        let swap: JupiterSwapResponse = response
            .json().await
            .map_err(|e| AppError::External(format!("Failed to parse swap response: {}", e)))?;

        let unsigned = STANDARD.decode(&swap.swap_transaction).map_err(|e|
            AppError::External(format!("Invalid swap transaction encoding: {}", e))
        )?;

        let signed = sign_transaction(&unsigned, |message| {
            keypair.sign_message(message).as_ref().to_vec()
        })?;

        let signature = self.send_transaction(&STANDARD.encode(signed)).await?;
        info!(%signature, input_mint, output_mint, "Swap submitted");

        self.confirm(&signature).await?;

        Ok(SwapResult {
            tx_hash: signature,
            amount_in: amount.to_string(),
        })
    }

    async fn get_quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: u128,
        slippage_bps: u32
    ) -> Result<serde_json::Value> {
        let url = format!(
            "{}/quote?inputMint={}&outputMint={}&amount={}&slippageBps={}",
            self.api_url,
            input_mint,
            output_mint,
            amount,
            slippage_bps
        );

        let response = self.client
            .get(&url)
            .send().await
            .map_err(|e| AppError::External(format!("Jupiter API error: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::External(format!("Jupiter quote failed ({}): {}", status, body)));
        }

        let quote: serde_json::Value = response
            .json().await
            .map_err(|e| AppError::External(format!("Failed to parse Jupiter response: {}", e)))?;

        debug!(out_amount = %quote["outAmount"], "Jupiter quote received");
        Ok(quote)
    }

    async fn rpc<T: serde::de::DeserializeOwned>(&self, method: &str, params: serde_json::Value) -> Result<T> {
        let body = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });

        let response: RpcResponse<T> = self.client
            .post(&self.rpc_url)
            .json(&body)
            .send().await
            .map_err(|e| AppError::External(format!("Solana RPC error: {}", e)))?
            .json().await
            .map_err(|e| AppError::External(format!("Failed to parse RPC response: {}", e)))?;

        if let Some(error) = response.error {
            return Err(AppError::External(format!("{} failed: {}", method, error.message)));
        }
        response.result.ok_or_else(|| AppError::External(format!("{} returned no result", method)))
    }

    async fn send_transaction(&self, encoded: &str) -> Result<String> {
        self.rpc(
            "sendTransaction",
            json!([encoded, { "encoding": "base64", "skipPreflight": false, "maxRetries": 3 }])
        ).await
    }

    async fn confirm(&self, signature: &str) -> Result<()> {
        tokio::time::timeout(self.confirm_timeout, self.poll_confirmation(signature)).await.map_err(|_|
            AppError::Timeout(
                format!(
                    "Transaction {} was submitted but not confirmed within {}s; check it before placing a new order",
                    signature,
                    self.confirm_timeout.as_secs()
                )
            )
        )?
    }

    async fn poll_confirmation(&self, signature: &str) -> Result<()> {
        loop {
            let statuses: serde_json::Value = self.rpc(
                "getSignatureStatuses",
                json!([[signature], { "searchTransactionHistory": false }])
            ).await?;

            let status = &statuses["value"][0];
            if !status.is_null() {
                if !status["err"].is_null() {
                    return Err(AppError::External(format!("Transaction failed on-chain: {}", status["err"])));
                }
                if matches!(status["confirmationStatus"].as_str(), Some("confirmed" | "finalized")) {
                    return Ok(());
                }
            }

            tokio::time::sleep(CONFIRMATION_POLL_INTERVAL).await;
        }
    }

    /// Raw token balance the owner holds for `mint`, summed over its accounts.
    async fn token_balance(&self, owner: &str, mint: &str) -> Result<u128> {
        let accounts: serde_json::Value = self.rpc(
            "getTokenAccountsByOwner",
            json!([owner, { "mint": mint }, { "encoding": "jsonParsed" }])
        ).await?;

        parse_token_balance(&accounts)
    }
}

#[async_trait]
impl SwapExecutor for JupiterSwapExecutor {
    async fn buy(
        &self,
        secret: &str,
        chain: Chain,
        token_address: &str,
        native_amount: f64,
        slippage_bps: u32
    ) -> Result<SwapResult> {
        ensure_solana(chain)?;
        let lamports = to_base_units(native_amount, SOL_DECIMALS)?;
        self.swap(secret, WRAPPED_SOL_MINT, token_address, lamports, slippage_bps).await
    }

    async fn sell_percentage(
        &self,
        secret: &str,
        chain: Chain,
        token_address: &str,
        percent: f64,
        slippage_bps: u32
    ) -> Result<SwapResult> {
        ensure_solana(chain)?;
        let owner = keypair_from_secret(secret)?.pubkey().to_string();

        let balance = self.token_balance(&owner, token_address).await?;
        let amount = percentage_of(balance, percent)?;

        self.swap(secret, token_address, WRAPPED_SOL_MINT, amount, slippage_bps).await
    }
}

fn ensure_solana(chain: Chain) -> Result<()> {
    if chain != Chain::Solana {
        return Err(AppError::InvalidInput(format!("Jupiter cannot trade on {}", chain)));
    }
    Ok(())
}

fn parse_token_balance(accounts: &serde_json::Value) -> Result<u128> {
    let entries = accounts["value"]
        .as_array()
        .ok_or_else(|| AppError::External("Unexpected token account response".to_string()))?;

    let mut total: u128 = 0;
    for entry in entries {
        let raw = entry["account"]["data"]["parsed"]["info"]["tokenAmount"]["amount"]
            .as_str()
            .and_then(|s| s.parse::<u128>().ok())
            .ok_or_else(|| AppError::External("Unexpected token account layout".to_string()))?;
        total = total.saturating_add(raw);
    }
    Ok(total)
}

/// Decode a compact-u16 length prefix. Returns (value, bytes consumed).
fn decode_short_vec(bytes: &[u8]) -> Option<(usize, usize)> {
    let mut value = 0usize;
    for (i, byte) in bytes.iter().take(3).enumerate() {
        value |= ((byte & 0x7f) as usize) << (7 * i);
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    None
}

/// Put the fee payer's signature into a serialized transaction.
///
/// Layout: short-vec signature count, 64-byte signatures, message.
fn sign_transaction<F>(transaction: &[u8], sign: F) -> Result<Vec<u8>> where F: FnOnce(&[u8]) -> Vec<u8> {
    let malformed = || AppError::External("Malformed swap transaction".to_string());

    let (count, prefix) = decode_short_vec(transaction).ok_or_else(malformed)?;
    if count == 0 {
        return Err(malformed());
    }

    let message_start = prefix + count * SIGNATURE_LEN;
    if transaction.len() <= message_start {
        return Err(malformed());
    }

    let signature = sign(&transaction[message_start..]);
    if signature.len() != SIGNATURE_LEN {
        return Err(malformed());
    }

    let mut signed = transaction.to_vec();
    signed[prefix..prefix + SIGNATURE_LEN].copy_from_slice(&signature);
    Ok(signed)
}
