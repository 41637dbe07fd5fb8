use std::sync::Arc;
use std::time::{ Duration, SystemTime, UNIX_EPOCH };

use async_trait::async_trait;
use ethers::prelude::*;
use tracing::{ debug, info };

use super::{ minimum_output, percentage_of, to_base_units, SwapExecutor, SwapResult };
use crate::enums::Chain;
use crate::error::{ AppError, Result };

abigen!(
    IUniswapV2Router,
    r#"[
        function WETH() external pure returns (address)
        function getAmountsOut(uint amountIn, address[] memory path) external view returns (uint[] memory amounts)
        function swapExactETHForTokensSupportingFeeOnTransferTokens(uint amountOutMin, address[] calldata path, address to, uint deadline) external payable
        function swapExactTokensForETHSupportingFeeOnTransferTokens(uint amountIn, uint amountOutMin, address[] calldata path, address to, uint deadline) external
    ]"#
);

abigen!(
    IERC20,
    r#"[
        function approve(address spender, uint256 amount) external returns (bool)
        function allowance(address owner, address spender) external view returns (uint256)
        function balanceOf(address owner) external view returns (uint256)
    ]"#
);

const NATIVE_DECIMALS: u32 = 18;
const DEADLINE_SECS: u64 = 300;

/// V2 router address and chain id for each EVM chain we trade on.
fn router_for(chain: Chain) -> Option<(&'static str, u64)> {
    match chain {
        Chain::Eth => Some(("0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D", 1)),
        // PancakeSwap V2
        Chain::Bsc => Some(("0x10ED43C718714eb63d5aA57B78B54704E256024E", 56)),
        Chain::Base => Some(("0x4752ba5DBc23f44D87826276BF6Fd6b1C372aD24", 8453)),
        Chain::Solana => None,
    }
}

type Client = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Uniswap-V2-style router swaps against the chain's wrapped native token.
pub struct UniswapV2SwapExecutor {
    chain: Chain,
    chain_id: u64,
    router_address: Address,
    provider: Provider<Http>,
    confirm_timeout: Duration,
}

impl UniswapV2SwapExecutor {
    pub fn new(chain: Chain, rpc_url: &str, confirm_timeout: Duration) -> Result<Self> {
        let (router, chain_id) = router_for(chain).ok_or_else(||
            AppError::InvalidInput(format!("Unsupported chain for Uniswap V2: {}", chain))
        )?;

        let router_address = router
            .parse()
            .map_err(|e| AppError::Internal(format!("Invalid router address: {}", e)))?;

        let provider = Provider::<Http>
            ::try_from(rpc_url)
            .map_err(|e| AppError::Config(format!("Invalid {} RPC URL: {}", chain, e)))?;

        Ok(Self {
            chain,
            chain_id,
            router_address,
            provider,
            confirm_timeout,
        })
    }

    /// Wait for a submitted transaction, at most `confirm_timeout`.
    async fn wait_for_receipt(&self, pending: PendingTransaction<'_, Http>) -> Result<String> {
        let submitted = pending.tx_hash();
        match tokio::time::timeout(self.confirm_timeout, pending).await {
            Ok(Ok(receipt)) => receipt_hash(receipt),
            Ok(Err(e)) => Err(AppError::External(format!("Transaction failed: {}", e))),
            Err(_) =>
                Err(
                    AppError::Timeout(
                        format!(
                            "Transaction {:?} was submitted but not confirmed within {}s; check it before placing a new order",
                            submitted,
                            self.confirm_timeout.as_secs()
                        )
                    )
                ),
        }
    }

    fn client(&self, secret: &str) -> Result<Arc<Client>> {
        let wallet: LocalWallet = secret
            .trim()
            .trim_start_matches("0x")
            .parse()
            .map_err(|_| AppError::InvalidPrivateKey)?;

        Ok(Arc::new(SignerMiddleware::new(self.provider.clone(), wallet.with_chain_id(self.chain_id))))
    }

    fn ensure_chain(&self, chain: Chain) -> Result<()> {
        if chain != self.chain {
            return Err(
                AppError::InvalidInput(format!("{} executor cannot trade on {}", self.chain, chain))
            );
        }
        Ok(())
    }

    async fn expected_out(&self, router: &IUniswapV2Router<Client>, amount_in: U256, path: Vec<Address>) -> Result<U256> {
        let amounts = router
            .get_amounts_out(amount_in, path)
            .call().await
            .map_err(|e| AppError::External(format!("Failed to get quote: {}", e)))?;

        amounts.last().copied().ok_or_else(|| AppError::External("Router returned no output amount".to_string()))
    }
}

fn parse_token(token_address: &str) -> Result<Address> {
    token_address.parse().map_err(|_| AppError::InvalidAddress)
}

fn deadline() -> Result<U256> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(U256::from(now.as_secs() + DEADLINE_SECS))
}

fn min_out(expected: U256, slippage_bps: u32) -> U256 {
    let expected = if expected > U256::from(u128::MAX) { u128::MAX } else { expected.as_u128() };
    U256::from(minimum_output(expected, slippage_bps))
}

fn receipt_hash(receipt: Option<TransactionReceipt>) -> Result<String> {
    let receipt = receipt.ok_or_else(|| AppError::External("Transaction dropped before confirmation".to_string()))?;

    if receipt.status == Some(U64::zero()) {
        return Err(AppError::External(format!("Swap reverted: {:?}", receipt.transaction_hash)));
    }
    Ok(format!("{:?}", receipt.transaction_hash))
}

#[async_trait]
impl SwapExecutor for UniswapV2SwapExecutor {
    async fn buy(
        &self,
        secret: &str,
        chain: Chain,
        token_address: &str,
        native_amount: f64,
        slippage_bps: u32
    ) -> Result<SwapResult> {
        self.ensure_chain(chain)?;
        let token = parse_token(token_address)?;
        let client = self.client(secret)?;
        let router = IUniswapV2Router::new(self.router_address, client.clone());

        let weth = router
            .weth()
            .call().await
            .map_err(|e| AppError::External(format!("Failed to read wrapped native token: {}", e)))?;

        let amount_in = U256::from(to_base_units(native_amount, NATIVE_DECIMALS)?);
        let path = vec![weth, token];
        let expected = self.expected_out(&router, amount_in, path.clone()).await?;
        debug!(chain = %self.chain, %amount_in, %expected, "Buy quote");

        let call = router
            .swap_exact_eth_for_tokens_supporting_fee_on_transfer_tokens(
                min_out(expected, slippage_bps),
                path,
                client.address(),
                deadline()?
            )
            .value(amount_in);

        let pending = call.send().await.map_err(|e| AppError::External(format!("Swap failed: {}", e)))?;
        let tx_hash = self.wait_for_receipt(pending).await?;
        info!(chain = %self.chain, %tx_hash, "Buy executed");

        Ok(SwapResult {
            tx_hash,
            amount_in: amount_in.to_string(),
        })
    }

    async fn sell_percentage(
        &self,
        secret: &str,
        chain: Chain,
        token_address: &str,
        percent: f64,
        slippage_bps: u32
    ) -> Result<SwapResult> {
        self.ensure_chain(chain)?;
        let token_address = parse_token(token_address)?;
        let client = self.client(secret)?;
        let owner = client.address();

        let token = IERC20::new(token_address, client.clone());
        let balance = token
            .balance_of(owner)
            .call().await
            .map_err(|e| AppError::External(format!("Failed to read token balance: {}", e)))?;

        let balance = if balance > U256::from(u128::MAX) { u128::MAX } else { balance.as_u128() };
        let amount_in = U256::from(percentage_of(balance, percent)?);

        let allowance = token
            .allowance(owner, self.router_address)
            .call().await
            .map_err(|e| AppError::External(format!("Failed to check allowance: {}", e)))?;

        if allowance < amount_in {
            let approve = token.approve(self.router_address, U256::MAX);
            let pending = approve
                .send().await
                .map_err(|e| AppError::External(format!("Failed to approve: {}", e)))?;
            self.wait_for_receipt(pending).await?;
        }

        let router = IUniswapV2Router::new(self.router_address, client.clone());
        let weth = router
            .weth()
            .call().await
            .map_err(|e| AppError::External(format!("Failed to read wrapped native token: {}", e)))?;

        let path = vec![token_address, weth];
        let expected = self.expected_out(&router, amount_in, path.clone()).await?;
        debug!(chain = %self.chain, %amount_in, %expected, "Sell quote");

        let call = router.swap_exact_tokens_for_eth_supporting_fee_on_transfer_tokens(
            amount_in,
            min_out(expected, slippage_bps),
            path,
            owner,
            deadline()?
        );

        let pending = call.send().await.map_err(|e| AppError::External(format!("Swap failed: {}", e)))?;
        let tx_hash = self.wait_for_receipt(pending).await?;
        info!(chain = %self.chain, %tx_hash, "Sell executed");

        Ok(SwapResult {
            tx_hash,
            amount_in: amount_in.to_string(),
        })
    }
}
