use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use sea_orm::prelude::Decimal;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{ debug, error, info, warn };

use crate::bot::{ messages, Notifier };
use crate::db::entity::trigger_order;
use crate::db::OrderRepository;
use crate::dex::{ SwapExecutor, SwapResult };
use crate::enums::{ Chain, OrderSide, TriggerCondition, TriggerType };
use crate::error::{ AppError, Result };
use crate::services::custody_service::CustodyService;
use crate::services::price_service::{ MarketDataProvider, TokenMarketData };

/// Safely convert a Decimal to f64, returning None on parse failure
fn decimal_to_f64(d: Decimal) -> Option<f64> {
    d.to_string().parse::<f64>().ok()
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub poll_interval: Duration,
    pub poll_jitter: Duration,
    /// Pause between consecutive price lookups within one cycle.
    pub price_fetch_delay: Duration,
    /// Upper bound for each price lookup and notification.
    pub call_timeout: Duration,
    /// Upper bound for a whole swap, confirmation waits included.
    pub swap_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Executed,
    Failed,
    /// Another evaluation pass claimed the order first.
    AlreadyClaimed,
}

/// Counters for one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub tokens: usize,
    pub prices_fetched: usize,
    pub matched: usize,
    pub executed: usize,
    pub failed: usize,
}

/// Polls market data for every token with an active order and executes
/// the orders whose trigger condition is met.
///
/// A cycle runs to completion (fetch, evaluate, execute) before the next
/// one is scheduled. Executions inside a cycle run concurrently; each
/// order is claimed with a conditional `active -> triggered` update so it
/// is executed at most once.
#[derive(Clone)]
pub struct TriggerScheduler {
    orders: Arc<OrderRepository>,
    custody: Arc<CustodyService>,
    market: Arc<dyn MarketDataProvider>,
    swaps: Arc<dyn SwapExecutor>,
    notifier: Arc<dyn Notifier>,
    settings: SchedulerSettings,
}

impl TriggerScheduler {
    pub fn new(
        orders: Arc<OrderRepository>,
        custody: Arc<CustodyService>,
        market: Arc<dyn MarketDataProvider>,
        swaps: Arc<dyn SwapExecutor>,
        notifier: Arc<dyn Notifier>,
        settings: SchedulerSettings
    ) -> Self {
        Self {
            orders,
            custody,
            market,
            swaps,
            notifier,
            settings,
        }
    }

    /// Run cycles until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.settings.poll_interval.as_secs(),
            jitter_secs = self.settings.poll_jitter.as_secs(),
            "Trigger scheduler starting"
        );

        loop {
            match self.run_cycle().await {
                Ok(report) if report.matched > 0 => info!(?report, "Poll cycle finished"),
                Ok(report) => debug!(?report, "Poll cycle finished"),
                Err(e) => error!(error = %e, "Poll cycle failed"),
            }

            let delay = self.next_delay();
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.cancelled() => {
                    info!("Trigger scheduler shutting down");
                    return;
                }
            }
        }
    }

    fn next_delay(&self) -> Duration {
        let jitter_ms = self.settings.poll_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 { 0 } else { rand::rng().random_range(0..=jitter_ms) };
        self.settings.poll_interval + Duration::from_millis(jitter)
    }

    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let pairs = self.orders.active_token_pairs().await?;
        let mut report = CycleReport {
            tokens: pairs.len(),
            ..Default::default()
        };
        if pairs.is_empty() {
            return Ok(report);
        }

        let snapshots = self.fetch_market_data(pairs).await;
        report.prices_fetched = snapshots.len();

        let mut executions = JoinSet::new();
        for order in self.orders.find_active().await? {
            let key = (order.chain.clone(), order.token_address.clone());
            let Some(snapshot) = snapshots.get(&key).copied() else {
                continue;
            };

            if evaluate(&order, &snapshot) {
                report.matched += 1;
                executions.spawn(self.clone().execute(order, snapshot));
            }
        }

        while let Some(joined) = executions.join_next().await {
            match joined {
                Ok(Ok(ExecutionOutcome::Executed)) => {
                    report.executed += 1;
                }
                Ok(Ok(ExecutionOutcome::Failed)) => {
                    report.failed += 1;
                }
                Ok(Ok(ExecutionOutcome::AlreadyClaimed)) => {}
                Ok(Err(e)) => error!(error = %e, "Order execution aborted"),
                Err(e) => error!(error = %e, "Order execution task panicked"),
            }
        }

        Ok(report)
    }

    /// One lookup per (chain, token). Misses are logged and left out.
    async fn fetch_market_data(
        &self,
        pairs: Vec<(String, String)>
    ) -> HashMap<(String, String), TokenMarketData> {
        let mut snapshots = HashMap::new();

        for (i, (chain_name, token_address)) in pairs.into_iter().enumerate() {
            if i > 0 && !self.settings.price_fetch_delay.is_zero() {
                tokio::time::sleep(self.settings.price_fetch_delay).await;
            }

            let chain = match chain_name.parse::<Chain>() {
                Ok(chain) => chain,
                Err(_) => {
                    warn!(chain = %chain_name, "Active orders reference an unknown chain");
                    continue;
                }
            };

            let lookup = self.market.get_price(chain, &token_address);
            match tokio::time::timeout(self.settings.call_timeout, lookup).await {
                Ok(Ok(Some(data))) =>
                    match data.finite() {
                        Some(data) => {
                            snapshots.insert((chain_name, token_address), data);
                        }
                        None => warn!(chain = %chain, %token_address, ?data, "Ignoring non-finite market data"),
                    }
                Ok(Ok(None)) => debug!(chain = %chain, %token_address, "No market data for token"),
                Ok(Err(e)) => warn!(chain = %chain, %token_address, error = %e, "Price fetch failed"),
                Err(_) => warn!(chain = %chain, %token_address, "Price fetch timed out"),
            }
        }

        snapshots
    }

    /// Claim, execute and settle one matched order, notifying its chat once.
    async fn execute(self, order: trigger_order::Model, snapshot: TokenMarketData) -> Result<ExecutionOutcome> {
        if !self.orders.try_mark_triggered(order.id).await? {
            debug!(order_id = %order.id, "Order already claimed");
            return Ok(ExecutionOutcome::AlreadyClaimed);
        }

        info!(
            order_id = %order.id,
            user_id = %order.user_id,
            chain = %order.chain,
            price_usd = snapshot.price_usd,
            "Order triggered"
        );

        // Once claimed, the order's chat hears about it whatever happens to
        // the bookkeeping below.
        let (outcome, message) = match self.swap(&order).await {
            Ok(swap) => {
                info!(order_id = %order.id, tx_hash = %swap.tx_hash, "Order executed");
                let settled = self.orders.mark_executed(order.id, &swap.tx_hash, snapshot.price_usd).await;
                log_settlement(&order, settled);
                (ExecutionOutcome::Executed, messages::order_executed(&order, &swap.tx_hash, snapshot.price_usd))
            }
            Err(e) => {
                let reason = e.to_string();
                warn!(order_id = %order.id, error = %reason, "Order failed");
                let settled = self.orders.mark_failed(order.id, &reason).await;
                log_settlement(&order, settled);
                (ExecutionOutcome::Failed, messages::order_failed(&order, &reason))
            }
        };

        self.notify(&order, &message).await;
        Ok(outcome)
    }

    async fn swap(&self, order: &trigger_order::Model) -> Result<SwapResult> {
        let chain = order.chain.parse::<Chain>()?;
        let side = order.side.parse::<OrderSide>()?;
        let slippage_bps = u32::try_from(order.slippage_bps).map_err(|_|
            AppError::InvalidInput(format!("Invalid slippage: {}", order.slippage_bps))
        )?;
        let amount: f64 = order.amount
            .parse()
            .map_err(|_| AppError::InvalidInput(format!("Invalid amount: {}", order.amount)))?;

        let secret = self.custody
            .get_private_key(&order.user_id, chain).await
            .ok_or(AppError::WalletLocked)?;

        let call = async {
            match side {
                OrderSide::Buy =>
                    self.swaps.buy(&secret, chain, &order.token_address, amount, slippage_bps).await,
                OrderSide::Sell =>
                    self.swaps.sell_percentage(&secret, chain, &order.token_address, amount, slippage_bps).await,
            }
        };

        tokio::time::timeout(self.settings.swap_timeout, call).await.map_err(|_|
            AppError::Timeout("Swap execution timed out".to_string())
        )?
    }

    async fn notify(&self, order: &trigger_order::Model, message: &str) {
        let send = self.notifier.notify(order.chat_id, message);
        match tokio::time::timeout(self.settings.call_timeout, send).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(order_id = %order.id, error = %e, "Notification failed"),
            Err(_) => warn!(order_id = %order.id, "Notification timed out"),
        }
    }
}

fn log_settlement(order: &trigger_order::Model, settled: Result<bool>) {
    match settled {
        Ok(true) => {}
        Ok(false) => warn!(order_id = %order.id, "Order left triggered state before settlement"),
        Err(e) => error!(order_id = %order.id, error = %e, "Failed to record order outcome"),
    }
}

/// Whether the observed market value satisfies the order's trigger.
fn evaluate(order: &trigger_order::Model, snapshot: &TokenMarketData) -> bool {
    let (Ok(trigger_type), Ok(condition)) = (
        order.trigger_type.parse::<TriggerType>(),
        order.trigger_condition.parse::<TriggerCondition>(),
    ) else {
        warn!(order_id = %order.id, "Order has an unreadable trigger");
        return false;
    };

    let observed = match trigger_type {
        TriggerType::Price => Some(snapshot.price_usd),
        TriggerType::MarketCap => snapshot.market_cap_usd,
    };

    match (observed, decimal_to_f64(order.trigger_value)) {
        (Some(observed), Some(target)) => condition.is_met(observed, target),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use solana_keypair::Keypair;
    use solana_sdk::signer::SeedDerivable;

    use super::*;
    use crate::crypto::LegacyCipher;
    use crate::db::{ NewTriggerOrder, SecurityRepository, WalletRepository };
    use crate::enums::{ AmountType, OrderStatus };
    use crate::services::order_service::test_support::FakeMarket;
    use crate::services::session_store::SessionStore;
    use crate::test_support::setup_db;

    const BONK: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";
    const WIF: &str = "EKpQGSJtjMFqKZ9KQanSqYXRcF8fBopzLHYxdM65zcjm";

    #[derive(Default)]
    struct FakeSwaps {
        calls: Mutex<Vec<(OrderSide, String, f64)>>,
        fail_with: Option<String>,
        delay: Duration,
    }

    impl FakeSwaps {
        async fn record(&self, side: OrderSide, token: &str, amount: f64) -> Result<SwapResult> {
            tokio::time::sleep(self.delay).await;
            self.calls.lock().unwrap().push((side, token.to_string(), amount));
            match &self.fail_with {
                Some(reason) => Err(AppError::External(reason.clone())),
                None => Ok(SwapResult { tx_hash: format!("tx-{}", token), amount_in: amount.to_string() }),
            }
        }
    }

    #[async_trait]
    impl SwapExecutor for FakeSwaps {
        async fn buy(&self, _: &str, _: Chain, token: &str, amount: f64, _: u32) -> Result<SwapResult> {
            self.record(OrderSide::Buy, token, amount).await
        }

        async fn sell_percentage(&self, _: &str, _: Chain, token: &str, percent: f64, _: u32) -> Result<SwapResult> {
            self.record(OrderSide::Sell, token, percent).await
        }
    }

    #[derive(Default)]
    struct FakeNotifier {
        sent: Mutex<Vec<(i64, String)>>,
        broken: bool,
    }

    #[async_trait]
    impl Notifier for FakeNotifier {
        async fn notify(&self, chat_id: i64, message: &str) -> Result<()> {
            self.sent.lock().unwrap().push((chat_id, message.to_string()));
            if self.broken {
                return Err(AppError::External("chat unreachable".to_string()));
            }
            Ok(())
        }
    }

    struct Harness {
        scheduler: TriggerScheduler,
        orders: Arc<OrderRepository>,
        custody: Arc<CustodyService>,
        market: Arc<FakeMarket>,
        swaps: Arc<FakeSwaps>,
        notifier: Arc<FakeNotifier>,
    }

    fn settings() -> SchedulerSettings {
        SchedulerSettings {
            poll_interval: Duration::from_millis(10),
            poll_jitter: Duration::from_millis(5),
            price_fetch_delay: Duration::ZERO,
            call_timeout: Duration::from_secs(5),
            swap_timeout: Duration::from_secs(5),
        }
    }

    async fn harness(swaps: FakeSwaps, notifier: FakeNotifier) -> Harness {
        harness_with(swaps, notifier, settings()).await
    }

    async fn harness_with(swaps: FakeSwaps, notifier: FakeNotifier, settings: SchedulerSettings) -> Harness {
        let db = setup_db().await;
        let orders = Arc::new(OrderRepository::new(db.clone()));
        let custody = Arc::new(
            CustodyService::new(
                Arc::new(WalletRepository::new(db.clone())),
                Arc::new(SecurityRepository::new(db)),
                Arc::new(SessionStore::new(ChronoDuration::minutes(30))),
                Arc::new(LegacyCipher::new(&[1u8; 32]).unwrap())
            )
        );
        let market = Arc::new(FakeMarket::default());
        let swaps = Arc::new(swaps);
        let notifier = Arc::new(notifier);

        let scheduler = TriggerScheduler::new(
            orders.clone(),
            custody.clone(),
            market.clone(),
            swaps.clone(),
            notifier.clone(),
            settings
        );

        Harness { scheduler, orders, custody, market, swaps, notifier }
    }

    async fn unlock_solana_wallet(custody: &CustodyService) {
        let keypair = Keypair::from_seed(&[11u8; 32]).unwrap();
        let secret = bs58::encode(keypair.to_bytes()).into_string();

        custody.setup_password("1", "abcdef").await.unwrap();
        custody.import_wallet("1", Chain::Solana, &secret, "abcdef").await.unwrap();
        custody.unlock("1", "abcdef").await.unwrap();
    }

    fn new_order(
        token: &str,
        side: OrderSide,
        trigger_type: TriggerType,
        condition: TriggerCondition,
        target: i64,
        amount: &str
    ) -> NewTriggerOrder {
        NewTriggerOrder {
            user_id: "1".to_string(),
            chat_id: 42,
            chain: Chain::Solana,
            token_address: token.to_string(),
            token_symbol: "TKN".to_string(),
            side,
            trigger_type,
            trigger_condition: condition,
            trigger_value: Decimal::new(target, 0),
            amount: amount.to_string(),
            amount_type: match side {
                OrderSide::Buy => AmountType::Fixed,
                OrderSide::Sell => AmountType::Percentage,
            },
            slippage_bps: 100,
            price_at_creation: None,
        }
    }

    fn snapshot(price_usd: f64) -> TokenMarketData {
        TokenMarketData { price_usd, market_cap_usd: None }
    }

    fn model(condition: TriggerCondition, target: i64) -> trigger_order::Model {
        let now = chrono::Utc::now();
        trigger_order::Model {
            id: uuid::Uuid::new_v4(),
            user_id: "1".to_string(),
            chat_id: 42,
            chain: "SOLANA".to_string(),
            token_address: BONK.to_string(),
            token_symbol: "BONK".to_string(),
            side: "buy".to_string(),
            trigger_type: "price".to_string(),
            trigger_condition: condition.to_string(),
            trigger_value: Decimal::new(target, 0),
            amount: "1".to_string(),
            amount_type: "fixed".to_string(),
            slippage_bps: 100,
            status: "active".to_string(),
            price_at_creation: None,
            triggered_at: None,
            executed_at: None,
            tx_hash: None,
            execution_price: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_evaluate_above_and_below() {
        let above = model(TriggerCondition::Above, 100);
        assert!(evaluate(&above, &snapshot(100.0)));
        assert!(evaluate(&above, &snapshot(150.0)));
        assert!(!evaluate(&above, &snapshot(99.0)));

        let below = model(TriggerCondition::Below, 100);
        assert!(evaluate(&below, &snapshot(100.0)));
        assert!(evaluate(&below, &snapshot(50.0)));
        assert!(!evaluate(&below, &snapshot(101.0)));
    }

    #[test]
    fn test_evaluate_marketcap_needs_market_cap() {
        let mut order = model(TriggerCondition::Above, 5_000_000);
        order.trigger_type = "marketcap".to_string();

        assert!(!evaluate(&order, &snapshot(9_999_999.0)));
        assert!(
            evaluate(&order, &TokenMarketData { price_usd: 0.01, market_cap_usd: Some(5_200_000.0) })
        );
    }

    #[tokio::test]
    async fn test_marketcap_sell_executes_once() {
        let h = harness(FakeSwaps::default(), FakeNotifier::default()).await;
        unlock_solana_wallet(&h.custody).await;

        let order = h.orders
            .create(new_order(BONK, OrderSide::Sell, TriggerType::MarketCap, TriggerCondition::Above, 5_000_000, "50")).await
            .unwrap();
        h.market.set(BONK, 0.0000215, Some(5_200_000.0));

        let report = h.scheduler.run_cycle().await.unwrap();
        assert_eq!(report.executed, 1);

        let stored = h.orders.find_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Executed.as_str());
        assert_eq!(stored.tx_hash.as_deref(), Some(format!("tx-{}", BONK).as_str()));
        assert!(stored.triggered_at.is_some() && stored.executed_at.is_some());
        let price = decimal_to_f64(stored.execution_price.unwrap()).unwrap();
        assert!((price - 0.0000215).abs() < 1e-12);

        assert_eq!(*h.swaps.calls.lock().unwrap(), vec![(OrderSide::Sell, BONK.to_string(), 50.0)]);
        let sent = h.notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 42);

        drop(sent);
        h.scheduler.run_cycle().await.unwrap();
        assert_eq!(h.swaps.calls.lock().unwrap().len(), 1);
        assert_eq!(h.notifier.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unmatched_order_stays_active() {
        let h = harness(FakeSwaps::default(), FakeNotifier::default()).await;
        let order = h.orders
            .create(new_order(BONK, OrderSide::Buy, TriggerType::Price, TriggerCondition::Above, 100, "1")).await
            .unwrap();
        h.market.set(BONK, 99.0, None);

        let report = h.scheduler.run_cycle().await.unwrap();
        assert_eq!(report, CycleReport { tokens: 1, prices_fetched: 1, ..Default::default() });
        assert_eq!(h.orders.find_by_id(order.id).await.unwrap().unwrap().status, "active");
    }

    #[tokio::test]
    async fn test_price_miss_leaves_order_untouched() {
        let h = harness(FakeSwaps::default(), FakeNotifier::default()).await;
        unlock_solana_wallet(&h.custody).await;

        let missed = h.orders
            .create(new_order(BONK, OrderSide::Buy, TriggerType::Price, TriggerCondition::Above, 1, "1")).await
            .unwrap();
        let priced = h.orders
            .create(new_order(WIF, OrderSide::Buy, TriggerType::Price, TriggerCondition::Above, 1, "2")).await
            .unwrap();
        h.market.set(WIF, 2.5, None);

        let report = h.scheduler.run_cycle().await.unwrap();
        assert_eq!(report.tokens, 2);
        assert_eq!(report.prices_fetched, 1);
        assert_eq!(report.executed, 1);

        let missed = h.orders.find_by_id(missed.id).await.unwrap().unwrap();
        assert_eq!(missed.status, "active");
        assert!(missed.error_message.is_none());
        assert_eq!(h.orders.find_by_id(priced.id).await.unwrap().unwrap().status, "executed");

        // Next cycle the feed recovers and the order fires.
        h.market.set(BONK, 3.0, None);
        h.market.clear(WIF);
        assert_eq!(h.scheduler.run_cycle().await.unwrap().executed, 1);
    }

    #[tokio::test]
    async fn test_locked_wallet_fails_order() {
        let h = harness(FakeSwaps::default(), FakeNotifier::default()).await;
        unlock_solana_wallet(&h.custody).await;
        h.custody.lock("1").await.unwrap();

        let order = h.orders
            .create(new_order(BONK, OrderSide::Buy, TriggerType::Price, TriggerCondition::Below, 10, "0.5")).await
            .unwrap();
        h.market.set(BONK, 5.0, None);

        let report = h.scheduler.run_cycle().await.unwrap();
        assert_eq!(report.failed, 1);

        let stored = h.orders.find_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, "failed");
        assert!(stored.error_message.unwrap().contains("locked"));
        assert!(h.swaps.calls.lock().unwrap().is_empty());

        let sent = h.notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("Failed"));
    }

    #[tokio::test]
    async fn test_swap_error_is_preserved() {
        let swaps = FakeSwaps { fail_with: Some("insufficient funds".to_string()), ..Default::default() };
        let h = harness(swaps, FakeNotifier::default()).await;
        unlock_solana_wallet(&h.custody).await;

        let order = h.orders
            .create(new_order(BONK, OrderSide::Buy, TriggerType::Price, TriggerCondition::Above, 1, "0.5")).await
            .unwrap();
        h.market.set(BONK, 2.0, None);

        h.scheduler.run_cycle().await.unwrap();

        let stored = h.orders.find_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, "failed");
        assert!(stored.error_message.unwrap().contains("insufficient funds"));
        assert_eq!(h.notifier.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_cycles_execute_once() {
        let swaps = FakeSwaps { delay: Duration::from_millis(50), ..Default::default() };
        let h = harness(swaps, FakeNotifier::default()).await;
        unlock_solana_wallet(&h.custody).await;

        let order = h.orders
            .create(new_order(BONK, OrderSide::Buy, TriggerType::Price, TriggerCondition::Above, 100, "1")).await
            .unwrap();
        h.market.set(BONK, 150.0, None);

        let (a, b) = tokio::join!(h.scheduler.run_cycle(), h.scheduler.run_cycle());
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.executed + b.executed, 1);
        assert_eq!(h.swaps.calls.lock().unwrap().len(), 1);
        assert_eq!(h.notifier.sent.lock().unwrap().len(), 1);
        assert_eq!(h.orders.find_by_id(order.id).await.unwrap().unwrap().status, "executed");
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_block_settlement() {
        let notifier = FakeNotifier { broken: true, ..Default::default() };
        let h = harness(FakeSwaps::default(), notifier).await;
        unlock_solana_wallet(&h.custody).await;

        let order = h.orders
            .create(new_order(BONK, OrderSide::Buy, TriggerType::Price, TriggerCondition::Above, 1, "1")).await
            .unwrap();
        h.market.set(BONK, 2.0, None);

        assert_eq!(h.scheduler.run_cycle().await.unwrap().executed, 1);
        assert_eq!(h.orders.find_by_id(order.id).await.unwrap().unwrap().status, "executed");
        assert_eq!(h.notifier.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_order_is_never_evaluated() {
        let h = harness(FakeSwaps::default(), FakeNotifier::default()).await;
        unlock_solana_wallet(&h.custody).await;

        let order = h.orders
            .create(new_order(BONK, OrderSide::Buy, TriggerType::Price, TriggerCondition::Above, 1, "1")).await
            .unwrap();
        assert!(h.orders.cancel(order.id, "1").await.unwrap());
        h.market.set(BONK, 2.0, None);

        assert_eq!(h.scheduler.run_cycle().await.unwrap(), CycleReport::default());
        assert!(h.swaps.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_finite_price_is_a_miss() {
        let h = harness(FakeSwaps::default(), FakeNotifier::default()).await;
        unlock_solana_wallet(&h.custody).await;

        let order = h.orders
            .create(new_order(BONK, OrderSide::Sell, TriggerType::MarketCap, TriggerCondition::Above, 5_000_000, "50")).await
            .unwrap();
        h.market.set(BONK, f64::INFINITY, Some(6_000_000.0));

        let report = h.scheduler.run_cycle().await.unwrap();
        assert_eq!(report.prices_fetched, 0);
        assert_eq!(report.matched, 0);

        let stored = h.orders.find_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, "active");
        assert!(h.swaps.calls.lock().unwrap().is_empty());
        assert!(h.notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_claimed_order_always_settles_and_notifies() {
        let h = harness(FakeSwaps::default(), FakeNotifier::default()).await;
        unlock_solana_wallet(&h.custody).await;

        let order = h.orders
            .create(new_order(BONK, OrderSide::Sell, TriggerType::MarketCap, TriggerCondition::Above, 5_000_000, "50")).await
            .unwrap();

        // A price with no decimal form must not strand the order after the swap.
        let reading = TokenMarketData { price_usd: f64::INFINITY, market_cap_usd: Some(6_000_000.0) };
        let outcome = h.scheduler.clone().execute(order.clone(), reading).await.unwrap();
        assert_eq!(outcome, ExecutionOutcome::Executed);

        let stored = h.orders.find_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, "executed");
        assert_eq!(stored.tx_hash.as_deref(), Some(format!("tx-{}", BONK).as_str()));
        assert!(stored.execution_price.is_none());
        assert_eq!(h.swaps.calls.lock().unwrap().len(), 1);
        assert_eq!(h.notifier.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_swap_timeout_fails_order() {
        let swaps = FakeSwaps { delay: Duration::from_secs(1), ..Default::default() };
        let h = harness_with(swaps, FakeNotifier::default(), SchedulerSettings {
            swap_timeout: Duration::from_millis(100),
            ..settings()
        }).await;
        unlock_solana_wallet(&h.custody).await;

        let order = h.orders
            .create(new_order(BONK, OrderSide::Buy, TriggerType::Price, TriggerCondition::Above, 1, "1")).await
            .unwrap();
        h.market.set(BONK, 2.0, None);

        let report = h.scheduler.run_cycle().await.unwrap();
        assert_eq!(report.failed, 1);

        let stored = h.orders.find_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, "failed");
        assert!(stored.error_message.unwrap().contains("timed out"));

        let sent = h.notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("Failed"));
    }

    #[tokio::test]
    async fn test_price_timeout_is_a_miss() {
        let h = harness_with(FakeSwaps::default(), FakeNotifier::default(), SchedulerSettings {
            call_timeout: Duration::from_millis(50),
            ..settings()
        }).await;
        unlock_solana_wallet(&h.custody).await;

        let order = h.orders
            .create(new_order(BONK, OrderSide::Buy, TriggerType::Price, TriggerCondition::Above, 1, "1")).await
            .unwrap();
        h.market.set(BONK, 2.0, None);
        h.market.set_delay(Duration::from_millis(500));

        let report = h.scheduler.run_cycle().await.unwrap();
        assert_eq!(report.tokens, 1);
        assert_eq!(report.prices_fetched, 0);

        let stored = h.orders.find_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, "active");
        assert!(stored.error_message.is_none());
        assert!(h.swaps.calls.lock().unwrap().is_empty());
        assert!(h.notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let h = harness(FakeSwaps::default(), FakeNotifier::default()).await;
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(h.scheduler.clone().run(shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }
}
