use std::sync::Arc;
use std::time::Duration;

use sea_orm::prelude::Decimal;
use serde::Deserialize;
use tracing::{ info, warn };
use uuid::Uuid;

use crate::chains;
use crate::db::entity::trigger_order;
use crate::db::{ NewTriggerOrder, OrderRepository };
use crate::enums::{ AmountType, Chain, OrderSide, OrderStatus, TriggerCondition, TriggerType };
use crate::error::{ AppError, Result };
use crate::services::price_service::MarketDataProvider;

pub const MAX_ACTIVE_ORDERS_PER_USER: u64 = 20;
pub const MIN_SLIPPAGE_BPS: u32 = 1;
pub const MAX_SLIPPAGE_BPS: u32 = 5_000;
pub const DEFAULT_SLIPPAGE_BPS: u32 = 100;

fn default_slippage() -> u32 {
    DEFAULT_SLIPPAGE_BPS
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub chat_id: i64,
    pub chain: Chain,
    pub token_address: String,
    #[serde(default)]
    pub token_symbol: Option<String>,
    pub side: OrderSide,
    pub trigger_type: TriggerType,
    pub trigger_condition: TriggerCondition,
    pub trigger_value: f64,
    pub amount: String,
    #[serde(default)]
    pub amount_type: Option<AmountType>,
    #[serde(default = "default_slippage")]
    pub slippage_bps: u32,
}

/// Placement and cancellation of trigger orders on behalf of their owner.
pub struct OrderService {
    orders: Arc<OrderRepository>,
    market: Arc<dyn MarketDataProvider>,
    price_timeout: Duration,
}

impl OrderService {
    pub fn new(
        orders: Arc<OrderRepository>,
        market: Arc<dyn MarketDataProvider>,
        price_timeout: Duration
    ) -> Self {
        Self {
            orders,
            market,
            price_timeout,
        }
    }

    pub async fn create_order(
        &self,
        user_id: &str,
        request: CreateOrderRequest
    ) -> Result<trigger_order::Model> {
        let token_address = request.token_address.trim().to_string();
        if !chains::validate_address(request.chain, &token_address) {
            return Err(AppError::InvalidAddress);
        }

        if !request.trigger_value.is_finite() || request.trigger_value <= 0.0 {
            return Err(AppError::InvalidInput("Trigger value must be a positive number".to_string()));
        }
        let trigger_value = Decimal::from_f64_retain(request.trigger_value).ok_or_else(||
            AppError::InvalidInput("Trigger value is out of range".to_string())
        )?;

        let amount_type = validate_amount(request.side, request.amount_type, &request.amount)?;

        if !(MIN_SLIPPAGE_BPS..=MAX_SLIPPAGE_BPS).contains(&request.slippage_bps) {
            return Err(
                AppError::InvalidInput(
                    format!("Slippage must be between {} and {} bps", MIN_SLIPPAGE_BPS, MAX_SLIPPAGE_BPS)
                )
            );
        }

        if self.orders.count_active_for_user(user_id).await? >= MAX_ACTIVE_ORDERS_PER_USER {
            return Err(
                AppError::InvalidInput(
                    format!("You can have at most {} active orders", MAX_ACTIVE_ORDERS_PER_USER)
                )
            );
        }

        let price_at_creation = self.current_price(request.chain, &token_address).await;

        let order = self.orders.create(NewTriggerOrder {
            user_id: user_id.to_string(),
            chat_id: request.chat_id,
            chain: request.chain,
            token_symbol: request.token_symbol
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| shorten(&token_address)),
            token_address,
            side: request.side,
            trigger_type: request.trigger_type,
            trigger_condition: request.trigger_condition,
            trigger_value,
            amount: request.amount.trim().to_string(),
            amount_type,
            slippage_bps: request.slippage_bps as i32,
            price_at_creation,
        }).await?;

        info!(
            user_id,
            order_id = %order.id,
            chain = %order.chain,
            side = %order.side,
            trigger = %format!("{} {} {}", order.trigger_type, order.trigger_condition, order.trigger_value),
            "Trigger order created"
        );
        Ok(order)
    }

    /// Best-effort snapshot of the price when the order is placed.
    async fn current_price(&self, chain: Chain, token_address: &str) -> Option<Decimal> {
        match tokio::time::timeout(self.price_timeout, self.market.get_price(chain, token_address)).await {
            Ok(Ok(Some(data))) => Decimal::from_f64_retain(data.price_usd),
            Ok(Ok(None)) => None,
            Ok(Err(e)) => {
                warn!(chain = %chain, token_address, error = %e, "Price lookup failed at order creation");
                None
            }
            Err(_) => {
                warn!(chain = %chain, token_address, "Price lookup timed out at order creation");
                None
            }
        }
    }

    /// Cancel an order the user owns while it is still active.
    pub async fn cancel_order(&self, user_id: &str, order_id: Uuid) -> Result<()> {
        let order = self.orders
            .find_by_id(order_id).await?
            .filter(|o| o.user_id == user_id)
            .ok_or(AppError::OrderNotFound)?;

        if order.status != OrderStatus::Active.as_str() || !self.orders.cancel(order_id, user_id).await? {
            return Err(AppError::OrderNotActive);
        }

        info!(user_id, order_id = %order_id, "Trigger order cancelled");
        Ok(())
    }

    pub async fn list_orders(&self, user_id: &str, active_only: bool) -> Result<Vec<trigger_order::Model>> {
        self.orders.list_for_user(user_id, active_only).await
    }

    pub async fn get_order(&self, user_id: &str, order_id: Uuid) -> Result<trigger_order::Model> {
        self.orders
            .find_by_id(order_id).await?
            .filter(|o| o.user_id == user_id)
            .ok_or(AppError::OrderNotFound)
    }
}

/// Buys spend a fixed native amount; sells a percentage of holdings.
fn validate_amount(side: OrderSide, amount_type: Option<AmountType>, amount: &str) -> Result<AmountType> {
    let expected = match side {
        OrderSide::Buy => AmountType::Fixed,
        OrderSide::Sell => AmountType::Percentage,
    };

    if amount_type.is_some_and(|t| t != expected) {
        return Err(
            AppError::InvalidInput(format!("{} orders use a {} amount", side, expected))
        );
    }

    let value: f64 = amount
        .trim()
        .parse()
        .map_err(|_| AppError::InvalidInput(format!("Invalid amount: {}", amount)))?;

    let valid = match expected {
        AmountType::Fixed => value.is_finite() && value > 0.0,
        AmountType::Percentage => value > 0.0 && value <= 100.0,
    };

    if !valid {
        let rule = match expected {
            AmountType::Fixed => "Amount must be greater than zero",
            AmountType::Percentage => "Sell percentage must be greater than 0 and at most 100",
        };
        return Err(AppError::InvalidInput(rule.to_string()));
    }

    Ok(expected)
}

fn shorten(address: &str) -> String {
    if address.len() <= 10 {
        return address.to_string();
    }
    format!("{}...{}", &address[..4], &address[address.len() - 4..])
}
