use chrono::Utc;
use sea_orm::{
    sea_query::Expr,
    ActiveModelTrait,
    ColumnTrait,
    DatabaseConnection,
    EntityTrait,
    PaginatorTrait,
    QueryFilter,
    QueryOrder,
    QuerySelect,
    Set,
    prelude::Decimal,
};
use tracing::warn;
use uuid::Uuid;

use crate::db::entity::trigger_order;
use crate::enums::{ AmountType, Chain, OrderSide, OrderStatus, TriggerCondition, TriggerType };
use crate::error::Result;

/// Fields supplied when a trigger order is placed.
#[derive(Debug, Clone)]
pub struct NewTriggerOrder {
    pub user_id: String,
    pub chat_id: i64,
    pub chain: Chain,
    pub token_address: String,
    pub token_symbol: String,
    pub side: OrderSide,
    pub trigger_type: TriggerType,
    pub trigger_condition: TriggerCondition,
    pub trigger_value: Decimal,
    pub amount: String,
    pub amount_type: AmountType,
    pub slippage_bps: i32,
    pub price_at_creation: Option<Decimal>,
}

/// Persisted trigger orders.
///
/// Every status change goes through a conditional update on the current
/// status, so two callers racing on the same order can never both win.
pub struct OrderRepository {
    db: DatabaseConnection,
}

impl OrderRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(&self, order: NewTriggerOrder) -> Result<trigger_order::Model> {
        let now = Utc::now();

        let model = trigger_order::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(order.user_id),
            chat_id: Set(order.chat_id),
            chain: Set(order.chain.to_string()),
            token_address: Set(order.token_address),
            token_symbol: Set(order.token_symbol),
            side: Set(order.side.to_string()),
            trigger_type: Set(order.trigger_type.to_string()),
            trigger_condition: Set(order.trigger_condition.to_string()),
            trigger_value: Set(order.trigger_value),
            amount: Set(order.amount),
            amount_type: Set(order.amount_type.to_string()),
            slippage_bps: Set(order.slippage_bps),
            status: Set(OrderStatus::Active.to_string()),
            price_at_creation: Set(order.price_at_creation),
            triggered_at: Set(None),
            executed_at: Set(None),
            tx_hash: Set(None),
            execution_price: Set(None),
            error_message: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let model = model.insert(&self.db).await?;
        Ok(model)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<trigger_order::Model>> {
        let order = trigger_order::Entity::find_by_id(id).one(&self.db).await?;
        Ok(order)
    }

    pub async fn list_for_user(
        &self,
        user_id: &str,
        active_only: bool
    ) -> Result<Vec<trigger_order::Model>> {
        let mut query = trigger_order::Entity
            ::find()
            .filter(trigger_order::Column::UserId.eq(user_id));

        if active_only {
            query = query.filter(trigger_order::Column::Status.eq(OrderStatus::Active.as_str()));
        }

        let orders = query.order_by_desc(trigger_order::Column::CreatedAt).all(&self.db).await?;
        Ok(orders)
    }

    pub async fn count_active_for_user(&self, user_id: &str) -> Result<u64> {
        let count = trigger_order::Entity
            ::find()
            .filter(trigger_order::Column::UserId.eq(user_id))
            .filter(trigger_order::Column::Status.eq(OrderStatus::Active.as_str()))
            .count(&self.db).await?;

        Ok(count)
    }

    /// Distinct (chain, token address) pairs that have at least one active order.
    pub async fn active_token_pairs(&self) -> Result<Vec<(String, String)>> {
        let pairs = trigger_order::Entity
            ::find()
            .select_only()
            .column(trigger_order::Column::Chain)
            .column(trigger_order::Column::TokenAddress)
            .filter(trigger_order::Column::Status.eq(OrderStatus::Active.as_str()))
            .distinct()
            .into_tuple::<(String, String)>()
            .all(&self.db).await?;

        Ok(pairs)
    }

    pub async fn find_active(&self) -> Result<Vec<trigger_order::Model>> {
        let orders = trigger_order::Entity
            ::find()
            .filter(trigger_order::Column::Status.eq(OrderStatus::Active.as_str()))
            .order_by_asc(trigger_order::Column::CreatedAt)
            .all(&self.db).await?;

        Ok(orders)
    }

    /// Owner-initiated cancel. Only succeeds while the order is still active.
    pub async fn cancel(&self, id: Uuid, user_id: &str) -> Result<bool> {
        let result = trigger_order::Entity
            ::update_many()
            .col_expr(trigger_order::Column::Status, Expr::value(OrderStatus::Cancelled.as_str()))
            .col_expr(trigger_order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(trigger_order::Column::Id.eq(id))
            .filter(trigger_order::Column::UserId.eq(user_id))
            .filter(trigger_order::Column::Status.eq(OrderStatus::Active.as_str()))
            .exec(&self.db).await?;

        Ok(result.rows_affected == 1)
    }

    /// Claim an order for execution: `active` -> `triggered`.
    ///
    /// Returns false when another caller already moved it.
    pub async fn try_mark_triggered(&self, id: Uuid) -> Result<bool> {
        let now = Utc::now();
        let result = trigger_order::Entity
            ::update_many()
            .col_expr(trigger_order::Column::Status, Expr::value(OrderStatus::Triggered.as_str()))
            .col_expr(trigger_order::Column::TriggeredAt, Expr::value(now))
            .col_expr(trigger_order::Column::UpdatedAt, Expr::value(now))
            .filter(trigger_order::Column::Id.eq(id))
            .filter(trigger_order::Column::Status.eq(OrderStatus::Active.as_str()))
            .exec(&self.db).await?;

        Ok(result.rows_affected == 1)
    }

    /// `triggered` -> `executed`. A price that has no decimal form is
    /// stored as NULL; the swap already happened and must be recorded.
    pub async fn mark_executed(&self, id: Uuid, tx_hash: &str, execution_price: f64) -> Result<bool> {
        let price = Decimal::from_f64_retain(execution_price);
        if price.is_none() {
            warn!(order_id = %id, execution_price, "Execution price not representable, storing none");
        }

        let now = Utc::now();
        let result = trigger_order::Entity
            ::update_many()
            .col_expr(trigger_order::Column::Status, Expr::value(OrderStatus::Executed.as_str()))
            .col_expr(trigger_order::Column::TxHash, Expr::value(tx_hash))
            .col_expr(trigger_order::Column::ExecutionPrice, Expr::value(price))
            .col_expr(trigger_order::Column::ExecutedAt, Expr::value(now))
            .col_expr(trigger_order::Column::UpdatedAt, Expr::value(now))
            .filter(trigger_order::Column::Id.eq(id))
            .filter(trigger_order::Column::Status.eq(OrderStatus::Triggered.as_str()))
            .exec(&self.db).await?;

        Ok(result.rows_affected == 1)
    }

    /// `triggered` -> `failed`, keeping the error for the user.
    pub async fn mark_failed(&self, id: Uuid, error: &str) -> Result<bool> {
        let now = Utc::now();
        let result = trigger_order::Entity
            ::update_many()
            .col_expr(trigger_order::Column::Status, Expr::value(OrderStatus::Failed.as_str()))
            .col_expr(trigger_order::Column::ErrorMessage, Expr::value(error))
            .col_expr(trigger_order::Column::UpdatedAt, Expr::value(now))
            .filter(trigger_order::Column::Id.eq(id))
            .filter(trigger_order::Column::Status.eq(OrderStatus::Triggered.as_str()))
            .exec(&self.db).await?;

        Ok(result.rows_affected == 1)
    }
}
