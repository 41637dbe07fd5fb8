use sea_orm::entity::prelude::*;
use serde::{ Deserialize, Serialize };

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "trigger_orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: String,
    pub chat_id: i64,
    pub chain: String,
    pub token_address: String,
    pub token_symbol: String,
    pub side: String, // "buy", "sell"
    pub trigger_type: String, // "price", "marketcap"
    pub trigger_condition: String, // "above", "below"
    pub trigger_value: Decimal,
    pub amount: String,
    pub amount_type: String, // "fixed", "percentage"
    pub slippage_bps: i32,
    pub status: String, // "active", "triggered", "executed", "failed", "cancelled"
    pub price_at_creation: Option<Decimal>,
    pub triggered_at: Option<DateTimeUtc>,
    pub executed_at: Option<DateTimeUtc>,
    pub tx_hash: Option<String>,
    pub execution_price: Option<Decimal>,
    pub error_message: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
