// Chat messages sent when a trigger order reaches a terminal state.

use crate::db::entity::trigger_order;
use crate::enums::{ AmountType, Chain, OrderSide, TriggerType };

fn amount_line(order: &trigger_order::Model) -> String {
    let native = order.chain
        .parse::<Chain>()
        .map(|c| c.native_symbol())
        .unwrap_or("");

    match order.amount_type.parse::<AmountType>() {
        Ok(AmountType::Percentage) => format!("{}% of holdings", order.amount),
        _ => format!("{} {}", order.amount, native).trim_end().to_string(),
    }
}

fn trigger_line(order: &trigger_order::Model) -> String {
    let metric = match order.trigger_type.parse::<TriggerType>() {
        Ok(TriggerType::MarketCap) => "Market cap",
        _ => "Price",
    };
    format!("{} {} ${}", metric, order.trigger_condition, order.trigger_value)
}

fn side_label(order: &trigger_order::Model) -> &'static str {
    match order.side.parse::<OrderSide>() {
        Ok(OrderSide::Sell) => "Sell",
        _ => "Buy",
    }
}

pub fn order_executed(order: &trigger_order::Model, tx_hash: &str, price_usd: f64) -> String {
    format!(
        "✅ Trigger Order Executed\n\n\
        {side} {symbol} on {chain}\n\
        Amount: {amount}\n\
        Trigger: {trigger}\n\
        Execution Price: ${price:.8}\n\
        Tx: {tx}",
        side = side_label(order),
        symbol = order.token_symbol,
        chain = order.chain,
        amount = amount_line(order),
        trigger = trigger_line(order),
        price = price_usd,
        tx = tx_hash
    )
}

pub fn order_failed(order: &trigger_order::Model, error: &str) -> String {
    format!(
        "❌ Trigger Order Failed\n\n\
        {side} {symbol} on {chain}\n\
        Amount: {amount}\n\
        Trigger: {trigger}\n\
        Reason: {error}\n\n\
        This order will not be retried. Create a new one to try again.",
        side = side_label(order),
        symbol = order.token_symbol,
        chain = order.chain,
        amount = amount_line(order),
        trigger = trigger_line(order),
        error = error
    )
}
