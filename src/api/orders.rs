use axum::{ extract::{ Path, Query, State }, http::StatusCode, Json };
use serde::Deserialize;
use uuid::Uuid;

use crate::db::entity::trigger_order;
use crate::error::Result;
use crate::services::order_service::CreateOrderRequest;

use super::AppState;

#[derive(Deserialize)]
pub struct ListOrdersQuery {
    #[serde(default)]
    pub active: bool,
}

pub async fn create_order(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<CreateOrderRequest>
) -> Result<(StatusCode, Json<trigger_order::Model>)> {
    let order = state.orders.create_order(&user_id, request).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn list_orders(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<ListOrdersQuery>
) -> Result<Json<Vec<trigger_order::Model>>> {
    Ok(Json(state.orders.list_orders(&user_id, query.active).await?))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path((user_id, order_id)): Path<(String, Uuid)>
) -> Result<Json<trigger_order::Model>> {
    Ok(Json(state.orders.get_order(&user_id, order_id).await?))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    Path((user_id, order_id)): Path<(String, Uuid)>
) -> Result<StatusCode> {
    state.orders.cancel_order(&user_id, order_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::http::{ Method, StatusCode };
    use serde_json::json;

    use super::super::test_support::{ app, send };

    #[tokio::test]
    async fn test_order_lifecycle_over_http() {
        let app = app().await;
        let payload = json!({
            "chat_id": 42,
            "chain": "SOLANA",
            "token_address": "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263",
            "token_symbol": "BONK",
            "side": "sell",
            "trigger_type": "marketcap",
            "trigger_condition": "above",
            "trigger_value": 5000000.0,
            "amount": "50"
        });

        let (status, order) = send(&app, Method::POST, "/api/users/3/orders", Some(payload)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(order["status"], "active");
        assert_eq!(order["amount_type"], "percentage");
        assert_eq!(order["slippage_bps"], 100);

        let id = order["id"].as_str().unwrap().to_string();

        let (status, _) = send(&app, Method::DELETE, &format!("/api/users/4/orders/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, Method::DELETE, &format!("/api/users/3/orders/{}", id), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, Method::DELETE, &format!("/api/users/3/orders/{}", id), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, active) = send(&app, Method::GET, "/api/users/3/orders?active=true", None).await;
        assert!(active.as_array().unwrap().is_empty());

        let (_, all) = send(&app, Method::GET, "/api/users/3/orders", None).await;
        assert_eq!(all[0]["status"], "cancelled");
    }
}
