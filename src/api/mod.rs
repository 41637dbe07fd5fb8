use std::sync::Arc;

use axum::{ routing::{ get, post, put }, Router };
use tower_http::{ cors::CorsLayer, trace::TraceLayer };

pub mod orders;
pub mod security;
pub mod wallet;

use crate::services::{ CustodyService, OrderService };

#[derive(Clone)]
pub struct AppState {
    pub custody: Arc<CustodyService>,
    pub orders: Arc<OrderService>,
}

impl AppState {
    pub fn new(custody: Arc<CustodyService>, orders: Arc<OrderService>) -> Self {
        Self { custody, orders }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/api/users/{user_id}/password",
            get(security::password_status).post(security::setup_password).put(security::change_password)
        )
        .route("/api/users/{user_id}/unlock", post(security::unlock))
        .route("/api/users/{user_id}/lock", post(security::lock))
        .route("/api/users/{user_id}/session", get(security::session))
        .route("/api/users/{user_id}/limits", put(security::set_transfer_limit))
        .route("/api/users/{user_id}/anti-phishing", put(security::set_anti_phishing_code))
        .route("/api/users/{user_id}/withdrawals/check", post(security::check_withdrawal))
        .route(
            "/api/users/{user_id}/whitelist",
            get(security::list_whitelist).post(security::add_whitelist).delete(security::remove_whitelist)
        )
        .route("/api/users/{user_id}/wallets", get(wallet::list_wallets))
        .route("/api/users/{user_id}/wallets/import", post(wallet::import_wallet))
        .route("/api/users/{user_id}/wallets/migrate", post(wallet::migrate_all_wallets))
        .route("/api/users/{user_id}/wallets/{wallet_id}/migrate", post(wallet::migrate_wallet))
        .route("/api/users/{user_id}/orders", get(orders::list_orders).post(orders::create_order))
        .route(
            "/api/users/{user_id}/orders/{order_id}",
            get(orders::get_order).delete(orders::cancel_order)
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn health_check() -> &'static str {
    "OK"
}
