use axum::{ extract::{ Path, State }, http::StatusCode, Json };
use serde::Deserialize;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::enums::Chain;
use crate::error::Result;
use crate::services::custody_service::{ MigrationReport, WalletSummary };

use super::AppState;

#[derive(Deserialize)]
pub struct ImportWalletRequest {
    pub chain: Chain,
    pub secret: Zeroizing<String>,
    pub password: Zeroizing<String>,
}

#[derive(Deserialize)]
pub struct MigrateRequest {
    pub password: Zeroizing<String>,
}

pub async fn list_wallets(
    State(state): State<AppState>,
    Path(user_id): Path<String>
) -> Result<Json<Vec<WalletSummary>>> {
    Ok(Json(state.custody.list_wallets(&user_id).await?))
}

pub async fn import_wallet(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<ImportWalletRequest>
) -> Result<(StatusCode, Json<WalletSummary>)> {
    let wallet = state.custody.import_wallet(
        &user_id,
        request.chain,
        &request.secret,
        &request.password
    ).await?;

    Ok((StatusCode::CREATED, Json(wallet)))
}

pub async fn migrate_wallet(
    State(state): State<AppState>,
    Path((user_id, wallet_id)): Path<(String, Uuid)>,
    Json(request): Json<MigrateRequest>
) -> Result<Json<WalletSummary>> {
    let wallet = state.custody.migrate_wallet(&user_id, wallet_id, &request.password).await?;
    Ok(Json(wallet))
}

pub async fn migrate_all_wallets(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<MigrateRequest>
) -> Result<Json<MigrationReport>> {
    let report = state.custody.migrate_all_wallets(&user_id, &request.password).await?;
    Ok(Json(report))
}
