use axum::{ extract::{ Path, State }, http::StatusCode, Json };
use serde::{ Deserialize, Serialize };
use zeroize::Zeroizing;

use crate::db::entity::withdrawal_whitelist;
use crate::enums::Chain;
use crate::error::Result;
use crate::services::custody_service::UnlockReport;
use crate::services::session_store::SessionInfo;

use super::AppState;

#[derive(Deserialize)]
pub struct PasswordRequest {
    pub password: Zeroizing<String>,
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: Zeroizing<String>,
    pub new_password: Zeroizing<String>,
}

#[derive(Serialize)]
pub struct PasswordStatusResponse {
    pub needs_setup: bool,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub unlocked: bool,
    #[serde(flatten)]
    pub session: Option<SessionInfo>,
}

#[derive(Deserialize)]
pub struct TransferLimitRequest {
    pub password: Zeroizing<String>,
    pub chain: Chain,
    pub limit: f64,
}

#[derive(Deserialize)]
pub struct AntiPhishingRequest {
    pub password: Zeroizing<String>,
    pub code: Option<String>,
}

#[derive(Deserialize)]
pub struct WithdrawalCheckRequest {
    pub chain: Chain,
    pub address: String,
    pub amount: f64,
}

#[derive(Serialize)]
pub struct WithdrawalCheckResponse {
    pub requires_password: bool,
}

#[derive(Deserialize)]
pub struct WhitelistRequest {
    pub password: Zeroizing<String>,
    pub chain: Chain,
    pub address: String,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Serialize)]
pub struct RemovedResponse {
    pub removed: bool,
}

pub async fn password_status(
    State(state): State<AppState>,
    Path(user_id): Path<String>
) -> Result<Json<PasswordStatusResponse>> {
    let needs_setup = state.custody.needs_setup(&user_id).await?;
    Ok(Json(PasswordStatusResponse { needs_setup }))
}

pub async fn setup_password(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<PasswordRequest>
) -> Result<StatusCode> {
    state.custody.setup_password(&user_id, &request.password).await?;
    Ok(StatusCode::CREATED)
}

pub async fn change_password(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<ChangePasswordRequest>
) -> Result<StatusCode> {
    state.custody.change_password(&user_id, &request.old_password, &request.new_password).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unlock(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<PasswordRequest>
) -> Result<Json<UnlockReport>> {
    let report = state.custody.unlock(&user_id, &request.password).await?;
    Ok(Json(report))
}

pub async fn lock(State(state): State<AppState>, Path(user_id): Path<String>) -> Result<StatusCode> {
    state.custody.lock(&user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn session(State(state): State<AppState>, Path(user_id): Path<String>) -> Json<SessionResponse> {
    let session = state.custody.session_info(&user_id).await;
    Json(SessionResponse {
        unlocked: session.is_some(),
        session,
    })
}

pub async fn set_transfer_limit(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<TransferLimitRequest>
) -> Result<StatusCode> {
    state.custody.set_transfer_limit(&user_id, &request.password, request.chain, request.limit).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_anti_phishing_code(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<AntiPhishingRequest>
) -> Result<StatusCode> {
    state.custody.set_anti_phishing_code(&user_id, &request.password, request.code).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn check_withdrawal(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<WithdrawalCheckRequest>
) -> Result<Json<WithdrawalCheckResponse>> {
    let requires_password = state.custody.requires_password_for_withdraw(
        &user_id,
        request.chain,
        &request.address,
        request.amount
    ).await?;

    Ok(Json(WithdrawalCheckResponse { requires_password }))
}

pub async fn list_whitelist(
    State(state): State<AppState>,
    Path(user_id): Path<String>
) -> Result<Json<Vec<withdrawal_whitelist::Model>>> {
    Ok(Json(state.custody.list_whitelist(&user_id).await?))
}

pub async fn add_whitelist(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<WhitelistRequest>
) -> Result<(StatusCode, Json<withdrawal_whitelist::Model>)> {
    let entry = state.custody.add_whitelist_address(
        &user_id,
        &request.password,
        request.chain,
        &request.address,
        request.label
    ).await?;

    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn remove_whitelist(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<WhitelistRequest>
) -> Result<Json<RemovedResponse>> {
    let removed = state.custody.remove_whitelist_address(
        &user_id,
        &request.password,
        request.chain,
        &request.address
    ).await?;
    Ok(Json(RemovedResponse { removed }))
}
