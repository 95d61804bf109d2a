use axum::extract::{Query, State};
use axum::Json;
use ethnum::U256;
use serde::{Deserialize, Serialize};

use crate::api::{parse_amount, AppState, SignedBy};
use crate::domain::AccountId;
use crate::error::AppError;
use crate::service::BalancesView;

#[derive(Debug, Deserialize)]
pub struct BalancesQuery {
    pub owner: AccountId,
}

pub async fn get_balances(
    Query(params): Query<BalancesQuery>,
    State(state): State<AppState>,
) -> Json<BalancesView> {
    Json(state.service.balances(params.owner).await)
}

/// Deposit or withdrawal on the caller's own balance.
#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    #[serde(flatten)]
    pub signed: SignedBy,
    pub asset: AccountId,
    pub amount: String,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub owner: AccountId,
    pub asset: AccountId,
    pub balance: String,
}

pub async fn deposit(
    State(state): State<AppState>,
    Json(req): Json<TransferRequest>,
) -> Result<Json<BalanceResponse>, AppError> {
    let amount = parse_amount("amount", &req.amount)?;
    let auth = req.signed.into_auth()?;
    let owner = auth.caller;
    let balance = state.service.deposit(auth, req.asset, amount).await?;
    Ok(Json(BalanceResponse {
        owner,
        asset: req.asset,
        balance: balance.to_string(),
    }))
}

pub async fn withdraw(
    State(state): State<AppState>,
    Json(req): Json<TransferRequest>,
) -> Result<Json<BalanceResponse>, AppError> {
    let amount = parse_amount("amount", &req.amount)?;
    let auth = req.signed.into_auth()?;
    let owner = auth.caller;
    let balance = state.service.withdraw(auth, req.asset, amount).await?;
    Ok(Json(BalanceResponse {
        owner,
        asset: req.asset,
        balance: balance.to_string(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct PullFeeRequest {
    #[serde(flatten)]
    pub signed: SignedBy,
    pub asset: AccountId,
    pub amount: String,
}

pub async fn pull_fee(
    State(state): State<AppState>,
    Json(req): Json<PullFeeRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let amount = parse_amount("amount", &req.amount)?;
    state
        .service
        .pull_fee(req.signed.into_auth()?, req.asset, amount)
        .await?;
    Ok(Json(serde_json::json!({
        "asset": req.asset,
        "pulled": amount.to_string(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct InvalidateNoncesRequest {
    #[serde(flatten)]
    pub signed: SignedBy,
    pub word: u64,
    /// 256-bit mask as `0x` hex or decimal.
    pub mask: String,
}

pub async fn invalidate_nonces(
    State(state): State<AppState>,
    Json(req): Json<InvalidateNoncesRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let mask = parse_mask(&req.mask)?;
    let auth = req.signed.into_auth()?;
    let owner = auth.caller;
    state.service.invalidate_nonces(auth, req.word, mask).await?;
    Ok(Json(serde_json::json!({
        "owner": owner,
        "word": req.word,
    })))
}

fn parse_mask(value: &str) -> Result<U256, AppError> {
    let value = value.trim();
    let parsed = match value.strip_prefix("0x") {
        Some(hex) => U256::from_str_radix(hex, 16),
        None => U256::from_str_radix(value, 10),
    };
    parsed.map_err(|_| AppError::BadRequest("mask must be a 256-bit integer".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mask() {
        assert_eq!(parse_mask("0x05").unwrap(), U256::from(5u8));
        assert_eq!(parse_mask("256").unwrap(), U256::from(256u32));
        assert_eq!(parse_mask(&format!("0x{}", "f".repeat(64))).unwrap(), U256::MAX);
        assert!(parse_mask("0xzz").is_err());
    }
}
