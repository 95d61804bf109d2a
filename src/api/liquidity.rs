use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::{AppState, SignedBy};
use crate::domain::AccountId;
use crate::error::AppError;
use crate::venue::PoolKey;

/// Liquidity change on a position owned by the caller.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyLiquidityRequest {
    #[serde(flatten)]
    pub signed: SignedBy,
    pub asset0: AccountId,
    pub asset1: AccountId,
    pub tick_spacing: i32,
    pub fee: u32,
    pub lower_tick: i32,
    pub upper_tick: i32,
    /// Hex salt distinguishing positions with the same owner and range.
    #[serde(default)]
    pub salt: Option<String>,
    /// Signed decimal string; negative removes liquidity.
    pub liquidity_delta: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyLiquidityResponse {
    pub pool_id: String,
    pub liquidity: String,
    pub rewards_paid: String,
}

pub async fn modify_liquidity(
    State(state): State<AppState>,
    Json(req): Json<ModifyLiquidityRequest>,
) -> Result<Json<ModifyLiquidityResponse>, AppError> {
    let liquidity_delta = req
        .liquidity_delta
        .trim()
        .parse::<i128>()
        .map_err(|_| AppError::BadRequest("liquidityDelta must be a signed integer".into()))?;
    let salt = parse_salt(req.salt.as_deref())?;

    let key = PoolKey::new(req.asset0, req.asset1, req.tick_spacing, req.fee);
    let change = state
        .service
        .modify_liquidity(
            req.signed.into_auth()?,
            key,
            req.lower_tick,
            req.upper_tick,
            salt,
            liquidity_delta,
        )
        .await?;

    Ok(Json(ModifyLiquidityResponse {
        pool_id: key.id().to_string(),
        liquidity: change.liquidity.to_string(),
        rewards_paid: change.rewards_paid.to_string(),
    }))
}

fn parse_salt(salt: Option<&str>) -> Result<[u8; 32], AppError> {
    let Some(salt) = salt else {
        return Ok([0u8; 32]);
    };
    let bytes = hex::decode(salt.trim().trim_start_matches("0x"))
        .map_err(|_| AppError::BadRequest("salt must be hex".into()))?;
    if bytes.len() > 32 {
        return Err(AppError::BadRequest("salt must be at most 32 bytes".into()));
    }
    // left-pad, like a uint256
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(&bytes);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_salt() {
        assert_eq!(parse_salt(None).unwrap(), [0u8; 32]);
        let salt = parse_salt(Some("0x01ff")).unwrap();
        assert_eq!(&salt[30..], &[0x01, 0xff]);
        assert!(parse_salt(Some(&"aa".repeat(33))).is_err());
    }
}
