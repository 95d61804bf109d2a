use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::{AppState, SignedBy};
use crate::engine::SettlementReceipt;
use crate::error::AppError;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitBundleRequest {
    #[serde(flatten)]
    pub signed: SignedBy,
    /// Hex-encoded bundle, `0x` prefix optional.
    pub payload: String,
}

pub async fn submit_bundle(
    State(state): State<AppState>,
    Json(req): Json<SubmitBundleRequest>,
) -> Result<Json<SettlementReceipt>, AppError> {
    let payload = req.payload.trim();
    let raw = hex::decode(payload.strip_prefix("0x").unwrap_or(payload))
        .map_err(|e| AppError::BadRequest(format!("payload is not hex: {}", e)))?;

    let receipt = state
        .service
        .submit_bundle(req.signed.into_auth()?, &raw)
        .await?;
    Ok(Json(receipt))
}

#[derive(Debug, Deserialize)]
pub struct SettlementsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementDto {
    pub epoch: u64,
    pub bundle_digest: String,
    pub executed_at: String,
    pub caller: String,
    pub receipt: SettlementReceipt,
}

#[derive(Debug, Serialize)]
pub struct SettlementsResponse {
    pub settlements: Vec<SettlementDto>,
}

pub async fn get_settlements(
    Query(params): Query<SettlementsQuery>,
    State(state): State<AppState>,
) -> Result<Json<SettlementsResponse>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(AppError::BadRequest(format!(
            "limit must be between 1 and {}",
            MAX_LIMIT
        )));
    }

    let settlements = state
        .service
        .list_settlements(limit)
        .await?
        .into_iter()
        .map(|row| SettlementDto {
            epoch: row.epoch,
            bundle_digest: row.bundle_digest,
            executed_at: row.executed_at.to_rfc3339(),
            caller: row.caller,
            receipt: row.receipt,
        })
        .collect();

    Ok(Json(SettlementsResponse { settlements }))
}
