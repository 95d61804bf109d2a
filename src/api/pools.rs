use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::{AppState, SignedBy};
use crate::domain::AccountId;
use crate::error::AppError;
use crate::service::PoolView;

#[derive(Debug, Serialize)]
pub struct PoolsResponse {
    pub version: u64,
    pub pools: Vec<PoolView>,
}

pub async fn get_pools(State(state): State<AppState>) -> Json<PoolsResponse> {
    let (version, pools) = state.service.pools().await;
    Json(PoolsResponse { version, pools })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurePoolRequest {
    #[serde(flatten)]
    pub signed: SignedBy,
    pub asset0: AccountId,
    pub asset1: AccountId,
    pub tick_spacing: i32,
    pub fee: u32,
}

pub async fn configure_pool(
    State(state): State<AppState>,
    Json(req): Json<ConfigurePoolRequest>,
) -> Result<Json<PoolsResponse>, AppError> {
    state
        .service
        .configure_pool(
            req.signed.into_auth()?,
            req.asset0,
            req.asset1,
            req.tick_spacing,
            req.fee,
        )
        .await?;
    Ok(get_pools(State(state)).await)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializePoolRequest {
    pub asset0: AccountId,
    pub asset1: AccountId,
    pub store_index: u16,
    pub tick: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializePoolResponse {
    pub pool_id: String,
    pub tick_spacing: i32,
    pub fee: u32,
    pub tick: i32,
}

pub async fn initialize_pool(
    State(state): State<AppState>,
    Json(req): Json<InitializePoolRequest>,
) -> Result<Json<InitializePoolResponse>, AppError> {
    let key = state
        .service
        .initialize_pool(req.asset0, req.asset1, req.store_index, req.tick)
        .await?;
    Ok(Json(InitializePoolResponse {
        pool_id: key.id().to_string(),
        tick_spacing: key.tick_spacing,
        fee: key.fee,
        tick: req.tick,
    }))
}
