pub mod bundles;
pub mod health;
pub mod ledger;
pub mod liquidity;
pub mod pools;

use crate::domain::{AccountId, RequestAuth};
use crate::error::AppError;
use crate::service::SettlementService;
use axum::{
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SettlementService>,
}

impl AppState {
    pub fn new(service: Arc<SettlementService>) -> Self {
        Self { service }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/bundles", post(bundles::submit_bundle))
        .route("/v1/settlements", get(bundles::get_settlements))
        .route(
            "/v1/pools",
            get(pools::get_pools).post(pools::configure_pool),
        )
        .route("/v1/pools/initialize", post(pools::initialize_pool))
        .route("/v1/fees/pull", post(ledger::pull_fee))
        .route("/v1/balances", get(ledger::get_balances))
        .route("/v1/deposits", post(ledger::deposit))
        .route("/v1/withdrawals", post(ledger::withdraw))
        .route("/v1/nonces/invalidate", post(ledger::invalidate_nonces))
        .route("/v1/liquidity", post(liquidity::modify_liquidity))
        .layer(cors)
        .with_state(state)
}

/// Caller, request nonce and hex signature flattened into every signed
/// request body.
#[derive(Debug, Deserialize)]
pub struct SignedBy {
    pub caller: AccountId,
    pub nonce: u64,
    pub signature: String,
}

impl SignedBy {
    pub(crate) fn into_auth(self) -> Result<RequestAuth, AppError> {
        let signature = self.signature.trim();
        let signature = hex::decode(signature.strip_prefix("0x").unwrap_or(signature))
            .map_err(|_| AppError::BadRequest("signature must be hex".into()))?;
        Ok(RequestAuth {
            caller: self.caller,
            nonce: self.nonce,
            signature,
        })
    }
}

/// Amounts travel as decimal strings so they survive JSON number precision.
pub(crate) fn parse_amount(field: &str, value: &str) -> Result<u128, AppError> {
    value
        .trim()
        .parse::<u128>()
        .map_err(|_| AppError::BadRequest(format!("{} must be an unsigned integer", field)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("amount", " 42 ").unwrap(), 42);
        assert_eq!(
            parse_amount("amount", "340282366920938463463374607431768211455").unwrap(),
            u128::MAX
        );
        assert!(matches!(
            parse_amount("amount", "-1"),
            Err(AppError::BadRequest(msg)) if msg.contains("amount")
        ));
    }

    #[test]
    fn test_signed_by_decodes_signature() {
        let signed: SignedBy = serde_json::from_value(serde_json::json!({
            "caller": "0x0000000000000000000000000000000000000009",
            "nonce": 3,
            "signature": "0xabcd"
        }))
        .unwrap();
        let auth = signed.into_auth().unwrap();
        assert_eq!(auth.caller, AccountId::from_low_u64(9));
        assert_eq!(auth.nonce, 3);
        assert_eq!(auth.signature, vec![0xab, 0xcd]);

        let bad = SignedBy {
            caller: AccountId::from_low_u64(9),
            nonce: 0,
            signature: "xyz".into(),
        };
        assert!(matches!(bad.into_auth(), Err(AppError::BadRequest(_))));
    }
}
