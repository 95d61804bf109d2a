pub mod api;
pub mod auth;
pub mod chain;
pub mod codec;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod service;
pub mod venue;

pub use chain::{BlockSource, ChainError, MockBlockSource, RpcBlockSource};
pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{AccountId, Bundle, EpochContext, EpochId, Ray};
pub use engine::{BundleController, ErrorClass, SettlementError, SettlementReceipt};
pub use error::AppError;
pub use service::{ServiceError, SettlementService};
pub use venue::{LiquidityVenue, SimulatedVenue};
