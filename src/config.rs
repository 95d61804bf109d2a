use crate::domain::{AccountId, Ray};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub rpc_url: String,
    pub half_spread: Ray,
    pub node_addresses: Vec<AccountId>,
    pub controller_address: AccountId,
    pub fee_recipient: AccountId,
    pub pool_config_file: Option<String>,
}

/// One row of the boot-time pool config CSV.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PoolConfigRow {
    pub asset0: AccountId,
    pub asset1: AccountId,
    pub tick_spacing: i32,
    pub fee: u32,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = required(&env_map, "DATABASE_PATH")?;
        let rpc_url = required(&env_map, "RPC_URL")?;

        let half_spread = parse_half_spread(
            env_map
                .get("HALF_SPREAD")
                .map(|s| s.as_str())
                .unwrap_or("0"),
        )?;

        let node_addresses = parse_node_addresses(&required(&env_map, "NODE_ADDRESSES")?)?;
        let controller_address =
            parse_account("CONTROLLER_ADDRESS", &required(&env_map, "CONTROLLER_ADDRESS")?)?;
        let fee_recipient = parse_account("FEE_RECIPIENT", &required(&env_map, "FEE_RECIPIENT")?)?;

        let pool_config_file = env_map
            .get("POOL_CONFIG_FILE")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(Config {
            port,
            database_path,
            rpc_url,
            half_spread,
            node_addresses,
            controller_address,
            fee_recipient,
            pool_config_file,
        })
    }
}

fn required(env_map: &HashMap<String, String>, key: &str) -> Result<String, ConfigError> {
    env_map
        .get(key)
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnv(key.to_string()))
}

fn parse_account(key: &str, value: &str) -> Result<AccountId, ConfigError> {
    AccountId::from_str(value)
        .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string()))
}

fn parse_half_spread(value: &str) -> Result<Ray, ConfigError> {
    let invalid = |msg: String| ConfigError::InvalidValue("HALF_SPREAD".to_string(), msg);
    let rate = Decimal::from_str(value.trim()).map_err(|e| invalid(e.to_string()))?;
    if rate >= Decimal::ONE {
        return Err(invalid("must be below 1".to_string()));
    }
    Ray::from_decimal(rate).map_err(|e| invalid(e.to_string()))
}

fn parse_node_addresses(value: &str) -> Result<Vec<AccountId>, ConfigError> {
    let nodes = value
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| parse_account("NODE_ADDRESSES", s))
        .collect::<Result<Vec<_>, _>>()?;
    if nodes.is_empty() {
        return Err(ConfigError::InvalidValue(
            "NODE_ADDRESSES".to_string(),
            "at least one node address is required".to_string(),
        ));
    }
    Ok(nodes)
}

/// Read `asset0,asset1,tick_spacing,fee` rows. A header line is expected.
pub fn load_pool_configs(path: impl AsRef<Path>) -> Result<Vec<PoolConfigRow>, ConfigError> {
    let invalid = |msg: String| ConfigError::InvalidValue("POOL_CONFIG_FILE".to_string(), msg);
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path.as_ref())
        .map_err(|e| invalid(e.to_string()))?;

    reader
        .deserialize::<PoolConfigRow>()
        .map(|row| row.map_err(|e| invalid(e.to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const NODE: &str = "0x1111111111111111111111111111111111111111";
    const CONTROLLER: &str = "0x2222222222222222222222222222222222222222";
    const FEES: &str = "0x3333333333333333333333333333333333333333";

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("DATABASE_PATH".to_string(), "/tmp/test.db".to_string());
        map.insert("RPC_URL".to_string(), "http://localhost:8545".to_string());
        map.insert("NODE_ADDRESSES".to_string(), NODE.to_string());
        map.insert("CONTROLLER_ADDRESS".to_string(), CONTROLLER.to_string());
        map.insert("FEE_RECIPIENT".to_string(), FEES.to_string());
        map
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env_map(setup_required_env()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.half_spread, Ray::ZERO);
        assert_eq!(config.node_addresses, vec![AccountId::from_str(NODE).unwrap()]);
        assert!(config.pool_config_file.is_none());
    }

    #[test]
    fn test_missing_database_path() {
        let mut env_map = setup_required_env();
        env_map.remove("DATABASE_PATH");
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "DATABASE_PATH"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_missing_rpc_url() {
        let mut env_map = setup_required_env();
        env_map.remove("RPC_URL");
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "RPC_URL"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_missing_fee_recipient() {
        let mut env_map = setup_required_env();
        env_map.remove("FEE_RECIPIENT");
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "FEE_RECIPIENT"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_invalid_port() {
        let mut env_map = setup_required_env();
        env_map.insert("PORT".to_string(), "not_a_number".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "PORT"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_half_spread_parsed_as_ray() {
        let mut env_map = setup_required_env();
        env_map.insert("HALF_SPREAD".to_string(), "0.0015".to_string());
        let config = Config::from_env_map(env_map).unwrap();
        assert_eq!(config.half_spread, Ray::from_ratio(15, 10_000).unwrap());
    }

    #[test]
    fn test_half_spread_out_of_range() {
        let mut env_map = setup_required_env();
        env_map.insert("HALF_SPREAD".to_string(), "1.5".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "HALF_SPREAD"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_node_addresses_list() {
        let mut env_map = setup_required_env();
        env_map.insert("NODE_ADDRESSES".to_string(), format!("{}, {},", NODE, CONTROLLER));
        let config = Config::from_env_map(env_map).unwrap();
        assert_eq!(config.node_addresses.len(), 2);
    }

    #[test]
    fn test_empty_node_addresses() {
        let mut env_map = setup_required_env();
        env_map.insert("NODE_ADDRESSES".to_string(), " , ".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "NODE_ADDRESSES"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_controller_address() {
        let mut env_map = setup_required_env();
        env_map.insert("CONTROLLER_ADDRESS".to_string(), "0x12".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "CONTROLLER_ADDRESS"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_load_pool_configs() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "asset0,asset1,tick_spacing,fee").unwrap();
        writeln!(file, "{}, {}, 60, 3000", NODE, CONTROLLER).unwrap();
        writeln!(file, "{},{},10,500", CONTROLLER, FEES).unwrap();

        let rows = load_pool_configs(file.path()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].tick_spacing, 60);
        assert_eq!(rows[0].fee, 3000);
        assert_eq!(rows[1].asset1, AccountId::from_str(FEES).unwrap());
    }

    #[test]
    fn test_load_pool_configs_bad_row() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "asset0,asset1,tick_spacing,fee").unwrap();
        writeln!(file, "{},{},sixty,3000", NODE, CONTROLLER).unwrap();
        match load_pool_configs(file.path()) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "POOL_CONFIG_FILE"),
            _ => panic!("Expected InvalidValue error"),
        }
    }
}
