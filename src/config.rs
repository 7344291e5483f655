use crate::domain::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

/// Service configuration, loaded from environment variables.
///
/// Business constants (commission rates, pre-deduct price) live here rather
/// than as literals in the engine so they can change without a redeploy.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    /// Per-level commission rates, index 0 = level 1 (nearest ancestor agent).
    pub commission_rates: Vec<Decimal>,
    /// Reservation charged when a marketing instance is created.
    pub pre_deduct_price: Decimal,
    /// Bound on optimistic-concurrency retries before surfacing a conflict.
    pub max_cas_retries: u32,
    /// Interval of the recurring-billing tick in seconds; 0 disables the task.
    pub daily_tick_secs: u64,
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

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let commission_rates = parse_commission_rates(
            env_map
                .get("COMMISSION_RATES")
                .map(|s| s.as_str())
                .unwrap_or("0.30,0.20,0.10"),
        )?;

        let pre_deduct_price = Decimal::from_str(
            env_map
                .get("PRE_DEDUCT_PRICE")
                .map(|s| s.as_str())
                .unwrap_or("100"),
        )
        .map_err(|_| {
            ConfigError::InvalidValue(
                "PRE_DEDUCT_PRICE".to_string(),
                "must be a valid decimal".to_string(),
            )
        })?;
        if !pre_deduct_price.is_positive() {
            return Err(ConfigError::InvalidValue(
                "PRE_DEDUCT_PRICE".to_string(),
                "must be > 0".to_string(),
            ));
        }

        let max_cas_retries = env_map
            .get("MAX_CAS_RETRIES")
            .map(|s| s.as_str())
            .unwrap_or("3")
            .parse::<u32>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "MAX_CAS_RETRIES".to_string(),
                    "must be a valid u32".to_string(),
                )
            })?;

        let daily_tick_secs = env_map
            .get("DAILY_TICK_SECS")
            .map(|s| s.as_str())
            .unwrap_or("86400")
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "DAILY_TICK_SECS".to_string(),
                    "must be a valid u64".to_string(),
                )
            })?;

        Ok(Config {
            port,
            database_path,
            commission_rates,
            pre_deduct_price,
            max_cas_retries,
            daily_tick_secs,
        })
    }

    /// Rate for a 1-based commission level, if configured.
    pub fn commission_rate(&self, level: u8) -> Option<Decimal> {
        if level == 0 {
            return None;
        }
        self.commission_rates.get(level as usize - 1).copied()
    }

    /// Number of ancestor agent levels that earn commission.
    pub fn max_commission_levels(&self) -> u8 {
        self.commission_rates.len() as u8
    }
}

fn parse_commission_rates(raw: &str) -> Result<Vec<Decimal>, ConfigError> {
    let rates: Result<Vec<Decimal>, _> = raw
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(Decimal::from_str)
        .collect();
    let rates = rates.map_err(|_| {
        ConfigError::InvalidValue(
            "COMMISSION_RATES".to_string(),
            "must be comma-separated decimals".to_string(),
        )
    })?;

    if rates.is_empty() || rates.len() > 3 {
        return Err(ConfigError::InvalidValue(
            "COMMISSION_RATES".to_string(),
            format!("expected 1..=3 rates, got {}", rates.len()),
        ));
    }
    for rate in &rates {
        if rate.is_negative() || *rate > Decimal::from_i64(1) {
            return Err(ConfigError::InvalidValue(
                "COMMISSION_RATES".to_string(),
                format!("rate {} out of range [0, 1]", rate),
            ));
        }
    }
    Ok(rates)
}
