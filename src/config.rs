//! Runtime configuration
//!
//! Configuration is read from environment variables with typed defaults.
//!
//! Environment Variables:
//! - `OPTIQ_MAX_QUERY_PLANS` - cap on plans costed per enumeration call
//! - `OPTIQ_OPTIMIZATION_TIMEOUT` - wall-clock bound, e.g. `30s` or `500ms`
//! - `OPTIQ_ENABLE_COST_BASED_OPTIMIZER` - gate for the cost strategy
//! - `OPTIQ_ENABLE_RULE_BASED_OPTIMIZER` - gate for the rule strategy

use std::env;
use std::time::Duration;

use thiserror::Error;

/// Default cap on plans evaluated per enumeration call
pub const DEFAULT_MAX_QUERY_PLANS: usize = 1000;

/// Default upper wall-clock bound for one optimization call
pub const DEFAULT_OPTIMIZATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration error
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
}

/// Optimizer configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Cap on the number of plans costed per enumeration call
    pub max_query_plans: usize,
    /// Upper wall-clock bound; enforced by the surrounding layer
    pub optimization_timeout: Duration,
    /// When false, the cost strategy reduces to the rule strategy
    pub enable_cost_based_optimizer: bool,
    /// When false, the rule strategy returns the input unchanged
    pub enable_rule_based_optimizer: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_query_plans: DEFAULT_MAX_QUERY_PLANS,
            optimization_timeout: DEFAULT_OPTIMIZATION_TIMEOUT,
            enable_cost_based_optimizer: true,
            enable_rule_based_optimizer: true,
        }
    }
}

impl Config {
    /// Load configuration from the environment, falling back to defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            max_query_plans: get_env_usize("OPTIQ_MAX_QUERY_PLANS", DEFAULT_MAX_QUERY_PLANS)?,
            optimization_timeout: get_env_duration(
                "OPTIQ_OPTIMIZATION_TIMEOUT",
                DEFAULT_OPTIMIZATION_TIMEOUT,
            )?,
            enable_cost_based_optimizer: get_env_bool("OPTIQ_ENABLE_COST_BASED_OPTIMIZER", true)?,
            enable_rule_based_optimizer: get_env_bool("OPTIQ_ENABLE_RULE_BASED_OPTIMIZER", true)?,
        })
    }
}

fn get_env_usize(var: &'static str, default: usize) -> Result<usize, ConfigError> {
    match env::var(var) {
        Ok(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
            var,
            value: value.clone(),
        }),
        Err(_) => Ok(default),
    }
}

fn get_env_bool(var: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(var) {
        Ok(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue { var, value }),
        },
        Err(_) => Ok(default),
    }
}

fn get_env_duration(var: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match env::var(var) {
        Ok(value) => parse_duration(&value).ok_or(ConfigError::InvalidValue { var, value }),
        Err(_) => Ok(default),
    }
}

/// Parse durations of the form `30s`, `500ms` or `2m`
fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Some(ms) = value.strip_suffix("ms") {
        return ms.trim().parse::<u64>().ok().map(Duration::from_millis);
    }
    if let Some(secs) = value.strip_suffix('s') {
        return secs.trim().parse::<u64>().ok().map(Duration::from_secs);
    }
    if let Some(mins) = value.strip_suffix('m') {
        return mins
            .trim()
            .parse::<u64>()
            .ok()
            .map(|m| Duration::from_secs(m * 60));
    }
    // Bare numbers are seconds
    value.parse::<u64>().ok().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.max_query_plans, 1000);
        assert_eq!(config.optimization_timeout, Duration::from_secs(30));
        assert!(config.enable_cost_based_optimizer);
        assert!(config.enable_rule_based_optimizer);
    }

    #[test]
    fn test_parse_duration_forms() {
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("45"), Some(Duration::from_secs(45)));
        assert_eq!(parse_duration("banana"), None);
    }
}
