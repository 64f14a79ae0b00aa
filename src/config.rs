use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub scoring_api_url: String,
    pub currency: String,
    /// `None` disables the background reconciliation loop.
    pub reconcile_interval: Option<Duration>,
    pub reconcile_batch_size: usize,
    pub reconcile_concurrency: usize,
    pub league_timeout: Duration,
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
        let scoring_api_url = required(&env_map, "SCORING_API_URL")?;

        let currency = env_map
            .get("CURRENCY")
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| "GBP".to_string());
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(ConfigError::InvalidValue(
                "CURRENCY".to_string(),
                format!("must be a 3-letter upper-case code, got {}", currency),
            ));
        }

        let interval_ms = parse_u64(&env_map, "RECONCILE_INTERVAL_MS", 300_000)?;
        let reconcile_interval = (interval_ms > 0).then(|| Duration::from_millis(interval_ms));

        let reconcile_batch_size = parse_positive(&env_map, "RECONCILE_BATCH_SIZE", 25)?;
        let reconcile_concurrency = parse_positive(&env_map, "RECONCILE_CONCURRENCY", 4)?;

        let league_timeout_ms = parse_positive(&env_map, "LEAGUE_TIMEOUT_MS", 30_000)?;
        let league_timeout = Duration::from_millis(league_timeout_ms as u64);

        Ok(Config {
            port,
            database_path,
            scoring_api_url,
            currency,
            reconcile_interval,
            reconcile_batch_size,
            reconcile_concurrency,
            league_timeout,
        })
    }
}

fn required(env_map: &HashMap<String, String>, key: &str) -> Result<String, ConfigError> {
    env_map
        .get(key)
        .filter(|v| !v.trim().is_empty())
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnv(key.to_string()))
}

fn parse_u64(env_map: &HashMap<String, String>, key: &str, default: u64) -> Result<u64, ConfigError> {
    match env_map.get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
            ConfigError::InvalidValue(key.to_string(), "must be a non-negative integer".to_string())
        }),
    }
}

fn parse_positive(
    env_map: &HashMap<String, String>,
    key: &str,
    default: usize,
) -> Result<usize, ConfigError> {
    let value = match env_map.get(key) {
        None => default,
        Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
            ConfigError::InvalidValue(key.to_string(), "must be a positive integer".to_string())
        })?,
    };
    if value == 0 {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must be greater than 0".to_string(),
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("DATABASE_PATH".to_string(), "/tmp/test.db".to_string());
        map.insert(
            "SCORING_API_URL".to_string(),
            "https://fantasy.example.com".to_string(),
        );
        map
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env_map(setup_required_env()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.currency, "GBP");
        assert_eq!(config.reconcile_interval, Some(Duration::from_millis(300_000)));
        assert_eq!(config.reconcile_batch_size, 25);
        assert_eq!(config.reconcile_concurrency, 4);
        assert_eq!(config.league_timeout, Duration::from_millis(30_000));
    }

    #[test]
    fn test_missing_database_path() {
        let mut env_map = setup_required_env();
        env_map.remove("DATABASE_PATH");
        match Config::from_env_map(env_map) {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "DATABASE_PATH"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_missing_scoring_api_url() {
        let mut env_map = setup_required_env();
        env_map.insert("SCORING_API_URL".to_string(), "  ".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "SCORING_API_URL"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_invalid_port() {
        let mut env_map = setup_required_env();
        env_map.insert("PORT".to_string(), "not_a_number".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "PORT"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_currency() {
        let mut env_map = setup_required_env();
        env_map.insert("CURRENCY".to_string(), "gbp".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "CURRENCY"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_zero_interval_disables_loop() {
        let mut env_map = setup_required_env();
        env_map.insert("RECONCILE_INTERVAL_MS".to_string(), "0".to_string());
        let config = Config::from_env_map(env_map).unwrap();
        assert_eq!(config.reconcile_interval, None);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut env_map = setup_required_env();
        env_map.insert("RECONCILE_BATCH_SIZE".to_string(), "0".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "RECONCILE_BATCH_SIZE"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_concurrency() {
        let mut env_map = setup_required_env();
        env_map.insert("RECONCILE_CONCURRENCY".to_string(), "many".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "RECONCILE_CONCURRENCY"),
            _ => panic!("Expected InvalidValue error"),
        }
    }
}
