//! Configuration management for the server.

use std::env;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = parse_port(&env::var("PORT").unwrap_or_else(|_| "3000".to_string()))?;

        Ok(Self { host, port })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_port(raw: &str) -> Result<u16, ConfigError> {
    raw.parse()
        .map_err(|_| ConfigError::InvalidPort(raw.to_string()))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid PORT value {0:?}")]
    InvalidPort(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_parsing() {
        assert_eq!(parse_port("8080").unwrap(), 8080);
        assert!(matches!(
            parse_port("http"),
            Err(ConfigError::InvalidPort(raw)) if raw == "http"
        ));
        assert!(parse_port("70000").is_err());
    }

    #[test]
    fn addr_joins_host_and_port() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 3000,
        };
        assert_eq!(config.addr(), "127.0.0.1:3000");
    }
}
