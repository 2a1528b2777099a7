//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::rating::abuse::AbuseThresholds;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Supabase project URL. When unset, an in-memory store is used.
    pub supabase_url: Option<String>,
    /// Supabase service role key (bypasses RLS - server only!)
    pub supabase_service_role_key: Option<String>,
    /// Secret for HS256 bearer token verification
    pub jwt_secret: String,

    /// Allowed client origin for CORS
    pub client_origin: String,

    /// Gameplay and moderation tunables
    pub game: GameConfig,
}

/// Tunables for matchmaking, session cleanup and abuse detection
#[derive(Clone, Debug)]
pub struct GameConfig {
    /// Upper bound on the matchmaking rating tolerance. `None` keeps the
    /// tolerance growing without limit.
    pub tolerance_cap: Option<u32>,
    /// Delay between game over and room/session removal
    pub cleanup_grace: Duration,
    /// Accept a client's own "I was hit" report as a round-ending collision
    pub trust_client_collision: bool,
    /// How often the abuse monitor runs
    pub abuse_interval: Duration,
    /// Detection thresholds and trailing window
    pub abuse: AbuseThresholds,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            tolerance_cap: None,
            cleanup_grace: Duration::from_millis(3000),
            trust_client_collision: true,
            abuse_interval: Duration::from_secs(60),
            abuse: AbuseThresholds::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string())
        };

        let defaults = GameConfig::default();
        let abuse_defaults = defaults.abuse.clone();

        let game = GameConfig {
            tolerance_cap: optional_parsed("MATCHMAKING_TOLERANCE_CAP")?,
            cleanup_grace: Duration::from_millis(
                optional_parsed("CLEANUP_GRACE_MS")?
                    .unwrap_or(defaults.cleanup_grace.as_millis() as u64),
            ),
            trust_client_collision: optional_parsed("TRUST_CLIENT_COLLISION")?
                .unwrap_or(defaults.trust_client_collision),
            abuse_interval: Duration::from_secs(
                optional_parsed("ABUSE_INTERVAL_SECS")?
                    .unwrap_or(defaults.abuse_interval.as_secs()),
            ),
            abuse: AbuseThresholds {
                window: chrono::Duration::minutes(
                    optional_parsed("ABUSE_WINDOW_MINUTES")?
                        .unwrap_or(abuse_defaults.window.num_minutes()),
                ),
                short_match_secs: optional_parsed("ABUSE_SHORT_MATCH_SECS")?
                    .unwrap_or(abuse_defaults.short_match_secs),
                short_win_count: optional_parsed("ABUSE_SHORT_WIN_COUNT")?
                    .unwrap_or(abuse_defaults.short_win_count),
                repeat_pair_count: optional_parsed("ABUSE_REPEAT_PAIR_COUNT")?
                    .unwrap_or(abuse_defaults.repeat_pair_count),
            },
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            supabase_url: env::var("SUPABASE_URL").ok(),
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY").ok(),
            jwt_secret: env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?,

            client_origin: env::var("CLIENT_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),

            game,
        })
    }

    /// Supabase credentials, if both are configured
    pub fn supabase(&self) -> Option<(&str, &str)> {
        match (&self.supabase_url, &self.supabase_service_role_key) {
            (Some(url), Some(key)) => Some((url.as_str(), key.as_str())),
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn for_tests(jwt_secret: &str) -> Self {
        Self {
            server_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            log_level: "debug".to_string(),
            supabase_url: None,
            supabase_service_role_key: None,
            jwt_secret: jwt_secret.to_string(),
            client_origin: "http://localhost:8080".to_string(),
            game: GameConfig::default(),
        }
    }
}

fn optional_parsed<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(None),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
