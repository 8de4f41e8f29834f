//! Configuration management for Tollgate.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;

use crate::auth::ScopeRule;
use crate::limiter::LimiterKey;

/// Main configuration for the Tollgate service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TollgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

impl Default for TollgateConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            rate_limiting: RateLimitingConfig::default(),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address for the viewer-request hook
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    "127.0.0.1:8080".parse().unwrap()
}

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Identity pool the verifier validates token issuers against
    #[serde(default = "default_user_pool_id")]
    pub user_pool_id: String,

    /// HS256 signing secret for token verification
    #[serde(default)]
    pub jwt_secret: String,

    /// Scope-to-path authorization rules
    #[serde(default)]
    pub scopes: HashMap<String, ScopeRule>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            user_pool_id: default_user_pool_id(),
            jwt_secret: String::new(),
            scopes: HashMap::new(),
        }
    }
}

fn default_user_pool_id() -> String {
    "local-pool".to_string()
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Counter table name
    #[serde(default = "default_table_name")]
    pub table_name: String,

    /// Limiter used when no valid selection header is present
    #[serde(default = "default_limiter")]
    pub default_limiter: LimiterKey,

    /// Honor the x-rate-limiter request header
    #[serde(default)]
    pub configurable_via_header: bool,

    /// Deadline for each remote store call, in milliseconds
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            table_name: default_table_name(),
            default_limiter: default_limiter(),
            configurable_via_header: false,
            store_timeout_ms: default_store_timeout_ms(),
        }
    }
}

fn default_table_name() -> String {
    "rate-limiter".to_string()
}

fn default_limiter() -> LimiterKey {
    LimiterKey::HybridV2
}

fn default_store_timeout_ms() -> u64 {
    300
}

impl TollgateConfig {
    /// Load configuration from a file path.
    pub fn from_file(path: &str) -> crate::error::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: TollgateConfig = serde_yaml::from_str(&contents)
            .map_err(|e| crate::error::TollgateError::Config(e.to_string()))?;
        Ok(config)
    }
}
