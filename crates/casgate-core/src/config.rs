//! Gateway configuration.
//!
//! Provides [`GatewayConfig`] for configuring the CasGate service. Values are
//! loaded from environment variables.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Smallest size any multipart part except the last may have.
pub const DEFAULT_MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Largest object a single PutObject may carry.
pub const DEFAULT_MAX_OBJECT_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Gateway configuration.
///
/// # Examples
///
/// ```
/// use casgate_core::config::GatewayConfig;
///
/// let config = GatewayConfig::default();
/// assert_eq!(config.gateway_listen, "0.0.0.0:9000");
/// assert!(config.virtual_hosting);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Bind address for the gateway.
    #[builder(default = String::from("0.0.0.0:9000"))]
    pub gateway_listen: String,

    /// Domain for virtual-hosted-style bucket resolution.
    #[builder(default = String::from("s3.localhost"))]
    pub domain: String,

    /// Whether virtual-hosted-style addressing is enabled.
    #[builder(default = true)]
    pub virtual_hosting: bool,

    /// Whether to skip signature validation on incoming requests.
    #[builder(default = false)]
    pub skip_signature_validation: bool,

    /// Region reported for buckets created without a location constraint.
    #[builder(default = String::from("us-east-1"))]
    pub default_region: String,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"))]
    pub log_level: String,

    /// How long a request may wait for a resource lock, in seconds.
    #[builder(default = 120)]
    pub lock_timeout_secs: u64,

    /// How long a GetObject stream may sit unread before its locks are released.
    #[builder(default = 60)]
    pub stream_idle_timeout_secs: u64,

    /// Minimum size of every multipart part except the last.
    #[builder(default = DEFAULT_MIN_PART_SIZE)]
    pub min_part_size: u64,

    /// Maximum size of a single PutObject body.
    #[builder(default = DEFAULT_MAX_OBJECT_SIZE)]
    pub max_object_size: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `GATEWAY_LISTEN` | `0.0.0.0:9000` |
    /// | `CASGATE_DOMAIN` | `s3.localhost` |
    /// | `CASGATE_VIRTUAL_HOSTING` | `true` |
    /// | `CASGATE_SKIP_SIGNATURE_VALIDATION` | `false` |
    /// | `DEFAULT_REGION` | `us-east-1` |
    /// | `LOG_LEVEL` | `info` |
    /// | `CASGATE_LOCK_TIMEOUT_SECS` | `120` |
    /// | `CASGATE_STREAM_IDLE_TIMEOUT_SECS` | `60` |
    /// | `CASGATE_MIN_PART_SIZE` | `5242880` |
    /// | `CASGATE_MAX_OBJECT_SIZE` | `5368709120` |
    ///
    /// Unparsable numeric values are ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("GATEWAY_LISTEN") {
            config.gateway_listen = v;
        }
        if let Ok(v) = std::env::var("CASGATE_DOMAIN") {
            config.domain = v;
        }
        if let Ok(v) = std::env::var("CASGATE_VIRTUAL_HOSTING") {
            config.virtual_hosting = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("CASGATE_SKIP_SIGNATURE_VALIDATION") {
            config.skip_signature_validation = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("DEFAULT_REGION") {
            config.default_region = v;
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            config.log_level = v;
        }
        if let Some(n) = env_u64("CASGATE_LOCK_TIMEOUT_SECS") {
            config.lock_timeout_secs = n;
        }
        if let Some(n) = env_u64("CASGATE_STREAM_IDLE_TIMEOUT_SECS") {
            config.stream_idle_timeout_secs = n;
        }
        if let Some(n) = env_u64("CASGATE_MIN_PART_SIZE") {
            config.min_part_size = n;
        }
        if let Some(n) = env_u64("CASGATE_MAX_OBJECT_SIZE") {
            config.max_object_size = n;
        }

        config
    }

    /// The lock acquisition timeout.
    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    /// The GetObject stream idle timeout.
    #[must_use]
    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_idle_timeout_secs)
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Parse a string as a boolean, accepting `"1"` and `"true"` (case-insensitive).
pub fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}
