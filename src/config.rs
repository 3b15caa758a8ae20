//! Backend connection configuration

use std::time::Duration;

/// Connection and retry settings for the signing backend
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL of the signing backend HTTP API
    pub base_url: String,
    /// Tenant identifier for namespacing backend calls
    pub tenant: String,
    /// Opaque bearer credential attached to every request
    pub auth_token: Option<String>,
    /// Timeout for reference and small inline calls
    pub request_timeout: Duration,
    /// Extended timeout for large inline payloads
    pub large_payload_timeout: Duration,
    /// Attempt budget for reference and small inline calls
    pub max_attempts: u32,
    /// Attempt budget for large inline calls
    pub max_attempts_large: u32,
    /// First retry delay, doubled each attempt
    pub backoff_base: Duration,
    /// Retry delay ceiling
    pub backoff_cap: Duration,
    /// Inline payloads above this many bytes count as large
    pub large_inline_threshold: usize,
    /// Width of the idempotency key time bucket
    pub idempotency_bucket_secs: u64,
    /// How long submit outcomes stay replayable
    pub submit_cache_ttl_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            tenant: "default".to_string(),
            auth_token: None,
            request_timeout: Duration::from_secs(30),
            large_payload_timeout: Duration::from_secs(120),
            max_attempts: 3,
            max_attempts_large: 2,
            backoff_base: Duration::from_millis(100),
            backoff_cap: Duration::from_secs(5),
            large_inline_threshold: 128 * 1024,
            idempotency_bucket_secs: 600,
            submit_cache_ttl_secs: 300,
        }
    }
}

impl BackendConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let base_url = std::env::var("SIGNING_BACKEND_URL")
            .unwrap_or_else(|_| "http://localhost:8080".to_string());

        let tenant = std::env::var("SIGNING_TENANT").unwrap_or_else(|_| "default".to_string());

        let auth_token = std::env::var("SIGNING_AUTH_TOKEN").ok();

        let request_timeout_secs = std::env::var("SIGNING_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        let large_payload_timeout_secs = std::env::var("SIGNING_LARGE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(120);

        let max_attempts = std::env::var("SIGNING_MAX_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3);

        let large_inline_threshold = std::env::var("SIGNING_LARGE_INLINE_BYTES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(128 * 1024);

        Self {
            base_url,
            tenant,
            auth_token,
            request_timeout: Duration::from_secs(request_timeout_secs),
            large_payload_timeout: Duration::from_secs(large_payload_timeout_secs),
            max_attempts,
            large_inline_threshold,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = BackendConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.large_payload_timeout, Duration::from_secs(120));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.max_attempts_large, 2);
        assert_eq!(config.backoff_base, Duration::from_millis(100));
        assert_eq!(config.large_inline_threshold, 128 * 1024);
        assert!(config.auth_token.is_none());
    }

    #[test]
    fn test_large_budget_smaller_than_default() {
        // Large inline payloads get fewer attempts than everything else.
        let config = BackendConfig::default();
        assert!(config.max_attempts_large < config.max_attempts);
        assert!(config.large_payload_timeout > config.request_timeout);
    }
}
