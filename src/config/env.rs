//! Environment-variable settings read once at startup.
//!
//! These carry connection strings and the operational knobs that deploys
//! tune without shipping a config file. Values layered on top of the
//! default variant and component configs.

use std::env;
use std::time::Duration;

use tracing::warn;

use super::types::ConfigVariant;

/// Settings assembled from the process environment.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Key-value store connection string, when external.
    pub kv_url: Option<String>,
    /// Vector store connection string, when external.
    pub vector_url: Option<String>,
    /// LLM endpoint.
    pub llm_endpoint: Option<String>,
    /// LLM API key.
    pub llm_api_key: Option<String>,
    /// Queue retry ceiling.
    pub max_retries: u32,
    /// Base retry delay for nacked messages.
    pub retry_delay: Duration,
    /// Queue message TTL.
    pub message_ttl: Duration,
    /// Semantic cache similarity threshold.
    pub cache_similarity_threshold: f32,
    /// Response cache TTL.
    pub cache_ttl: Duration,
    /// Hard per-request LLM cost ceiling in dollars.
    pub max_cost_per_request: f64,
    /// LLM calls allowed per rate-limit window.
    pub rate_limit_max_calls: usize,
    /// Webhook receiving escalated alerts.
    pub escalation_webhook_url: Option<String>,
    /// Pipeline knobs folded into the default variant.
    pub priority_threshold: Option<f32>,
    pub confidence_threshold: Option<f32>,
    pub gap_threshold: Option<f32>,
    pub kw_weight: Option<f32>,
    pub emb_weight: Option<f32>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            kv_url: None,
            vector_url: None,
            llm_endpoint: None,
            llm_api_key: None,
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
            message_ttl: Duration::from_secs(24 * 60 * 60),
            cache_similarity_threshold: 0.95,
            cache_ttl: Duration::from_secs(24 * 60 * 60),
            max_cost_per_request: 0.01,
            rate_limit_max_calls: 60,
            escalation_webhook_url: None,
            priority_threshold: None,
            confidence_threshold: None,
            gap_threshold: None,
            kw_weight: None,
            emb_weight: None,
        }
    }
}

impl Settings {
    /// Read settings from the environment. Malformed values fall back to
    /// defaults with a warning; missing values are simply absent.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            kv_url: read_string("KV_URL"),
            vector_url: read_string("VECTOR_STORE_URL"),
            llm_endpoint: read_string("LLM_ENDPOINT"),
            llm_api_key: read_string("LLM_API_KEY"),
            max_retries: read_parsed("MAX_RETRIES").unwrap_or(defaults.max_retries),
            retry_delay: read_parsed("RETRY_DELAY")
                .map(Duration::from_secs)
                .unwrap_or(defaults.retry_delay),
            message_ttl: read_parsed("MESSAGE_TTL")
                .map(Duration::from_secs)
                .unwrap_or(defaults.message_ttl),
            cache_similarity_threshold: read_parsed("LLM_CACHE_SIMILARITY_THRESHOLD")
                .unwrap_or(defaults.cache_similarity_threshold),
            cache_ttl: read_parsed("LLM_CACHE_TTL")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_ttl),
            max_cost_per_request: read_parsed("MAX_COST_PER_REQUEST")
                .unwrap_or(defaults.max_cost_per_request),
            rate_limit_max_calls: read_parsed("RATE_LIMIT_MAX_CALLS")
                .unwrap_or(defaults.rate_limit_max_calls),
            escalation_webhook_url: read_string("ESCALATION_WEBHOOK_URL"),
            priority_threshold: read_parsed("PRIORITY_THRESHOLD"),
            confidence_threshold: read_parsed("CONFIDENCE_THRESHOLD"),
            gap_threshold: read_parsed("GAP_THRESHOLD"),
            kw_weight: read_parsed("KW_WEIGHT"),
            emb_weight: read_parsed("EMB_WEIGHT"),
        }
    }

    /// Apply pipeline overrides onto a variant.
    pub fn apply_to_variant(&self, variant: &mut ConfigVariant) {
        if let Some(value) = self.priority_threshold {
            variant.priority_threshold = value;
        }
        if let Some(value) = self.confidence_threshold {
            variant.confidence_threshold = value;
        }
        if let Some(value) = self.gap_threshold {
            variant.gap_threshold = value;
        }
        if let Some(value) = self.kw_weight {
            variant.kw_weight = value;
        }
        if let Some(value) = self.emb_weight {
            variant.emb_weight = value;
        }
    }
}

fn read_string(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

fn read_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var = name, value = raw, "unparseable environment value ignored");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.max_retries, 3);
        assert_eq!(settings.retry_delay, Duration::from_secs(5));
        assert!((settings.cache_similarity_threshold - 0.95).abs() < 1e-6);
        assert!((settings.max_cost_per_request - 0.01).abs() < 1e-9);
        assert_eq!(settings.rate_limit_max_calls, 60);
    }

    #[test]
    fn test_apply_to_variant() {
        let settings = Settings {
            kw_weight: Some(0.7),
            emb_weight: Some(0.3),
            priority_threshold: Some(0.85),
            ..Settings::default()
        };
        let mut variant = ConfigVariant::default();
        settings.apply_to_variant(&mut variant);
        assert!((variant.kw_weight - 0.7).abs() < 1e-6);
        assert!((variant.emb_weight - 0.3).abs() < 1e-6);
        assert!((variant.priority_threshold - 0.85).abs() < 1e-6);
        variant.validate().unwrap();
    }
}
