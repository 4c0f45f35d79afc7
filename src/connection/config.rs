use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const URL_SCHEME_PREFIX: &str = "mirror+";

/// Dispatcher queue behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherPolicy {
    /// Maximum number of writes waiting to be sent.
    pub max_queue_len: usize,
    /// Fold queued writes that opt into no-duplicates mode into one request.
    pub coalesce_no_duplicates: bool,
}

impl Default for DispatcherPolicy {
    fn default() -> Self {
        Self {
            max_queue_len: 1_024,
            coalesce_no_duplicates: true,
        }
    }
}

/// Retry behaviour of the transport layer for network failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Initial backoff duration in milliseconds.
    pub initial_backoff_ms: u64,
    /// Maximum backoff duration in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 50,
            max_backoff_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (1-based), doubling each time.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}

/// Local mirror store behaviour.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorePolicy {
    /// Keys that survive `clear()` (logout teardown).
    pub keys_to_preserve_on_clear: Vec<String>,
    /// Where the store snapshot is saved and hydrated from.
    pub snapshot_path: Option<PathBuf>,
}

/// Client configuration
///
/// Similar to a connection string plus pool settings: one endpoint, and the
/// policies for the dispatcher, retries, and the local store.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// Base URL commands are posted to
    pub endpoint: String,

    /// Per-request timeout
    pub request_timeout: Duration,

    /// Optional bearer token sent with every command
    pub auth_token: Option<String>,

    pub dispatcher: DispatcherPolicy,
    pub retry: RetryPolicy,
    pub store: StorePolicy,
}

impl MirrorConfig {
    /// Create a configuration for the given endpoint
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(30),
            auth_token: None,
            dispatcher: DispatcherPolicy::default(),
            retry: RetryPolicy::default(),
            store: StorePolicy::default(),
        }
    }

    /// Set request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the bearer token
    pub fn auth_token(mut self, token: &str) -> Self {
        self.auth_token = Some(token.to_string());
        self
    }

    /// Set the maximum dispatcher queue length
    pub fn max_queue_len(mut self, max: usize) -> Self {
        self.dispatcher.max_queue_len = max;
        self
    }

    /// Enable or disable folding of no-duplicates writes
    pub fn coalesce_no_duplicates(mut self, enabled: bool) -> Self {
        self.dispatcher.coalesce_no_duplicates = enabled;
        self
    }

    /// Set the transport retry policy
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Keep a key through `clear()`
    pub fn preserve_on_clear(mut self, key: &str) -> Self {
        self.store.keys_to_preserve_on_clear.push(key.to_string());
        self
    }

    /// Set the store snapshot file
    pub fn snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store.snapshot_path = Some(path.into());
        self
    }

    /// Parse from connection string
    ///
    /// Format: "mirror+https://host:port/path?timeout_ms=5000&retries=3&token=abc"
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let config = MirrorConfig::from_url("mirror+https://api.example.com/api?retries=5")?;
    /// ```
    pub fn from_url(url: &str) -> Result<Self, String> {
        let Some(rest) = url.strip_prefix(URL_SCHEME_PREFIX) else {
            return Err(format!("URL must start with '{}'", URL_SCHEME_PREFIX));
        };

        if !(rest.starts_with("http://") || rest.starts_with("https://")) {
            return Err("Transport scheme must be http or https".to_string());
        }

        let (endpoint, query) = match rest.split_once('?') {
            Some((endpoint, query)) => (endpoint, Some(query)),
            None => (rest, None),
        };

        let host = endpoint
            .split("://")
            .nth(1)
            .and_then(|after_scheme| after_scheme.split('/').next())
            .unwrap_or_default();
        if host.is_empty() {
            return Err("Missing host".to_string());
        }

        let mut config = Self::new(endpoint);

        for pair in query.into_iter().flat_map(|q| q.split('&')).filter(|p| !p.is_empty()) {
            let (name, value) = pair
                .split_once('=')
                .ok_or_else(|| format!("Invalid query parameter '{}'", pair))?;
            match name {
                "timeout_ms" => {
                    let millis: u64 = value
                        .parse()
                        .map_err(|_| format!("Invalid timeout_ms '{}'", value))?;
                    config.request_timeout = Duration::from_millis(millis);
                }
                "retries" => {
                    config.retry.max_attempts = value
                        .parse()
                        .map_err(|_| format!("Invalid retries '{}'", value))?;
                }
                "token" => config.auth_token = Some(value.to_string()),
                other => return Err(format!("Unknown query parameter '{}'", other)),
            }
        }

        Ok(config)
    }

    /// Convert to connection string
    pub fn to_url(&self) -> String {
        let mut url = format!(
            "{}{}?timeout_ms={}&retries={}",
            URL_SCHEME_PREFIX,
            self.endpoint,
            self.request_timeout.as_millis(),
            self.retry.max_attempts
        );
        if self.auth_token.is_some() {
            url.push_str("&token=***"); // Don't expose the token
        }
        url
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.endpoint.is_empty() {
            return Err("Endpoint cannot be empty".to_string());
        }

        if self.dispatcher.max_queue_len == 0 {
            return Err("max_queue_len must be > 0".to_string());
        }

        if self.retry.max_attempts == 0 {
            return Err("retry.max_attempts must be > 0".to_string());
        }

        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err("retry.initial_backoff_ms cannot exceed retry.max_backoff_ms".to_string());
        }

        Ok(())
    }
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self::new("http://localhost:8080/api")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MirrorConfig::default();
        assert_eq!(config.endpoint, "http://localhost:8080/api");
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.dispatcher.coalesce_no_duplicates);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = MirrorConfig::new("https://api.example.com/api/")
            .request_timeout(Duration::from_secs(5))
            .max_queue_len(16)
            .preserve_on_clear("session")
            .snapshot_path("/tmp/mirror.json");

        assert_eq!(config.endpoint, "https://api.example.com/api");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.dispatcher.max_queue_len, 16);
        assert_eq!(config.store.keys_to_preserve_on_clear, vec!["session"]);
        assert!(config.store.snapshot_path.is_some());
    }

    #[test]
    fn test_from_url() {
        let config = MirrorConfig::from_url(
            "mirror+https://api.example.com:8443/api?timeout_ms=2500&retries=5&token=abc",
        )
        .unwrap();

        assert_eq!(config.endpoint, "https://api.example.com:8443/api");
        assert_eq!(config.request_timeout, Duration::from_millis(2500));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.auth_token.as_deref(), Some("abc"));
        assert!(!config.to_url().contains("abc"));
    }

    #[test]
    fn test_invalid_url() {
        assert!(MirrorConfig::from_url("https://api.example.com").is_err());
        assert!(MirrorConfig::from_url("mirror+ftp://api.example.com").is_err());
        assert!(MirrorConfig::from_url("mirror+https://").is_err());
        assert!(MirrorConfig::from_url("mirror+https://h/api?retries=x").is_err());
        assert!(MirrorConfig::from_url("mirror+https://h/api?color=red").is_err());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let retry = RetryPolicy {
            max_attempts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 300,
        };
        assert_eq!(retry.backoff_for(1), Duration::from_millis(100));
        assert_eq!(retry.backoff_for(2), Duration::from_millis(200));
        assert_eq!(retry.backoff_for(3), Duration::from_millis(300));
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let mut config = MirrorConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }
}
