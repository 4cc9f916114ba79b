//! Configuration for the mirror.

use crate::transport::Headers;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for mirroring documents.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// Directory under which mirrored files are written.
    pub root: PathBuf,
    /// Merge type requested from the remote origin and the local store.
    pub merge_type: String,
    /// `Accept` header sent with subscriptions.
    pub accept: String,
    /// `Content-Type` header sent with edits.
    pub content_type: String,
    /// Optional `Cookie` header sent with edits.
    pub cookie: Option<String>,
    /// Retry configuration for sends and subscriptions.
    pub retry: RetryConfig,
    /// How often pin indexes are re-read.
    pub index_refresh_interval: Duration,
}

impl MirrorConfig {
    /// Creates a configuration mirroring into `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            merge_type: "dt".into(),
            accept: "text/plain".into(),
            content_type: "text/plain".into(),
            cookie: None,
            retry: RetryConfig::default(),
            index_refresh_interval: Duration::from_secs(60 * 60),
        }
    }

    /// Sets the merge type.
    pub fn with_merge_type(mut self, merge_type: impl Into<String>) -> Self {
        self.merge_type = merge_type.into();
        self
    }

    /// Sets the cookie sent with edits.
    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the pin index refresh interval.
    pub fn with_index_refresh_interval(mut self, interval: Duration) -> Self {
        self.index_refresh_interval = interval;
        self
    }

    /// Headers for the long-lived subscription.
    pub fn subscribe_headers(&self) -> Headers {
        Headers::from([
            ("Merge-Type".to_string(), self.merge_type.clone()),
            ("Accept".to_string(), self.accept.clone()),
        ])
    }

    /// Headers for pushing an edit.
    pub fn put_headers(&self) -> Headers {
        let mut headers = Headers::from([
            ("Merge-Type".to_string(), self.merge_type.clone()),
            ("Content-Type".to_string(), self.content_type.clone()),
        ]);
        if let Some(cookie) = &self.cookie {
            headers.insert("Cookie".to_string(), cookie.clone());
        }
        headers
    }
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self::new("./textmirror")
    }
}

/// Configuration for retry behavior.
///
/// Delays start at `initial_delay` and are multiplied by
/// `backoff_multiplier` after every failure, never exceeding `max_delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of attempts, or `None` to retry forever.
    pub max_attempts: Option<u32>,
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: u32,
}

impl RetryConfig {
    /// Creates a configuration that retries forever: 10 ms doubling up to 3 s.
    pub fn new() -> Self {
        Self {
            max_attempts: None,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(3000),
            backoff_multiplier: 2,
        }
    }

    /// Limits the number of attempts.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: u32) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Returns the delay after `failures` consecutive failures (0-indexed).
    pub fn delay_for_attempt(&self, failures: u32) -> Duration {
        let mut delay = self.initial_delay;
        for _ in 0..failures {
            if delay >= self.max_delay {
                break;
            }
            delay = delay.saturating_mul(self.backoff_multiplier);
        }
        delay.min(self.max_delay)
    }

    /// Returns true once `attempts` attempts have used up the budget.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_config_builder() {
        let config = MirrorConfig::new("/tmp/mirror")
            .with_merge_type("simpleton")
            .with_cookie("session=abc")
            .with_index_refresh_interval(Duration::from_secs(5));

        assert_eq!(config.root, PathBuf::from("/tmp/mirror"));
        assert_eq!(config.merge_type, "simpleton");
        assert_eq!(config.cookie.as_deref(), Some("session=abc"));
        assert_eq!(config.index_refresh_interval, Duration::from_secs(5));
    }

    #[test]
    fn headers() {
        let config = MirrorConfig::default();
        let subscribe = config.subscribe_headers();
        assert_eq!(subscribe["Merge-Type"], "dt");
        assert_eq!(subscribe["Accept"], "text/plain");

        let put = config.put_headers();
        assert_eq!(put["Content-Type"], "text/plain");
        assert!(!put.contains_key("Cookie"));

        let put = config.with_cookie("c=1").put_headers();
        assert_eq!(put["Cookie"], "c=1");
    }

    #[test]
    fn retry_delays_double_up_to_the_cap() {
        let config = RetryConfig::new();
        let delays: Vec<u64> = (0..12)
            .map(|n| config.delay_for_attempt(n).as_millis() as u64)
            .collect();
        assert_eq!(
            delays,
            vec![10, 20, 40, 80, 160, 320, 640, 1280, 2560, 3000, 3000, 3000]
        );
        assert_eq!(config.delay_for_attempt(u32::MAX), Duration::from_millis(3000));
    }

    #[test]
    fn retry_budget() {
        assert!(!RetryConfig::new().is_exhausted(1_000_000));
        let config = RetryConfig::new().with_max_attempts(3);
        assert!(!config.is_exhausted(2));
        assert!(config.is_exhausted(3));
    }
}
