//! Per-client request throttle.
//!
//! Each client gets a fixed window (15 minutes by default) allowing a set
//! number of requests (100 by default). Rejected requests are not counted.
//! State lives only in memory and is lost on restart.

mod window;

use std::sync::Mutex;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use window::ClientWindow;

/// Windows are pruned once this many clients are tracked.
const PRUNE_THRESHOLD: usize = 10_000;

/// New clients are rejected while this many are tracked.
const MAX_TRACKED_CLIENTS: usize = 100_000;

/// Throttle limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Window length in seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Requests admitted per client per window.
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    /// Identify clients by the `X-Forwarded-For` hop appended by the proxy in
    /// front of the service instead of the peer address. Only enable behind
    /// a proxy that sets the header.
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

fn default_window_secs() -> u64 {
    15 * 60
}

fn default_max_requests() -> u32 {
    100
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            max_requests: default_max_requests(),
            trust_forwarded_for: false,
        }
    }
}

impl ThrottleConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Admits or rejects requests per client identity.
#[derive(Debug)]
pub struct RequestThrottle {
    config: ThrottleConfig,
    clients: DashMap<String, ClientWindow>,
    last_prune: Mutex<Instant>,
}

impl Default for RequestThrottle {
    fn default() -> Self {
        Self::new(ThrottleConfig::default())
    }
}

impl RequestThrottle {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            clients: DashMap::new(),
            last_prune: Mutex::new(Instant::now()),
        }
    }

    /// Whether clients are identified by `X-Forwarded-For`.
    pub fn trusts_forwarded_for(&self) -> bool {
        self.config.trust_forwarded_for
    }

    /// Count a request from `client`, returning false once its quota is used up.
    pub fn admit(&self, client: &str) -> bool {
        let now = Instant::now();
        let window = self.config.window();

        if self.clients.len() > PRUNE_THRESHOLD {
            self.prune(now);
        }
        if self.clients.len() >= MAX_TRACKED_CLIENTS && !self.clients.contains_key(client) {
            warn!("Throttle table full, rejecting new client {}", client);
            return false;
        }

        let admitted = self
            .clients
            .entry(client.to_string())
            .or_insert_with(|| ClientWindow::new(now))
            .try_admit(now, window, self.config.max_requests);

        if admitted {
            debug!("Admitted request from {}", client);
        } else {
            warn!("Throttled client {}", client);
        }
        admitted
    }

    /// Time until `client` may be admitted again (zero if it may be now).
    pub fn retry_after(&self, client: &str) -> Duration {
        let now = Instant::now();
        match self.clients.get(client) {
            Some(w) if w.count >= self.config.max_requests => {
                w.remaining(now, self.config.window())
            }
            Some(_) => Duration::ZERO,
            None if self.clients.len() >= MAX_TRACKED_CLIENTS => self.until_next_prune(now),
            None => Duration::ZERO,
        }
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }

    /// Drop elapsed windows, at most once per window length.
    fn prune(&self, now: Instant) {
        let window = self.config.window();
        {
            let mut last = self.last_prune.lock().unwrap_or_else(|e| e.into_inner());
            if now.saturating_duration_since(*last) < window {
                return;
            }
            *last = now;
        }

        let before = self.clients.len();
        self.clients.retain(|_, w| !w.has_elapsed(now, window));
        debug!(
            "Pruned {} expired throttle windows",
            before.saturating_sub(self.clients.len())
        );
    }

    fn until_next_prune(&self, now: Instant) -> Duration {
        let last = *self.last_prune.lock().unwrap_or_else(|e| e.into_inner());
        self.config
            .window()
            .saturating_sub(now.saturating_duration_since(last))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn throttle(window_secs: u64, max_requests: u32) -> RequestThrottle {
        RequestThrottle::new(ThrottleConfig {
            window_secs,
            max_requests,
            ..Default::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_hundredth_admitted_hundred_first_rejected() {
        let throttle = RequestThrottle::default();

        for i in 1..=100 {
            assert!(throttle.admit("10.0.0.1"), "request {} rejected", i);
        }
        assert!(!throttle.admit("10.0.0.1"));
        assert!(!throttle.admit("10.0.0.1"));

        tokio::time::advance(Duration::from_secs(15 * 60)).await;
        assert!(throttle.admit("10.0.0.1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clients_counted_separately() {
        let throttle = throttle(60, 2);

        assert!(throttle.admit("a"));
        assert!(throttle.admit("a"));
        assert!(!throttle.admit("a"));
        assert!(throttle.admit("b"));
        assert_eq!(throttle.tracked_clients(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_not_extended_by_rejections() {
        let throttle = throttle(60, 1);

        assert!(throttle.admit("a"));
        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(!throttle.admit("a"));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(throttle.admit("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_counts_down() {
        let throttle = throttle(600, 1);

        assert_eq!(throttle.retry_after("a"), Duration::ZERO);
        throttle.admit("a");
        tokio::time::advance(Duration::from_secs(100)).await;
        assert!(!throttle.admit("a"));
        assert_eq!(throttle.retry_after("a"), Duration::from_secs(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_windows_pruned() {
        let throttle = throttle(60, 5);
        for i in 0..=PRUNE_THRESHOLD {
            throttle.admit(&format!("client-{}", i));
        }
        tokio::time::advance(Duration::from_secs(61)).await;

        throttle.admit("late");
        assert_eq!(throttle.tracked_clients(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_runs_at_most_once_per_window() {
        let throttle = throttle(60, 5);
        throttle.admit("early");

        tokio::time::advance(Duration::from_secs(30)).await;
        for i in 0..PRUNE_THRESHOLD {
            throttle.admit(&format!("client-{}", i));
        }

        // "early" has expired and gets pruned; the batch is still live
        tokio::time::advance(Duration::from_secs(31)).await;
        throttle.admit("trigger");
        assert_eq!(throttle.tracked_clients(), PRUNE_THRESHOLD + 1);

        // The batch has now expired too, but the last prune was too recent
        tokio::time::advance(Duration::from_secs(30)).await;
        throttle.admit("next");
        assert_eq!(throttle.tracked_clients(), PRUNE_THRESHOLD + 2);

        tokio::time::advance(Duration::from_secs(30)).await;
        throttle.admit("later");
        assert_eq!(throttle.tracked_clients(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_clients_rejected_when_table_full() {
        let throttle = throttle(60, 5);
        for i in 0..MAX_TRACKED_CLIENTS {
            assert!(throttle.admit(&format!("client-{}", i)));
        }

        assert!(!throttle.admit("newcomer"));
        assert_eq!(throttle.tracked_clients(), MAX_TRACKED_CLIENTS);
        assert!(throttle.retry_after("newcomer") > Duration::ZERO);
        assert!(throttle.admit("client-7"));
    }

    #[test]
    fn test_config_defaults() {
        let config: ThrottleConfig = toml::from_str("").unwrap();
        assert_eq!(config, ThrottleConfig::default());
        assert_eq!(config.window(), Duration::from_secs(900));
        assert_eq!(config.max_requests, 100);
        assert!(!config.trust_forwarded_for);
    }
}
