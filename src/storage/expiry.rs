//! Active Expiry
//!
//! Every read path already treats an expired key as absent ("lazy expiry").
//! That alone leaves dead entries stored until something enumerates them,
//! so a server can optionally run a sweeper task that reclaims them in the
//! background.
//!
//! ```text
//!    sleep(interval) ──► lock server ──► sweep every db ──► unlock
//!          ▲                                                   │
//!          └────────── next_interval(stored, expired) ◄────────┘
//! ```
//!
//! The interval adapts: a pass that finds a large share of the stored
//! entries expired halves the interval (down to `min_interval`), an idle
//! pass doubles it (up to `max_interval`).

use crate::server::Server;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, trace};

/// Tuning for the sweeper's adaptive interval.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Interval used for the first pass
    pub base_interval: Duration,
    /// Lower bound when sweeping faster
    pub min_interval: Duration,
    /// Upper bound when backing off
    pub max_interval: Duration,
    /// Expired share of stored entries above which the interval halves
    pub speedup_threshold: f64,
    /// Expired share below which an idle pass doubles the interval
    pub slowdown_threshold: f64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(100),
            min_interval: Duration::from_millis(10),
            max_interval: Duration::from_secs(1),
            speedup_threshold: 0.25,
            slowdown_threshold: 0.01,
        }
    }
}

impl ExpiryConfig {
    /// Picks the interval after a pass that removed `expired` of `stored`
    /// entries.
    pub fn next_interval(&self, current: Duration, stored: usize, expired: u64) -> Duration {
        if stored == 0 {
            return current;
        }
        let share = expired as f64 / stored as f64;
        if share > self.speedup_threshold {
            (current / 2).max(self.min_interval)
        } else if expired == 0 && share < self.slowdown_threshold {
            (current * 2).min(self.max_interval)
        } else {
            current
        }
    }
}

/// Handle to a running sweeper task. Dropping it stops the task.
#[derive(Debug)]
pub struct ExpirySweeper {
    stop_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Spawns the sweeper for `server` on the current Tokio runtime.
    ///
    /// # Arguments
    ///
    /// * `server` - The server whose databases are swept
    /// * `config` - Interval tuning
    pub fn start(server: Arc<Server>, config: ExpiryConfig) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(run(server, config, stop_rx));
        info!("Expiry sweeper started");
        Self { stop_tx }
    }

    /// Asks the task to exit after its current pass.
    pub fn stop(&self) {
        if self.stop_tx.send(true).is_ok() {
            info!("Expiry sweeper stopped");
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run(server: Arc<Server>, config: ExpiryConfig, mut stop_rx: watch::Receiver<bool>) {
    let mut interval = config.base_interval;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    debug!("Expiry sweeper exiting");
                    return;
                }
                continue;
            }
        }

        let (stored, expired) = {
            let mut state = server.lock();
            let stored = state.stored_len();
            (stored, state.sweep_expired())
        };

        let next = config.next_interval(interval, stored, expired);
        if next < interval {
            debug!(
                expired,
                stored,
                interval_ms = next.as_millis() as u64,
                "Many keys expiring, sweeping sooner"
            );
        } else if next > interval {
            trace!(interval_ms = next.as_millis() as u64, "Nothing expired, backing off");
        }
        interval = next;
    }
}

/// Starts a sweeper using `server.config().expiry`.
pub fn start_expiry_sweeper(server: Arc<Server>) -> ExpirySweeper {
    let config = server.config().expiry.clone();
    ExpirySweeper::start(server, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::storage::Value;
    use bytes::Bytes;
    use std::time::Instant;

    fn fill(server: &Server, db: usize, count: usize, ttl: Option<Duration>) {
        let mut state = server.lock();
        for i in 0..count {
            state.db(db).set(
                Bytes::from(format!("key{}:{}", db, i)),
                Value::String(Bytes::from("value")),
                ttl.map(|t| Instant::now() + t),
            );
        }
    }

    #[test]
    fn test_next_interval_bounds() {
        let config = ExpiryConfig::default();
        let base = config.base_interval;

        assert_eq!(config.next_interval(base, 0, 0), base);
        assert_eq!(config.next_interval(base, 10, 5), base / 2);
        assert_eq!(config.next_interval(config.min_interval, 10, 10), config.min_interval);
        assert_eq!(config.next_interval(base, 100, 0), base * 2);
        assert_eq!(config.next_interval(config.max_interval, 100, 0), config.max_interval);
        // some expired, but not enough to speed up
        assert_eq!(config.next_interval(base, 100, 10), base);
    }

    #[tokio::test]
    async fn test_sweep_reclaims_untouched_keys() {
        let server = Arc::new(Server::new(ServerConfig::default()));
        fill(&server, 0, 10, Some(Duration::from_millis(50)));
        fill(&server, 3, 5, Some(Duration::from_millis(50)));
        server
            .lock()
            .db(0)
            .set(Bytes::from("persistent"), Value::String(Bytes::from("v")), None);
        assert_eq!(server.lock().stored_len(), 16);

        let config = ExpiryConfig {
            base_interval: Duration::from_millis(10),
            ..Default::default()
        };
        let _sweeper = ExpirySweeper::start(Arc::clone(&server), config);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(server.lock().stored_len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_handle_stops_sweeping() {
        let server = Arc::new(Server::new(ServerConfig::default()));
        let config = ExpiryConfig {
            base_interval: Duration::from_millis(10),
            ..Default::default()
        };
        {
            let _sweeper = ExpirySweeper::start(Arc::clone(&server), config);
            tokio::time::sleep(Duration::from_millis(30)).await;
        }

        fill(&server, 0, 1, Some(Duration::from_millis(10)));
        tokio::time::sleep(Duration::from_millis(100)).await;

        // still stored, but invisible to reads
        let mut state = server.lock();
        assert_eq!(state.stored_len(), 1);
        assert!(!state.db(0).contains(b"key0:0"));
    }

    #[tokio::test]
    async fn test_mass_expiry_is_cleared() {
        let server = Arc::new(Server::new(ServerConfig::default()));
        fill(&server, 0, 1000, Some(Duration::from_millis(20)));

        let config = ExpiryConfig {
            base_interval: Duration::from_millis(50),
            min_interval: Duration::from_millis(5),
            speedup_threshold: 0.1,
            ..Default::default()
        };
        let _sweeper = ExpirySweeper::start(Arc::clone(&server), config);
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(server.lock().stored_len(), 0);
    }
}
