//! Idle shutdown
//!
//! The daemon is socket activated, so it exits once nobody needs it. A
//! running transaction always keeps it alive.

use pkgd_transaction::TransactionManager;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::{self, Instant};

/// Connection count and time of the last client activity
#[derive(Debug)]
pub struct Activity {
    connections: AtomicUsize,
    last: Mutex<Instant>,
}

impl Activity {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connections: AtomicUsize::new(0),
            last: Mutex::new(Instant::now()),
        })
    }

    pub fn touch(&self) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    pub fn connect(self: &Arc<Self>) -> ConnectionGuard {
        self.connections.fetch_add(1, Ordering::SeqCst);
        self.touch();
        ConnectionGuard {
            activity: Arc::clone(self),
        }
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn idle_for(&self) -> Duration {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }
}

/// Counts one open connection until dropped
#[derive(Debug)]
pub struct ConnectionGuard {
    activity: Arc<Activity>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.activity.connections.fetch_sub(1, Ordering::SeqCst);
        self.activity.touch();
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Watchdog {
    /// Limit with no connections; `None` disables idle exit
    idle: Option<Duration>,
    /// Limit while connections stay open without doing anything
    connected_idle: Duration,
}

impl Watchdog {
    pub fn new(idle_secs: u64, connected_idle_secs: u64) -> Self {
        Self {
            idle: (idle_secs > 0).then(|| Duration::from_secs(idle_secs)),
            connected_idle: Duration::from_secs(connected_idle_secs.max(idle_secs)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.idle.is_some()
    }

    pub fn should_exit(&self, connections: usize, active: usize, idle_for: Duration) -> bool {
        let Some(idle) = self.idle else {
            return false;
        };
        if active > 0 {
            return false;
        }
        let limit = if connections == 0 {
            idle
        } else {
            self.connected_idle
        };
        idle_for >= limit
    }

    /// Resolves once the daemon has been idle long enough
    pub async fn wait(self, activity: Arc<Activity>, transactions: Arc<TransactionManager>) {
        if !self.is_enabled() {
            std::future::pending::<()>().await;
        }
        let mut ticker = time::interval(Duration::from_secs(1));
        loop {
            ticker.tick().await;
            let active = transactions.active();
            if active > 0 {
                // time spent in a transaction is not idle time
                activity.touch();
                continue;
            }
            if self.should_exit(activity.connections(), active, activity.idle_for()) {
                tracing::info!(
                    connections = activity.connections(),
                    idle_secs = activity.idle_for().as_secs(),
                    "idle timeout reached"
                );
                return;
            }
        }
    }
}
