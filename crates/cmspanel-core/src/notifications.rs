//! Fixed-interval notification polling.
//!
//! The poller re-fetches the full notification list on every tick and
//! reconciles it with what it saw last time. There is no push channel and
//! no backoff; a failed poll is recorded and the next tick tries again.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError};
use crate::models::Notification;

/// Default seconds between polls
pub const DEFAULT_POLL_SECS: u64 = 30;

#[derive(Debug, Clone, Default)]
pub struct NotificationFeed {
    /// Newest first
    pub items: Vec<Notification>,
    pub unread: usize,
    /// Notifications that first showed up in the latest poll
    pub arrivals: Vec<Notification>,
    pub last_polled: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Set once polling has stopped because the session ended
    pub stopped: bool,
}

impl NotificationFeed {
    /// Replace the list with a fresh fetch and return the notifications
    /// that were not in the previous one. The first reconciliation only
    /// sets the baseline.
    pub fn reconcile(&mut self, mut fetched: Vec<Notification>) -> Vec<Notification> {
        fetched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let arrivals = if self.last_polled.is_some() {
            let known: HashSet<i64> = self.items.iter().map(|n| n.id).collect();
            fetched.iter().filter(|n| !known.contains(&n.id)).cloned().collect()
        } else {
            Vec::new()
        };

        self.items = fetched;
        self.unread = self.items.iter().filter(|n| !n.read).count();
        self.arrivals = arrivals.clone();
        self.last_polled = Some(Utc::now());
        self.last_error = None;
        arrivals
    }

    /// Mark one notification read locally. Returns whether it changed.
    pub fn mark_read(&mut self, id: i64) -> bool {
        match self.items.iter_mut().find(|n| n.id == id && !n.read) {
            Some(notification) => {
                notification.read = true;
                self.unread = self.unread.saturating_sub(1);
                true
            }
            None => false,
        }
    }
}

/// Background task polling `/notifications`. Aborted on drop.
pub struct NotificationPoller {
    feed: watch::Receiver<NotificationFeed>,
    handle: JoinHandle<()>,
}

impl NotificationPoller {
    pub fn spawn(api: ApiClient, interval: Duration) -> Self {
        let (tx, feed) = watch::channel(NotificationFeed::default());
        let handle = tokio::spawn(poll_loop(api, interval, tx));
        Self { feed, handle }
    }

    pub fn feed(&self) -> NotificationFeed {
        self.feed.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<NotificationFeed> {
        self.feed.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn stop(self) {
        // Drop aborts the task
    }
}

impl Drop for NotificationPoller {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn poll_loop(api: ApiClient, interval: Duration, tx: watch::Sender<NotificationFeed>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval_secs = interval.as_secs(), "Notification polling started");

    loop {
        ticker.tick().await;
        match api.notifications().await {
            Ok(fetched) => {
                tx.send_modify(|feed| {
                    let arrivals = feed.reconcile(fetched);
                    if !arrivals.is_empty() {
                        debug!(count = arrivals.len(), "New notifications");
                    }
                });
            }
            Err(ApiError::Unauthorized(_)) => {
                info!("Session ended, notification polling stopped");
                tx.send_modify(|feed| {
                    feed.stopped = true;
                    feed.last_error = Some("Session ended".to_string());
                });
                break;
            }
            Err(e) => {
                warn!(error = %e, "Notification poll failed");
                tx.send_modify(|feed| feed.last_error = Some(e.to_string()));
            }
        }
    }
}
