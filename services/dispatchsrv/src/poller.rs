//! Roster poll timer
//!
//! Refreshes incident and roster on a fixed cadence while a consumer is in
//! the foreground. `start` fetches immediately and then every interval;
//! calling it while running does nothing. `stop` cancels the timer and any
//! fetch in flight, so nothing re-arms after it returns.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::roster::{IncidentView, RosterAggregator, RosterView};

/// Default poll cadence
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Message shown while the upstream cannot be read
pub const UNAVAILABLE_MESSAGE: &str = "Data temporarily unavailable";

/// Latest poll result
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RosterSnapshot {
    /// No poll has completed yet
    Pending,
    Ready {
        incident: IncidentView,
        roster: RosterView,
        updated_at: DateTime<Utc>,
    },
    Unavailable {
        message: String,
        reason: String,
        since: DateTime<Utc>,
    },
}

struct PollTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct RosterPoller {
    aggregator: Arc<RosterAggregator>,
    interval: Duration,
    snapshot: Arc<RwLock<RosterSnapshot>>,
    task: Mutex<Option<PollTask>>,
}

impl RosterPoller {
    pub fn new(aggregator: Arc<RosterAggregator>, interval: Duration) -> Self {
        Self {
            aggregator,
            interval,
            snapshot: Arc::new(RwLock::new(RosterSnapshot::Pending)),
            task: Mutex::new(None),
        }
    }

    fn task_slot(&self) -> MutexGuard<'_, Option<PollTask>> {
        match self.task.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Start polling; returns false when already running
    pub fn start(&self) -> bool {
        let mut slot = self.task_slot();
        if slot.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            debug!("Roster poller already running");
            return false;
        }

        let token = CancellationToken::new();
        let task_token = token.clone();
        let aggregator = Arc::clone(&self.aggregator);
        let snapshot = Arc::clone(&self.snapshot);
        let period = self.interval;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    () = task_token.cancelled() => break,
                    _ = interval.tick() => {},
                }
                tokio::select! {
                    biased;
                    () = task_token.cancelled() => break,
                    () = poll_once(&aggregator, &snapshot) => {},
                }
            }

            debug!("Roster poll loop terminated");
        });

        *slot = Some(PollTask { token, handle });
        info!("Roster polling started ({}s interval)", period.as_secs());
        true
    }

    /// Stop polling; returns false when it was not running
    pub fn stop(&self) -> bool {
        match self.task_slot().take() {
            Some(task) => {
                task.token.cancel();
                info!("Roster polling stopped");
                true
            },
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task_slot()
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    pub async fn snapshot(&self) -> RosterSnapshot {
        self.snapshot.read().await.clone()
    }

    /// Fetch once outside the timer and store the result
    pub async fn refresh(&self) -> RosterSnapshot {
        poll_once(&self.aggregator, &self.snapshot).await;
        self.snapshot().await
    }
}

impl Drop for RosterPoller {
    fn drop(&mut self) {
        if let Some(task) = self.task_slot().take() {
            task.token.cancel();
        }
    }
}

async fn poll_once(aggregator: &RosterAggregator, snapshot: &RwLock<RosterSnapshot>) {
    let next = match aggregator.fetch_state().await {
        Ok((incident, roster)) => {
            debug!(
                "Roster refreshed: {:?}, {} person(s)",
                roster.mode,
                roster.persons.len()
            );
            RosterSnapshot::Ready {
                incident,
                roster,
                updated_at: Utc::now(),
            }
        },
        Err(e) => {
            warn!("Roster refresh failed: {}", e);
            let since = match &*snapshot.read().await {
                RosterSnapshot::Unavailable { since, .. } => *since,
                _ => Utc::now(),
            };
            RosterSnapshot::Unavailable {
                message: UNAVAILABLE_MESSAGE.to_string(),
                reason: e.to_string(),
                since,
            }
        },
    };
    *snapshot.write().await = next;
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::error::{DispatchError, Result};
    use crate::roster::{WidgetEndpoint, WidgetSource};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Counts incident queries; fails while `failing` is set
    #[derive(Default)]
    struct CountingWidget {
        incident_calls: AtomicUsize,
        failing: AtomicBool,
    }

    #[async_trait]
    impl WidgetSource for CountingWidget {
        async fn fetch(&self, endpoint: WidgetEndpoint, _body: &Value) -> Result<Value> {
            if endpoint == WidgetEndpoint::ActiveMissionInfo {
                self.incident_calls.fetch_add(1, Ordering::SeqCst);
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(DispatchError::upstream(endpoint.as_str(), "HTTP 500"));
            }
            Ok(match endpoint {
                WidgetEndpoint::ActiveMissionInfo => json!({"error": "no mission"}),
                _ => json!({"persons": {"available": [{"name": "Anna"}], "absent": [], "unavailable": []}}),
            })
        }
    }

    fn poller(widget: Arc<CountingWidget>) -> RosterPoller {
        RosterPoller::new(
            Arc::new(RosterAggregator::new(widget)),
            DEFAULT_POLL_INTERVAL,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_fetches_immediately_then_every_interval() {
        let widget = Arc::new(CountingWidget::default());
        let poller = poller(widget.clone());

        assert!(poller.start());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(widget.incident_calls.load(Ordering::SeqCst), 1);
        assert!(matches!(poller.snapshot().await, RosterSnapshot::Ready { .. }));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(widget.incident_calls.load(Ordering::SeqCst), 2);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(widget.incident_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let widget = Arc::new(CountingWidget::default());
        let poller = poller(widget.clone());

        assert!(poller.start());
        assert!(!poller.start());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(widget.incident_calls.load(Ordering::SeqCst), 1);
        assert!(poller.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_prevents_further_ticks() {
        let widget = Arc::new(CountingWidget::default());
        let poller = poller(widget.clone());

        poller.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(poller.stop());
        assert!(!poller.stop());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(widget.incident_calls.load(Ordering::SeqCst), 1);
        assert!(!poller.is_running());

        // restart after stop fetches again right away
        assert!(poller.start());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(widget.incident_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_marks_unavailable_and_keeps_ticking() {
        let widget = Arc::new(CountingWidget::default());
        widget.failing.store(true, Ordering::SeqCst);
        let poller = poller(widget.clone());

        poller.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        match poller.snapshot().await {
            RosterSnapshot::Unavailable { message, reason, .. } => {
                assert_eq!(message, UNAVAILABLE_MESSAGE);
                assert!(reason.contains("HTTP 500"));
            },
            other => panic!("unexpected snapshot {:?}", other),
        }

        widget.failing.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(widget.incident_calls.load(Ordering::SeqCst), 2);
        assert!(matches!(poller.snapshot().await, RosterSnapshot::Ready { .. }));
    }

    #[tokio::test]
    async fn test_refresh_without_timer() {
        let widget = Arc::new(CountingWidget::default());
        let poller = poller(widget.clone());
        match poller.refresh().await {
            RosterSnapshot::Ready { roster, .. } => assert_eq!(roster.persons[0].name, "Anna"),
            other => panic!("unexpected snapshot {:?}", other),
        }
        assert!(!poller.is_running());
    }
}
