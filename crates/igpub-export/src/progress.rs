//! Progress reporting for export jobs.
//!
//! The orchestrator publishes `{packageId, status, message}` events to an
//! opt-in subscriber identified by an opaque socket id. There is no
//! delivery guarantee, no buffering and no replay: a subscriber that
//! connects late misses prior messages. To remove the race between
//! returning the package id and emitting the first event, the broker
//! exposes an explicit subscriber-ready handshake that the orchestrator
//! awaits (bounded by a grace period) before starting the pipeline.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{Notify, broadcast};
use tracing::debug;

/// Buffer size for each subscriber's broadcast channel. Slow receivers
/// lose the oldest events rather than blocking the pipeline.
const CHANNEL_CAPACITY: usize = 256;

/// Status of a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Progress,
    Complete,
    Error,
}

impl std::fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Progress => write!(f, "progress"),
            Self::Complete => write!(f, "complete"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One progress event delivered to a subscriber.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub package_id: String,
    pub status: ProgressStatus,
    pub message: String,
}

struct Subscription {
    sender: broadcast::Sender<ProgressEvent>,
    ready: Notify,
    ready_flag: AtomicBool,
}

impl Subscription {
    fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            ready: Notify::new(),
            ready_flag: AtomicBool::new(false),
        }
    }
}

/// Registry of progress subscriptions keyed by socket id.
///
/// Cloneable and shared between the HTTP layer (which subscribes) and the
/// orchestrator (which publishes).
#[derive(Clone, Default)]
pub struct ProgressBroker {
    subscriptions: Arc<DashMap<String, Arc<Subscription>>>,
}

impl ProgressBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn subscription(&self, socket_id: &str) -> Arc<Subscription> {
        self.subscriptions
            .entry(socket_id.to_string())
            .or_insert_with(|| Arc::new(Subscription::new()))
            .clone()
    }

    /// Subscribes to events for a socket id.
    ///
    /// The receiver only sees events published after this call.
    pub fn subscribe(&self, socket_id: &str) -> broadcast::Receiver<ProgressEvent> {
        self.subscription(socket_id).sender.subscribe()
    }

    /// Marks a subscriber as ready to receive events, releasing any
    /// orchestrator waiting in [`ProgressChannel::await_ready`].
    pub fn mark_ready(&self, socket_id: &str) {
        let sub = self.subscription(socket_id);
        sub.ready_flag.store(true, Ordering::SeqCst);
        sub.ready.notify_waiters();
    }

    /// Removes a subscription once its socket disconnects.
    pub fn remove(&self, socket_id: &str) {
        self.subscriptions.remove(socket_id);
    }

    /// Binds a publish channel for one export job.
    ///
    /// When `socket_id` is `None`, publishing is a silent no-op; progress
    /// reporting is opt-in and never required for an export to function.
    pub fn channel(&self, package_id: &str, socket_id: Option<&str>) -> ProgressChannel {
        ProgressChannel {
            package_id: package_id.to_string(),
            subscription: socket_id.map(|id| self.subscription(id)),
        }
    }
}

impl std::fmt::Debug for ProgressBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressBroker")
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}

/// Narrow publish interface handed to the orchestrator for one job.
#[derive(Clone)]
pub struct ProgressChannel {
    package_id: String,
    subscription: Option<Arc<Subscription>>,
}

impl ProgressChannel {
    /// Creates a channel that publishes nowhere. Used by tests and by
    /// exports requested without a socket id.
    pub fn disabled(package_id: impl Into<String>) -> Self {
        Self {
            package_id: package_id.into(),
            subscription: None,
        }
    }

    pub fn package_id(&self) -> &str {
        &self.package_id
    }

    /// Publishes one event. No-op without a subscriber.
    pub fn publish(&self, status: ProgressStatus, message: impl Into<String>) {
        let Some(sub) = &self.subscription else {
            return;
        };
        let event = ProgressEvent {
            package_id: self.package_id.clone(),
            status,
            message: message.into(),
        };
        // Err means no active receivers; events are fire-and-forget.
        if sub.sender.send(event).is_err() {
            debug!(package_id = %self.package_id, "Progress event dropped, no active subscriber");
        }
    }

    pub fn progress(&self, message: impl Into<String>) {
        self.publish(ProgressStatus::Progress, message);
    }

    pub fn complete(&self, message: impl Into<String>) {
        self.publish(ProgressStatus::Complete, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.publish(ProgressStatus::Error, message);
    }

    /// Waits for the subscriber to signal readiness, bounded by `grace`.
    ///
    /// Resolves immediately when no subscriber was requested or when the
    /// subscriber already signalled. An export must not stall forever on
    /// a subscriber that never connects.
    pub async fn await_ready(&self, grace: Duration) {
        let Some(sub) = &self.subscription else {
            return;
        };
        if sub.ready_flag.load(Ordering::SeqCst) {
            return;
        }
        let notified = sub.ready.notified();
        tokio::pin!(notified);
        // Register the waiter before the final flag check so a
        // mark_ready racing with us is not lost.
        notified.as_mut().enable();
        if sub.ready_flag.load(Ordering::SeqCst) {
            return;
        }
        if tokio::time::timeout(grace, notified).await.is_err() {
            debug!(
                package_id = %self.package_id,
                grace_ms = grace.as_millis() as u64,
                "Subscriber did not become ready within grace period, starting anyway"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscriber_is_noop() {
        let channel = ProgressChannel::disabled("pkg-1");
        // Nothing to assert beyond not panicking.
        channel.progress("working");
        channel.complete("done");
    }

    #[tokio::test]
    async fn test_publish_and_receive() {
        let broker = ProgressBroker::new();
        let mut rx = broker.subscribe("sock-1");
        let channel = broker.channel("pkg-1", Some("sock-1"));

        channel.progress("step one");
        let event = rx.recv().await.unwrap();
        assert_eq!(event.package_id, "pkg-1");
        assert_eq!(event.status, ProgressStatus::Progress);
        assert_eq!(event.message, "step one");
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_prior_events() {
        let broker = ProgressBroker::new();
        let channel = broker.channel("pkg-1", Some("sock-1"));
        channel.progress("missed");

        let mut rx = broker.subscribe("sock-1");
        channel.complete("seen");
        let event = rx.recv().await.unwrap();
        assert_eq!(event.status, ProgressStatus::Complete);
        assert_eq!(event.message, "seen");
    }

    #[tokio::test]
    async fn test_await_ready_released_by_mark_ready() {
        let broker = ProgressBroker::new();
        let channel = broker.channel("pkg-1", Some("sock-1"));

        broker.mark_ready("sock-1");
        // Must resolve well within the grace period.
        tokio::time::timeout(Duration::from_millis(50), channel.await_ready(Duration::from_secs(5)))
            .await
            .expect("await_ready should resolve immediately after mark_ready");
    }

    #[tokio::test]
    async fn test_await_ready_released_by_concurrent_mark_ready() {
        let broker = ProgressBroker::new();
        let channel = broker.channel("pkg-1", Some("sock-1"));

        let waiter = tokio::spawn(async move {
            channel.await_ready(Duration::from_secs(30)).await;
        });
        // Let the waiter register before signalling.
        tokio::time::sleep(Duration::from_millis(10)).await;
        broker.mark_ready("sock-1");
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("await_ready should resolve on mark_ready, not the grace period")
            .unwrap();
    }

    #[tokio::test]
    async fn test_await_ready_times_out_without_subscriber_signal() {
        let broker = ProgressBroker::new();
        let channel = broker.channel("pkg-1", Some("sock-1"));
        let start = std::time::Instant::now();
        channel.await_ready(Duration::from_millis(20)).await;
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_await_ready_immediate_without_socket_id() {
        let channel = ProgressChannel::disabled("pkg-1");
        tokio::time::timeout(Duration::from_millis(10), channel.await_ready(Duration::from_secs(60)))
            .await
            .expect("no subscriber means no waiting");
    }

    #[test]
    fn test_event_serialization_shape() {
        let event = ProgressEvent {
            package_id: "pkg-1".to_string(),
            status: ProgressStatus::Error,
            message: "boom".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["packageId"], "pkg-1");
        assert_eq!(json["status"], "error");
        assert_eq!(json["message"], "boom");
    }
}
