//! Notification bus for job state changes.

use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll};

use futures_util::Stream;
use jobs_core::JobNotification;
use tokio::sync::mpsc;

/// Publish/subscribe channel for job notifications.
///
/// Delivery is at-least-once to every live subscriber. Subscribers only see
/// notifications published after they subscribed.
pub trait NotificationBus: Send + Sync + 'static {
    fn publish(&self, notification: JobNotification);

    fn subscribe(&self) -> Subscription;
}

/// Receiving end of a bus subscription.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<JobNotification>,
}

impl Subscription {
    pub fn new(rx: mpsc::UnboundedReceiver<JobNotification>) -> Self {
        Self { rx }
    }

    /// Wait for the next notification. `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<JobNotification> {
        self.rx.recv().await
    }

    /// Take a notification if one is already queued.
    pub fn try_recv(&mut self) -> Option<JobNotification> {
        self.rx.try_recv().ok()
    }

    /// Run `handler` for every notification on a background task.
    pub fn spawn_handler<F>(mut self, mut handler: F) -> tokio::task::JoinHandle<()>
    where
        F: FnMut(JobNotification) + Send + 'static,
    {
        tokio::spawn(async move {
            while let Some(notification) = self.rx.recv().await {
                handler(notification);
            }
        })
    }
}

impl Stream for Subscription {
    type Item = JobNotification;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// In-process fan-out bus.
///
/// - One unbounded channel per subscriber, so nothing is dropped
/// - Dead subscribers are pruned while publishing
#[derive(Debug, Default)]
pub struct InProcessBus {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<JobNotification>>>,
}

impl InProcessBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscribers as of the last publish.
    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::UnboundedSender<JobNotification>>> {
        // A panicking publisher cannot leave the sender list half-updated.
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl NotificationBus for InProcessBus {
    fn publish(&self, notification: JobNotification) {
        let mut subs = self.lock();
        subs.retain(|tx| tx.send(notification.clone()).is_ok());
    }

    fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(tx);
        Subscription::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use jobs_core::{Job, JobStatus, JobType};

    fn notification(status: JobStatus) -> JobNotification {
        let mut job = Job::new(JobType::Ocr, "lesson-1", 3);
        job.status = status;
        JobNotification::new(None, job)
    }

    #[tokio::test]
    async fn every_subscriber_receives_in_publish_order() {
        let bus = InProcessBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(notification(JobStatus::Queued));
        bus.publish(notification(JobStatus::Processing));

        assert_eq!(a.recv().await.unwrap().new_status, JobStatus::Queued);
        assert_eq!(a.recv().await.unwrap().new_status, JobStatus::Processing);
        assert_eq!(b.next().await.unwrap().new_status, JobStatus::Queued);
        assert_eq!(b.next().await.unwrap().new_status, JobStatus::Processing);
    }

    #[tokio::test]
    async fn late_subscribers_do_not_see_earlier_events() {
        let bus = InProcessBus::new();
        bus.publish(notification(JobStatus::Queued));

        let mut late = bus.subscribe();
        assert!(late.try_recv().is_none());

        bus.publish(notification(JobStatus::Completed));
        assert_eq!(late.recv().await.unwrap().new_status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn dropped_subscribers_are_pruned() {
        let bus = InProcessBus::new();
        let keep = bus.subscribe();
        drop(bus.subscribe());
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(notification(JobStatus::Queued));
        assert_eq!(bus.subscriber_count(), 1);
        drop(keep);
    }

    #[tokio::test]
    async fn spawned_handler_sees_notifications() {
        let bus = InProcessBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = bus.subscribe().spawn_handler(move |n| {
            let _ = tx.send(n.new_status);
        });

        bus.publish(notification(JobStatus::Failed));
        assert_eq!(rx.recv().await, Some(JobStatus::Failed));
        task.abort();
    }
}
