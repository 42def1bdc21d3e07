//! Publish/subscribe unit shared by trackers, the broadcast hub and lap timing

use futures::StreamExt;
use futures::stream::BoxStream;
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use super::registry::{Registry, SubscriberId};
use crate::stream::ThrottleExt;
use crate::types::UpdateRate;

struct TopicInner<T> {
    name: String,
    /// Latest published value, swapped whole
    latest: watch::Sender<Option<Arc<T>>>,
    registry: Registry<T>,
    closed: CancellationToken,
    published: AtomicU64,
}

/// A named stream of immutable values with synchronous fan-out
///
/// `publish` stores the value as the latest one, then invokes every current
/// subscriber on the publishing thread, in registration order, from a copy of
/// the subscriber list taken before the first call. There is no queue: a slow
/// subscriber delays the publisher and every subscriber after it.
///
/// `Topic` is a cheap handle; clones share the same subscribers and value.
pub struct Topic<T> {
    inner: Arc<TopicInner<T>>,
}

impl<T> Clone for Topic<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T> std::fmt::Debug for Topic<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Topic")
            .field("name", &self.inner.name)
            .field("subscribers", &self.inner.registry.len())
            .field("closed", &self.inner.closed.is_cancelled())
            .finish()
    }
}

impl<T: Send + Sync + 'static> Topic<T> {
    pub fn new(name: impl Into<String>) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            inner: Arc::new(TopicInner {
                name: name.into(),
                latest,
                registry: Registry::new(),
                closed: CancellationToken::new(),
                published: AtomicU64::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Publish a value, returning how many subscribers were invoked
    pub fn publish(&self, value: T) -> usize {
        self.publish_arc(Arc::new(value))
    }

    /// Publish an already shared value
    ///
    /// A panicking subscriber is logged and skipped; the remaining subscribers
    /// still receive the value. Publishing to a closed topic does nothing.
    pub fn publish_arc(&self, value: Arc<T>) -> usize {
        let inner = &self.inner;
        if inner.closed.is_cancelled() {
            trace!(topic = %inner.name, "Publish on closed topic ignored");
            return 0;
        }

        inner.latest.send_replace(Some(Arc::clone(&value)));
        inner.published.fetch_add(1, Ordering::Relaxed);

        let subscribers = inner.registry.snapshot();
        for (id, callback) in subscribers.iter() {
            let delivered = catch_unwind(AssertUnwindSafe(|| callback(Arc::clone(&value))));
            if let Err(panic) = delivered {
                error!(topic = %inner.name, subscriber = %id, reason = panic_message(&*panic), "Subscriber panicked");
            }
        }
        subscribers.len()
    }

    /// Register a callback for every subsequent publish
    ///
    /// The callback runs on the publisher's thread and must not block. The
    /// returned handle unsubscribes when consumed or dropped.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Arc<T>) + Send + Sync + 'static,
    {
        let id = self.inner.registry.insert(Arc::new(callback));
        trace!(topic = %self.inner.name, subscriber = %id, "Subscribed");

        let weak: Weak<TopicInner<T>> = Arc::downgrade(&self.inner);
        Subscription {
            topic: self.inner.name.clone(),
            id,
            detach: Some(Box::new(move |id| match weak.upgrade() {
                Some(inner) => {
                    let removed = inner.registry.remove(id);
                    trace!(topic = %inner.name, subscriber = %id, removed, "Unsubscribed");
                    removed
                }
                None => false,
            })),
        }
    }

    /// The most recently published value
    pub fn latest(&self) -> Option<Arc<T>> {
        self.inner.latest.borrow().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Total number of values published
    pub fn published(&self) -> u64 {
        self.inner.published.load(Ordering::Relaxed)
    }

    /// Async stream of values, starting with the current one if any
    ///
    /// Streams observe the latest value when polled, so a slow stream reader
    /// skips intermediate values instead of stalling the publisher. The stream
    /// ends when the topic is closed.
    pub fn updates(&self) -> BoxStream<'static, Arc<T>> {
        let receiver = self.inner.latest.subscribe();
        WatchStream::new(receiver)
            .filter_map(futures::future::ready)
            .take_until(self.inner.closed.clone().cancelled_owned())
            .boxed()
    }

    /// Like [`updates`](Self::updates), throttled to `rate` for a source
    /// publishing at `source_hz`
    pub fn updates_at(&self, rate: UpdateRate, source_hz: f64) -> BoxStream<'static, Arc<T>> {
        match rate.throttle_interval(source_hz) {
            None => self.updates(),
            Some(period) => self.updates().throttle(period).boxed(),
        }
    }

    /// Stop delivering values and end all streams
    pub fn close(&self) {
        if self.inner.closed.is_cancelled() {
            return;
        }
        self.inner.closed.cancel();
        let dropped = self.inner.registry.clear();
        debug!(topic = %self.inner.name, dropped, "Topic closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }
}

impl<T: Default + Send + Sync + 'static> Topic<T> {
    /// Publish the default ("no data") value
    pub fn reset(&self) -> usize {
        self.publish(T::default())
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Handle pairing one `subscribe` with exactly one unsubscribe
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    topic: String,
    id: SubscriberId,
    detach: Option<Box<dyn FnOnce(SubscriberId) -> bool + Send + Sync>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Name of the topic this subscription belongs to
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Remove the callback; returns whether it was still registered
    ///
    /// Once this returns, no publish that starts afterwards invokes the
    /// callback.
    pub fn unsubscribe(mut self) -> bool {
        self.detach.take().is_some_and(|detach| detach(self.id))
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("topic", &self.topic).field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn publish_updates_latest_and_reaches_subscribers() {
        let topic = Topic::new("speed");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = topic.subscribe(move |v: Arc<u32>| sink.lock().push(*v));

        assert_eq!(topic.latest(), None);
        assert_eq!(topic.publish(1), 1);
        assert_eq!(topic.publish(2), 1);

        assert_eq!(*seen.lock(), vec![1, 2]);
        assert_eq!(topic.latest().as_deref(), Some(&2));
        assert_eq!(topic.published(), 2);
    }

    #[test]
    fn unsubscribe_is_exact_once_and_drop_unsubscribes() {
        let topic = Topic::<u32>::new("rpm");
        let a = topic.subscribe(|_| {});
        let b = topic.subscribe(|_| {});
        assert_eq!(topic.subscriber_count(), 2);

        assert!(a.unsubscribe());
        assert_eq!(topic.subscriber_count(), 1);

        drop(b);
        assert_eq!(topic.subscriber_count(), 0);
    }

    #[test]
    fn subscriber_may_unsubscribe_itself_during_publish() {
        let topic = Topic::<u32>::new("self-removal");
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let calls = Arc::new(AtomicUsize::new(0));

        let own = Arc::clone(&slot);
        let counter = Arc::clone(&calls);
        let sub = topic.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            if let Some(sub) = own.lock().take() {
                sub.unsubscribe();
            }
        });
        *slot.lock() = Some(sub);

        let observed = Arc::new(AtomicUsize::new(0));
        let other = Arc::clone(&observed);
        let _second = topic.subscribe(move |_| {
            other.fetch_add(1, Ordering::SeqCst);
        });

        // The in-flight publish still reaches both
        assert_eq!(topic.publish(1), 2);
        assert_eq!(observed.load(Ordering::SeqCst), 1);

        assert_eq!(topic.publish(2), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(observed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn churn_from_another_thread_never_sees_later_publishes() {
        let topic = Topic::<u64>::new("churn");
        let sent = Arc::new(AtomicU64::new(0));
        let done = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let steady = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&steady);
        let _steady = topic.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let publisher = {
            let (topic, sent, done) = (topic.clone(), Arc::clone(&sent), Arc::clone(&done));
            std::thread::spawn(move || {
                let mut i = 0;
                while !done.load(Ordering::SeqCst) {
                    i += 1;
                    sent.store(i, Ordering::SeqCst);
                    topic.publish(i);
                }
                i
            })
        };

        for _ in 0..200 {
            let last = Arc::new(AtomicU64::new(0));
            let sink = Arc::clone(&last);
            let sub = topic.subscribe(move |v| {
                sink.fetch_max(*v, Ordering::SeqCst);
            });
            std::thread::yield_now();
            assert!(sub.unsubscribe());
            let cutoff = sent.load(Ordering::SeqCst);
            std::thread::yield_now();
            assert!(last.load(Ordering::SeqCst) <= cutoff);
        }

        done.store(true, Ordering::SeqCst);
        let published = publisher.join().unwrap();
        assert_eq!(steady.load(Ordering::SeqCst) as u64, published);
        assert_eq!(topic.subscriber_count(), 1);
    }

    #[test]
    fn panicking_subscriber_does_not_affect_others() {
        let topic = Topic::<u32>::new("panics");
        let _bad = topic.subscribe(|_| panic!("subscriber bug"));
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let _good = topic.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(topic.publish(7), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn closed_topics_drop_subscribers_and_ignore_publishes() {
        let topic = Topic::<u32>::new("closing");
        let sub = topic.subscribe(|_| {});
        topic.close();

        assert!(topic.is_closed());
        assert_eq!(topic.publish(1), 0);
        assert_eq!(topic.latest(), None);
        assert!(!sub.unsubscribe());
    }

    #[test]
    fn unsubscribing_after_topic_dropped_is_harmless() {
        let topic = Topic::<u32>::new("gone");
        let sub = topic.subscribe(|_| {});
        drop(topic);
        assert!(!sub.unsubscribe());
    }

    #[test]
    fn reset_publishes_default() {
        let topic = Topic::<String>::new("track");
        topic.publish("spa".to_string());
        topic.reset();
        assert_eq!(topic.latest().as_deref().map(String::as_str), Some(""));
    }

    #[tokio::test]
    async fn updates_start_with_current_value_and_end_on_close() {
        let topic = Topic::<u32>::new("stream");
        topic.publish(5);
        let mut updates = topic.updates();

        assert_eq!(updates.next().await.as_deref(), Some(&5));
        topic.publish(6);
        assert_eq!(updates.next().await.as_deref(), Some(&6));

        topic.close();
        let end = tokio::time::timeout(Duration::from_secs(1), updates.next()).await.unwrap();
        assert!(end.is_none());
    }

    #[tokio::test]
    async fn empty_topic_stream_waits_for_first_value() {
        let topic = Topic::<u32>::new("empty");
        let mut updates = topic.updates_at(UpdateRate::Native, 100.0);

        let publisher = topic.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            publisher.publish(9);
        });

        let first = tokio::time::timeout(Duration::from_secs(1), updates.next()).await.unwrap();
        assert_eq!(first.as_deref(), Some(&9));
    }
}
