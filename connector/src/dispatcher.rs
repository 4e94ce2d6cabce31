//! Topic fan-out for server-pushed events.
//!
//! Many subscribers may watch one topic, with different payload types. The
//! payload is decoded once per distinct type per message, and every callback
//! runs in its own isolation boundary: one panicking subscriber is reported
//! to the diagnostic sink and the rest still deliver. This is a deliberate
//! policy choice, recorded in DESIGN.md.
//!
//! No lock is held while callbacks run, so a callback may freely subscribe
//! or unsubscribe, including unsubscribing itself.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde_json::value::RawValue;

use crate::diagnostics::{Diagnostic, DiagnosticSink};

type DecodedPayload = Arc<dyn Any + Send + Sync>;

struct Subscriber {
    id: u64,
    type_id: TypeId,
    /// Flipped by unsubscribe; checked immediately before each invocation so
    /// an unsubscribe from inside a callback takes effect within the same
    /// dispatch.
    cancelled: AtomicBool,
    decode: Box<dyn Fn(&str) -> Result<DecodedPayload, serde_json::Error> + Send + Sync>,
    invoke: Box<dyn Fn(&DecodedPayload) + Send + Sync>,
}

/// Returned from subscribe; passes to unsubscribe.
///
/// The handle is plain data. Dropping it does NOT unsubscribe; subscriptions
/// deliberately outlive any scope (and any single connection) until
/// explicitly removed.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    topic: String,
    id: u64,
}

impl SubscriptionHandle {
    /// The topic this subscription watches.
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

/// Maps topic names to their live subscribers.
pub(crate) struct TopicDispatcher {
    topics: Mutex<HashMap<String, Vec<Arc<Subscriber>>>>,
    next_id: AtomicU64,
}

impl TopicDispatcher {
    pub(crate) fn new() -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn subscribe<E, F>(&self, topic: &str, callback: F) -> SubscriptionHandle
    where
        E: DeserializeOwned + Send + Sync + 'static,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let subscriber = Arc::new(Subscriber {
            id,
            type_id: TypeId::of::<E>(),
            cancelled: AtomicBool::new(false),
            decode: Box::new(|raw| {
                let value: E = serde_json::from_str(raw)?;
                Ok(Arc::new(value) as DecodedPayload)
            }),
            invoke: Box::new(move |value| {
                if let Some(value) = value.downcast_ref::<E>() {
                    callback(value);
                }
            }),
        });

        self.topics
            .lock()
            .unwrap()
            .entry(topic.to_string())
            .or_default()
            .push(subscriber);
        tracing::debug!(topic, id, "subscribed");

        SubscriptionHandle {
            topic: topic.to_string(),
            id,
        }
    }

    pub(crate) fn unsubscribe(&self, handle: &SubscriptionHandle) {
        let mut topics = self.topics.lock().unwrap();
        if let Some(subscribers) = topics.get_mut(&handle.topic) {
            if let Some(position) = subscribers.iter().position(|s| s.id == handle.id) {
                let subscriber = subscribers.remove(position);
                subscriber.cancelled.store(true, Ordering::SeqCst);
                tracing::debug!(topic = %handle.topic, id = handle.id, "unsubscribed");
            }
            if subscribers.is_empty() {
                topics.remove(&handle.topic);
            }
        }
    }

    /// Deliver one event to every live subscriber of `topic`.
    ///
    /// Runs on the serialized receive path; never concurrently with itself.
    pub(crate) fn dispatch(&self, topic: &str, payload: &RawValue, diagnostics: &DiagnosticSink) {
        // Snapshot under the lock, invoke outside it. Subscribers added
        // after this point are too late for this message.
        let snapshot: Vec<Arc<Subscriber>> = match self.topics.lock().unwrap().get(topic) {
            Some(subscribers) => subscribers.clone(),
            None => {
                tracing::trace!(topic, "event with no subscribers");
                return;
            }
        };

        let mut decoded: HashMap<TypeId, Option<DecodedPayload>> = HashMap::new();

        for subscriber in snapshot {
            if subscriber.cancelled.load(Ordering::SeqCst) {
                continue;
            }

            let value = {
                let slot = decoded.entry(subscriber.type_id).or_insert_with(|| {
                    match (subscriber.decode)(payload.get()) {
                        Ok(value) => Some(value),
                        Err(error) => {
                            diagnostics(Diagnostic::SubscriberDecode {
                                topic: topic.to_string(),
                                error: error.to_string(),
                            });
                            None
                        }
                    }
                });
                match slot {
                    Some(value) => Arc::clone(value),
                    None => continue,
                }
            };

            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| (subscriber.invoke)(&value))) {
                diagnostics(Diagnostic::SubscriberPanic {
                    topic: topic.to_string(),
                    message: panic_message(panic),
                });
            }
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "subscriber panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Deserializer};
    use std::sync::atomic::AtomicUsize;

    fn raw(json: &str) -> Box<RawValue> {
        RawValue::from_string(json.to_owned()).unwrap()
    }

    fn collecting_sink() -> (DiagnosticSink, Arc<Mutex<Vec<Diagnostic>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let sink: DiagnosticSink = Arc::new(move |d| sink_seen.lock().unwrap().push(d));
        (sink, seen)
    }

    #[derive(Deserialize)]
    struct Tick {
        value: i64,
    }

    #[test]
    fn fan_out_invokes_every_subscriber_once() {
        let dispatcher = TopicDispatcher::new();
        let (sink, seen) = collecting_sink();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            dispatcher.subscribe("t", move |tick: &Tick| {
                assert_eq!(tick.value, 5);
                calls.fetch_add(1, Ordering::SeqCst);
            });
        }

        dispatcher.dispatch("t", &raw(r#"{"value":5}"#), &sink);

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn panicking_subscriber_does_not_stop_siblings() {
        let dispatcher = TopicDispatcher::new();
        let (sink, seen) = collecting_sink();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = Arc::clone(&calls);
        dispatcher.subscribe("t", move |_: &Tick| {
            first.fetch_add(1, Ordering::SeqCst);
        });
        dispatcher.subscribe("t", |_: &Tick| panic!("boom"));
        let third = Arc::clone(&calls);
        dispatcher.subscribe("t", move |_: &Tick| {
            third.fetch_add(1, Ordering::SeqCst);
        });

        dispatcher.dispatch("t", &raw(r#"{"value":1}"#), &sink);

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(
            matches!(&seen[0], Diagnostic::SubscriberPanic { topic, message } if topic == "t" && message == "boom")
        );
    }

    static DECODE_COUNT: AtomicUsize = AtomicUsize::new(0);

    struct Counted;

    impl<'de> Deserialize<'de> for Counted {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            DECODE_COUNT.fetch_add(1, Ordering::SeqCst);
            serde::de::IgnoredAny::deserialize(deserializer)?;
            Ok(Counted)
        }
    }

    #[test]
    fn payload_decoded_once_per_type() {
        let dispatcher = TopicDispatcher::new();
        let (sink, _) = collecting_sink();

        DECODE_COUNT.store(0, Ordering::SeqCst);
        for _ in 0..3 {
            dispatcher.subscribe("t", |_: &Counted| {});
        }
        dispatcher.dispatch("t", &raw("{}"), &sink);

        assert_eq!(DECODE_COUNT.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn undecodable_payload_reported_once_per_type_others_still_deliver() {
        let dispatcher = TopicDispatcher::new();
        let (sink, seen) = collecting_sink();
        let delivered = Arc::new(AtomicUsize::new(0));

        // Two subscribers expect a struct the payload cannot satisfy.
        dispatcher.subscribe("t", |_: &Tick| panic!("must not be invoked"));
        dispatcher.subscribe("t", |_: &Tick| panic!("must not be invoked"));
        // One subscriber takes any JSON value and must still deliver.
        let ok = Arc::clone(&delivered);
        dispatcher.subscribe("t", move |_: &serde_json::Value| {
            ok.fetch_add(1, Ordering::SeqCst);
        });

        dispatcher.dispatch("t", &raw(r#""just a string""#), &sink);

        assert_eq!(delivered.load(Ordering::SeqCst), 1);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1, "decode failure reported once per type");
        assert!(matches!(&seen[0], Diagnostic::SubscriberDecode { topic, .. } if topic == "t"));
    }

    #[test]
    fn unsubscribe_from_inside_a_callback() {
        let dispatcher = Arc::new(TopicDispatcher::new());
        let (sink, _) = collecting_sink();
        let calls = Arc::new(AtomicUsize::new(0));

        let handle_slot: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::new(Mutex::new(None));
        let inner_dispatcher = Arc::clone(&dispatcher);
        let inner_slot = Arc::clone(&handle_slot);
        let inner_calls = Arc::clone(&calls);
        let handle = dispatcher.subscribe("t", move |_: &serde_json::Value| {
            inner_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(handle) = inner_slot.lock().unwrap().take() {
                inner_dispatcher.unsubscribe(&handle);
            }
        });
        *handle_slot.lock().unwrap() = Some(handle);

        dispatcher.dispatch("t", &raw("1"), &sink);
        dispatcher.dispatch("t", &raw("2"), &sink);

        assert_eq!(calls.load(Ordering::SeqCst), 1, "self-unsubscribed after first event");
    }

    #[test]
    fn unsubscribed_handle_is_inert() {
        let dispatcher = TopicDispatcher::new();
        let (sink, seen) = collecting_sink();
        let calls = Arc::new(AtomicUsize::new(0));

        let counted = Arc::clone(&calls);
        let handle = dispatcher.subscribe("t", move |_: &serde_json::Value| {
            counted.fetch_add(1, Ordering::SeqCst);
        });
        dispatcher.unsubscribe(&handle);
        // Unsubscribing twice is fine.
        dispatcher.unsubscribe(&handle);

        dispatcher.dispatch("t", &raw("null"), &sink);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(seen.lock().unwrap().is_empty());
    }
}
