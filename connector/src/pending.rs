//! Tracking in-flight requests and matching responses.
//!
//! Every request registers an entry here before its frame reaches the
//! transport, so a response racing the send can never be missed. Removal is
//! the only way out of the table, and removal happens exactly once per id:
//! either the matching response takes the entry, or the caller cancels it.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use serde_json::value::RawValue;
use wire::RequestId;

/// Type-erased completion for one request. Runs the caller's parser against
/// the raw payload and resolves the caller's future; returns a description
/// of the parse failure, if any, for the diagnostic sink.
type Resolver = Box<dyn FnOnce(&RawValue) -> Option<String> + Send>;

pub(crate) struct PendingEntry {
    issued_at: Instant,
    resolve: Resolver,
}

impl PendingEntry {
    /// Complete the request with the response payload.
    pub(crate) fn complete(self, payload: &RawValue) -> Option<String> {
        tracing::trace!(elapsed = ?self.issued_at.elapsed(), "resolving request");
        (self.resolve)(payload)
    }
}

/// The shared map from in-flight request id to its awaiting completion.
///
/// The lock guards only the add/remove/lookup critical section; callers run
/// parsers and complete futures after the lock is released, on the entry
/// they removed.
pub(crate) struct PendingRequests {
    entries: Mutex<HashMap<RequestId, PendingEntry>>,
}

impl PendingRequests {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Register a resolver for `id`. Ids come from a monotonic counter, so
    /// an id can never already be present.
    pub(crate) fn insert(&self, id: RequestId, resolve: Resolver) {
        let previous = self.entries.lock().unwrap().insert(
            id,
            PendingEntry {
                issued_at: Instant::now(),
                resolve,
            },
        );
        debug_assert!(previous.is_none(), "request id {id} reused");
    }

    /// Remove and return the entry for `id`, if it is still pending.
    pub(crate) fn take(&self, id: RequestId) -> Option<PendingEntry> {
        self.entries.lock().unwrap().remove(&id)
    }

    /// Drop the entry for `id` without resolving it. No-op when the entry
    /// has already been taken. Returns whether an entry was removed.
    pub(crate) fn cancel(&self, id: RequestId) -> bool {
        self.entries.lock().unwrap().remove(&id).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    #[allow(dead_code)]
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}
