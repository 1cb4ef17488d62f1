//! Request deduplication
//!
//! Concurrent requests with the same signature share one in-flight call. An
//! entry lives in the table only while its call is unsettled: it is removed
//! as soon as the call resolves, fails, or is abandoned by every caller.

use std::{
    fmt,
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use dashmap::{mapref::entry::Entry as MapEntry, DashMap};
use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use serde_json::Value as JsonValue;

use crate::core::ClientResult;

type PendingFuture<T> = BoxFuture<'static, ClientResult<T>>;

/// Deterministic lookup key built from the endpoint and the serialized body
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestSignature(String);

impl RequestSignature {
    pub fn new(url: &str, body: &JsonValue) -> Self {
        Self(format!("{url}-{body}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

struct PendingEntry<T: Clone> {
    id: u64,
    pending: WeakShared<PendingFuture<T>>,
}

type PendingTable<T> = DashMap<RequestSignature, PendingEntry<T>>;

/// Removes its own table entry when the pending call is finished or dropped.
///
/// The id check keeps a stale entry from evicting a newer call registered
/// under the same signature.
struct EntryCleanup<T: Clone> {
    table: Arc<PendingTable<T>>,
    signature: RequestSignature,
    id: u64,
}

impl<T: Clone> Drop for EntryCleanup<T> {
    fn drop(&mut self) {
        let id = self.id;
        if self
            .table
            .remove_if(&self.signature, |_, entry| entry.id == id)
            .is_some()
        {
            log::debug!("Request settled, removed pending entry: {}", self.signature);
        }
    }
}

/// Table of in-flight requests keyed by [`RequestSignature`]
pub struct RequestDeduplicator<T: Clone> {
    table: Arc<PendingTable<T>>,
    next_id: AtomicU64,
}

impl<T: Clone> Default for RequestDeduplicator<T> {
    fn default() -> Self {
        Self {
            table: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<T> RequestDeduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `perform` under `signature`, or join the call already in flight.
    ///
    /// With `skip_dedup` set a new call is always started; it replaces any
    /// entry for the same signature so later callers join the newer call.
    pub async fn execute<F, Fut>(
        &self,
        signature: RequestSignature,
        perform: F,
        skip_dedup: bool,
    ) -> ClientResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ClientResult<T>> + Send + 'static,
    {
        self.register(signature, perform, skip_dedup).await
    }

    fn register<F, Fut>(
        &self,
        signature: RequestSignature,
        perform: F,
        skip_dedup: bool,
    ) -> Shared<PendingFuture<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ClientResult<T>> + Send + 'static,
    {
        let slot = self.table.entry(signature.clone());

        if !skip_dedup {
            if let MapEntry::Occupied(occupied) = &slot {
                if let Some(pending) = occupied.get().pending.upgrade() {
                    log::debug!("Returning existing request: {signature}");
                    return pending;
                }
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cleanup = EntryCleanup {
            table: Arc::clone(&self.table),
            signature,
            id,
        };
        let work = perform();
        let shared = async move {
            let _cleanup = cleanup;
            work.await
        }
        .boxed()
        .shared();

        match shared.downgrade() {
            Some(pending) => {
                slot.insert(PendingEntry { id, pending });
            }
            // only a completed future has no weak handle; nothing to track
            None => drop(slot),
        }

        shared
    }

    /// Drop every tracked entry. Calls already in flight keep running for
    /// the callers attached to them, but no new caller can join them.
    pub fn clear(&self) {
        let dropped = self.table.len();
        self.table.clear();
        if dropped > 0 {
            log::info!("Cleared {dropped} pending request(s)");
        }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn contains(&self, signature: &RequestSignature) -> bool {
        self.table.contains_key(signature)
    }
}
