//! Cache-aside orchestrator: wraps every adapter call with a cache read,
//! a deduplicated upstream fetch on miss, and a best-effort write-back.
//!
//! The dedup guarantee is process-wide: at most one concurrent upstream
//! call per cache key, across all requests. Concurrent misses for the same
//! key attach to the leader's in-flight call and receive its result -
//! success or failure - identically.
//!
//! The cache is a performance optimization, never a correctness dependency:
//! a failed read degrades to a miss and a failed write to a no-op, logged
//! but invisible to callers.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::cache::{CacheEntry, CacheKey, CacheStore};
use crate::error::UpstreamError;

/// Where a tool result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    Cache,
    Live,
}

/// Outcome of one upstream fetch, broadcast to every waiter.
pub type FetchOutcome = Result<Value, UpstreamError>;

type FlightReceiver = watch::Receiver<Option<FetchOutcome>>;
type FlightRegistry = Mutex<HashMap<String, FlightReceiver>>;

enum Role {
    Leader(watch::Sender<Option<FetchOutcome>>),
    Waiter(FlightReceiver),
}

pub struct Orchestrator {
    store: Arc<dyn CacheStore>,
    in_flight: FlightRegistry,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch the value for `key`, consulting the cache first and invoking
    /// `loader` at most once per concurrent miss.
    ///
    /// On loader success the cache entry is written (with `stored_at = now`)
    /// before the in-flight registry entry is released and the result
    /// broadcast. On failure nothing is cached: negative results are
    /// deliberately not memoized, so the next identical request goes live
    /// again.
    pub async fn fetch<F, Fut>(
        &self,
        key: &CacheKey,
        ttl: Duration,
        loader: F,
    ) -> (FetchOutcome, ResultSource)
    where
        F: Fn() -> Fut + Send,
        Fut: Future<Output = FetchOutcome> + Send,
    {
        match self.store.get(key.as_str()).await {
            Ok(Some(entry)) if entry.is_valid() => {
                debug!(key = %key, "cache hit");
                return (Ok(entry.value), ResultSource::Cache);
            }
            Ok(Some(_)) => debug!(key = %key, "cache entry expired"),
            Ok(None) => debug!(key = %key, "cache miss"),
            Err(e) => warn!(key = %key, error = %e, "cache read failed, treating as miss"),
        }

        loop {
            let role = {
                let mut registry = self.registry();
                match registry.get(key.as_str()) {
                    Some(rx) => Role::Waiter(rx.clone()),
                    None => {
                        let (tx, rx) = watch::channel(None);
                        registry.insert(key.as_str().to_string(), rx);
                        Role::Leader(tx)
                    }
                }
            };

            match role {
                Role::Leader(tx) => {
                    let guard = FlightGuard::new(self, key.as_str());
                    let result = loader().await;

                    if let Ok(value) = &result {
                        let entry = CacheEntry::new(value.clone(), ttl);
                        if let Err(e) = self.store.set(key.as_str(), entry).await {
                            warn!(key = %key, error = %e, "cache write failed, continuing uncached");
                        }
                    }

                    // Release the registry entry before broadcasting so a
                    // request arriving now starts a fresh fetch instead of
                    // attaching to a completed one.
                    guard.finish();
                    let _ = tx.send(Some(result.clone()));
                    return (result, ResultSource::Live);
                }
                Role::Waiter(mut rx) => {
                    debug!(key = %key, "attaching to in-flight fetch");
                    loop {
                        if let Some(result) = rx.borrow_and_update().clone() {
                            return (result, ResultSource::Live);
                        }
                        if rx.changed().await.is_err() {
                            // Leader was cancelled before broadcasting.
                            match rx.borrow().clone() {
                                Some(result) => return (result, ResultSource::Live),
                                // Retake the miss path; the guard has
                                // already removed the stale entry.
                                None => break,
                            }
                        }
                    }
                }
            }
        }
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<String, FlightReceiver>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes the in-flight registry entry on drop, so a cancelled leader
/// never strands its waiters behind a closed channel.
struct FlightGuard<'a> {
    orchestrator: &'a Orchestrator,
    key: &'a str,
    armed: bool,
}

impl<'a> FlightGuard<'a> {
    fn new(orchestrator: &'a Orchestrator, key: &'a str) -> Self {
        Self {
            orchestrator,
            key,
            armed: true,
        }
    }

    fn finish(mut self) {
        self.orchestrator.registry().remove(self.key);
        self.armed = false;
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.orchestrator.registry().remove(self.key);
        }
    }
}
