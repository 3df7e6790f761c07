//! Durable, batching, retrying delivery engine
//!
//! The emitter sits between the durable queue and the transport. `add`
//! appends to the queue and nudges the drain loop; the loop pulls events
//! oldest-first, partitions them into requests, dispatches them
//! concurrently, and reconciles the queue against the results:
//!
//! ```text
//!  add ──► EventStore ──► drain loop ──► build requests ──► Transport
//!                            ▲                                  │
//!                            └── remove delivered/dropped ◄─────┘
//! ```
//!
//! One loop runs per emitter at most (single-flight); it stops when the
//! queue stays empty for `idle_limit` polls, when the connectivity probe
//! reports offline, or after a cycle in which nothing was delivered. That
//! last stop is a deliberate backoff: the next `add` or `flush` starts a
//! fresh loop.

mod batch;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tokio::runtime::Handle;

use crate::config::EmitterConfig;
use crate::network::Transport;
use crate::payload::Payload;
use crate::store::EventStore;

/// Aggregate delivery callback, invoked once per sending drain cycle with
/// `(successes, failures)` event counts.
pub type ResultCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Reports whether the network is currently reachable
pub type ConnectivityProbe = Arc<dyn Fn() -> bool + Send + Sync>;

/// Durable batching uploader
#[derive(Clone)]
pub struct Emitter {
    inner: Arc<EmitterInner>,
}

struct EmitterInner {
    config: EmitterConfig,
    store: Arc<dyn EventStore>,
    transport: Arc<dyn Transport>,
    handle: Handle,
    /// Single-flight guard: at most one drain loop per emitter
    running: AtomicBool,
    /// Set by `shutdown`; permanent for this instance
    stopped: AtomicBool,
    custom_retry: RwLock<HashMap<u16, bool>>,
    callback: RwLock<Option<ResultCallback>>,
    probe: RwLock<Option<ConnectivityProbe>>,
}

impl Emitter {
    pub fn new(
        config: EmitterConfig,
        store: Arc<dyn EventStore>,
        transport: Arc<dyn Transport>,
        handle: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(EmitterInner {
                config,
                store,
                transport,
                handle,
                running: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                custom_retry: RwLock::new(HashMap::new()),
                callback: RwLock::new(None),
                probe: RwLock::new(None),
            }),
        }
    }

    /// Durably queue a payload and nudge the drain loop.
    ///
    /// Never blocks the caller beyond the queue write and never fails:
    /// a queue write error is logged and the payload is lost.
    pub fn add(&self, payload: Payload) {
        match self.inner.store.add(&payload) {
            Ok(id) => tracing::trace!(id, "queued event"),
            Err(e) => {
                tracing::error!(error = %e, "failed to queue event; payload dropped");
                return;
            }
        }
        self.ensure_draining();
    }

    /// Start the drain loop if idle; no-op while one is already running
    pub fn flush(&self) {
        self.ensure_draining();
    }

    /// Stop the loop permanently for this instance. In-flight requests are
    /// abandoned, not awaited; queued events stay in the durable store.
    pub fn shutdown(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
    }

    /// Override the default retry classification per status code.
    /// `true` keeps events queued on that status, `false` drops them.
    pub fn set_custom_retry_for_status_codes(&self, rules: HashMap<u16, bool>) {
        *self.inner.custom_retry.write().unwrap() = rules;
    }

    /// Register the per-cycle aggregate result callback
    pub fn set_result_callback(&self, callback: impl Fn(usize, usize) + Send + Sync + 'static) {
        *self.inner.callback.write().unwrap() = Some(Arc::new(callback));
    }

    /// Register a connectivity probe consulted at the top of each cycle.
    /// Without one the emitter assumes it is online.
    pub fn set_connectivity_probe(&self, probe: impl Fn() -> bool + Send + Sync + 'static) {
        *self.inner.probe.write().unwrap() = Some(Arc::new(probe));
    }

    /// Current queue depth
    pub fn queue_size(&self) -> crate::error::Result<usize> {
        self.inner.store.size()
    }

    fn ensure_draining(&self) {
        if self.inner.stopped.load(Ordering::SeqCst) {
            return;
        }
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let inner = Arc::clone(&self.inner);
            self.inner.handle.spawn(async move {
                inner.drain().await;
                inner.running.store(false, Ordering::SeqCst);
            });
        }
    }
}

impl EmitterInner {
    async fn drain(&self) {
        let mut idle_cycles: u32 = 0;

        loop {
            if self.stopped.load(Ordering::SeqCst) {
                break;
            }

            let online = self
                .probe
                .read()
                .unwrap()
                .as_ref()
                .map_or(true, |probe| (**probe)());
            if !online {
                tracing::debug!("network offline; stopping drain loop");
                break;
            }

            let batch = match self.store.next_batch(self.config.send_limit.max(1)) {
                Ok(batch) => batch,
                Err(e) => {
                    tracing::error!(error = %e, "failed to read event queue; stopping drain loop");
                    break;
                }
            };

            if batch.is_empty() {
                idle_cycles += 1;
                if idle_cycles >= self.config.idle_limit {
                    tracing::debug!("queue idle; stopping drain loop");
                    break;
                }
                tokio::time::sleep(self.config.tick()).await;
                continue;
            }
            idle_cycles = 0;

            let requests =
                batch::build_requests(&batch, self.transport.http_method(), &self.config);
            let request_count = requests.len();
            let results = self.transport.send(requests).await;

            let custom_rules = self.custom_retry.read().unwrap().clone();
            let mut successes = 0usize;
            let mut failures = 0usize;
            let mut removable: Vec<i64> = Vec::new();

            for result in &results {
                if result.is_successful() {
                    successes += result.event_ids.len();
                    removable.extend(&result.event_ids);
                } else {
                    failures += result.event_ids.len();
                    if !result.should_retry(&custom_rules) {
                        tracing::debug!(
                            events = result.event_ids.len(),
                            status = ?result.status_code,
                            oversize = result.oversize,
                            "dropping undeliverable events"
                        );
                        removable.extend(&result.event_ids);
                    }
                }
            }

            if !removable.is_empty() {
                if let Err(e) = self.store.remove(&removable) {
                    tracing::error!(
                        error = %e,
                        "failed to remove events from queue; redelivery possible"
                    );
                }
            }

            tracing::debug!(
                requests = request_count,
                successes,
                failures,
                "drain cycle complete"
            );

            let callback = self.callback.read().unwrap().clone();
            if let Some(callback) = callback {
                (*callback)(successes, failures);
            }

            if successes == 0 && failures > 0 {
                tracing::debug!("nothing delivered; stopping drain loop until next flush");
                break;
            }
        }
    }
}
