//! ==============================================================================
//! poller.rs - demand-driven polling controller
//! ==============================================================================
//!
//! purpose:
//!     keeps the two cached sensor documents (averages, history) fresh, but
//!     only while somebody is asking for them.
//!
//! lifecycle:
//!
//!         note_access()                     no access for idle_timeout
//!     ┌──────────┐  ───────────────────▶  ┌──────────┐  ─────────────┐
//!     │ inactive │                        │  active  │               │
//!     └──────────┘  ◀───────────────────  └──────────┘  ◀────────────┘
//!                      idle deadline          every interval: fetch cycle
//!
//!     - activation runs one fetch cycle right away, then arms the ticker
//!     - every access pushes the idle deadline back
//!     - reads never fetch, they return whatever is cached
//!
//! relationships:
//!     - used by: server.rs (note_access + current_value per request)
//!     - uses: fetcher.rs (one fetch per slot per cycle)
//!
//! ==============================================================================

use crate::domain::{SensorEndpoints, Slot};
use crate::fetcher::Fetcher;

use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

pub const POLLING_INTERVAL: Duration = Duration::from_secs(10);
pub const STOP_POLLING_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingSettings {
    /// time between two fetch cycles while active
    pub interval: Duration,
    /// time without access after which polling stops
    pub idle_timeout: Duration,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            interval: POLLING_INTERVAL,
            idle_timeout: STOP_POLLING_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollingState {
    Inactive,
    Active,
}

// ==============================================================================
// session - the two timers
// ==============================================================================
// both handles are only touched with the session lock held, and the lock is
// never held across an await. that keeps "at most one ticker and one idle
// deadline" true on the multi-threaded runtime.

#[derive(Default)]
struct Session {
    poll_task: Option<JoinHandle<()>>,
    idle_task: Option<JoinHandle<()>>,
    /// bumped on every reschedule; a deadline only fires if it still matches
    idle_generation: u64,
}

impl Session {
    fn cancel_idle_deadline(&mut self) {
        if let Some(task) = self.idle_task.take() {
            task.abort();
        }
        self.idle_generation = self.idle_generation.wrapping_add(1);
    }

    fn stop_polling(&mut self) {
        if let Some(task) = self.poll_task.take() {
            info!("stopping polling ...");
            task.abort();
        }
    }
}

struct Shared<F> {
    fetcher: F,
    endpoints: SensorEndpoints,
    settings: PollingSettings,
    averages: RwLock<Option<Value>>,
    history: RwLock<Option<Value>>,
    session: Mutex<Session>,
}

impl<F: Fetcher> Shared<F> {
    fn slot(&self, slot: Slot) -> &RwLock<Option<Value>> {
        match slot {
            Slot::Averages => &self.averages,
            Slot::History => &self.history,
        }
    }

    /// one independent fetch per slot, fire and forget
    fn fetch_cycle(self: &Arc<Self>) {
        for slot in Slot::ALL {
            let shared = Arc::clone(self);
            tokio::spawn(async move { shared.refresh(slot).await });
        }
    }

    async fn refresh(&self, slot: Slot) {
        debug!("polling {} ...", slot.description());

        match self.fetcher.fetch(self.endpoints.url(slot)).await {
            Ok(value) => {
                *self.slot(slot).write().await = Some(value);
                info!("polled {} successfully", slot.description());
            }
            Err(e) => {
                // keep serving the previous value
                error!(slot = slot.description(), "{}", e);
            }
        }
    }

    fn idle_deadline_expired(&self, generation: u64) {
        let mut session = self.session.lock();
        if session.idle_generation != generation {
            return;
        }

        info!(
            "no request received for {}ms -> polling no longer needed ...",
            self.settings.idle_timeout.as_millis()
        );
        session.idle_task = None;
        session.stop_polling();
    }
}

async fn poll_loop<F: Fetcher>(shared: Arc<Shared<F>>, first_tick: Option<Instant>) {
    let Some(first_tick) = first_tick else {
        // interval too far out to be represented: there will never be a tick
        warn!(
            "poll interval of {}s is out of range, polling once only",
            shared.settings.interval.as_secs()
        );
        return std::future::pending().await;
    };

    let mut ticker = tokio::time::interval_at(first_tick, shared.settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        shared.fetch_cycle();
    }
}

// ==============================================================================
// polling controller - public interface
// ==============================================================================

/// owns the cache slots and the polling session
///
/// cloning is cheap and every clone drives the same session.
pub struct PollingController<F> {
    shared: Arc<Shared<F>>,
}

impl<F> Clone for PollingController<F> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl<F: Fetcher> PollingController<F> {
    pub fn new(fetcher: F, endpoints: SensorEndpoints, settings: PollingSettings) -> Self {
        Self {
            shared: Arc::new(Shared {
                fetcher,
                endpoints,
                settings,
                averages: RwLock::new(None),
                history: RwLock::new(None),
                session: Mutex::new(Session::default()),
            }),
        }
    }

    /// record client demand
    ///
    /// pushes the idle deadline back and, if polling is not running yet,
    /// fetches both slots right away and starts the ticker. never waits for
    /// the fetches. must be called from within a tokio runtime.
    pub fn note_access(&self) {
        let mut session = self.shared.session.lock();

        session.cancel_idle_deadline();
        let generation = session.idle_generation;
        let shared = Arc::clone(&self.shared);
        session.idle_task = Some(tokio::spawn(async move {
            tokio::time::sleep(shared.settings.idle_timeout).await;
            shared.idle_deadline_expired(generation);
        }));

        if session.poll_task.is_none() {
            info!("starting polling ...");
            self.shared.fetch_cycle();
            let first_tick = Instant::now().checked_add(self.shared.settings.interval);
            session.poll_task = Some(tokio::spawn(poll_loop(Arc::clone(&self.shared), first_tick)));
        }
    }

    /// the cached document of `slot`, `None` before the first successful fetch
    pub async fn current_value(&self, slot: Slot) -> Option<Value> {
        self.shared.slot(slot).read().await.clone()
    }

    pub fn state(&self) -> PollingState {
        if self.shared.session.lock().poll_task.is_some() {
            PollingState::Active
        } else {
            PollingState::Inactive
        }
    }

    /// cancel both timers. in-flight fetches still complete.
    pub fn shutdown(&self) {
        let mut session = self.shared.session.lock();
        session.cancel_idle_deadline();
        session.stop_polling();
    }
}
