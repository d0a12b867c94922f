//! Shared server state and the sweeper task.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use comet_core::{Engine, EngineConfig};
use tokio_util::sync::CancellationToken;

/// The engine behind the HTTP handlers.
///
/// Every engine operation is short and allocation-bounded, so one blocking
/// mutex serializes them. The lock is never held across an await.
#[derive(Debug)]
pub struct RelayState {
    engine: Mutex<Engine>,
    check_interval: Duration,
}

impl RelayState {
    /// Wrap a fresh engine built from `config`.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let check_interval = Duration::from_secs(u64::from(config.channel_check_interval));
        Self {
            engine: Mutex::new(Engine::new(config)),
            check_interval,
        }
    }

    /// Lock the engine.
    ///
    /// # Panics
    ///
    /// Panics if a prior operation panicked while holding the lock; the
    /// engine state is unreliable past that point.
    pub fn engine(&self) -> MutexGuard<'_, Engine> {
        self.engine.lock().expect("engine mutex poisoned")
    }

    /// Sweeper period.
    #[must_use]
    pub const fn check_interval(&self) -> Duration {
        self.check_interval
    }
}

/// Periodic sweep driving channel expiry and poll keep-alives.
///
/// One tick per `channel_check_interval`; runs until `cancel` fires.
pub async fn run_sweeper(state: Arc<RelayState>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(state.check_interval());
    interval.tick().await; // the first tick completes immediately

    loop {
        tokio::select! {
            _ = interval.tick() => state.engine().sweep(),
            () = cancel.cancelled() => {
                tracing::debug!("stopping sweeper");
                break;
            }
        }
    }
}
