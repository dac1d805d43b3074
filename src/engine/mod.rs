mod availability;
mod codec;
mod conflict;
mod error;
mod mutations;
mod queries;

pub use availability::{reserved_mask, room_blackout_mask};
pub use codec::{decode, encode, to_slots};
pub use conflict::first_conflict;
pub use error::EngineError;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::model::SeatId;
use crate::notify::NotifyHub;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on any single store call.
    pub store_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(5),
        }
    }
}

impl EngineConfig {
    /// Read overrides from the environment (`SEATGRID_STORE_TIMEOUT_MS`).
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let store_timeout = std::env::var("SEATGRID_STORE_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.store_timeout);
        Self { store_timeout }
    }
}

/// The availability and reservation engine. Stateless between requests apart
/// from the booking-lock registry: availability is recomputed from the store
/// on every call, never cached.
pub struct Engine {
    pub(super) store: Arc<dyn Store>,
    /// One exclusive lock per (seat, date) booking scope. Conflict
    /// re-validation and the commit happen under this lock, so at most one
    /// of any set of racing callers can claim a slot range.
    booking_locks: DashMap<(SeatId, NaiveDate), Arc<Mutex<()>>>,
    pub notify: Arc<NotifyHub>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(store: Arc<dyn Store>, notify: Arc<NotifyHub>, config: EngineConfig) -> Self {
        Self {
            store,
            booking_locks: DashMap::new(),
            notify,
            config,
        }
    }

    pub(super) fn booking_lock(&self, seat: SeatId, date: NaiveDate) -> Arc<Mutex<()>> {
        self.booking_locks
            .entry((seat, date))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run a store call under the configured timeout bound. Expiry surfaces
    /// as `StoreTimeout`; each store mutation is a single atomic op, so an
    /// abandoned call leaves no partial state behind.
    pub(super) async fn store_call<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, EngineError> {
        let start = Instant::now();
        let result = tokio::time::timeout(self.config.store_timeout, fut).await;
        metrics::histogram!(crate::observability::STORE_OP_DURATION_SECONDS, "op" => op)
            .record(start.elapsed().as_secs_f64());
        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                metrics::counter!(crate::observability::STORE_TIMEOUTS_TOTAL).increment(1);
                tracing::warn!(op, "store call exceeded timeout");
                Err(EngineError::StoreTimeout)
            }
        }
    }
}
