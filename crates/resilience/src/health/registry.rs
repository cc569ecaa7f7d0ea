//! Health registry: the write and read path in front of a [`HealthStore`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, warn};
use tokio::sync::{Mutex, RwLock};

use super::errors::HealthError;
use super::model::{HealthKey, HealthQuery, HealthReport, HealthUpdate, SystemHealth};
use super::traits::HealthStore;
use crate::clock::{Clock, SystemClock};

/// Records health observations and answers health queries.
///
/// Reports for the same key are serialized through a per-key async lock,
/// so a read-merge-write never interleaves with another for that key.
/// Reports for different keys proceed independently.
///
/// Every merged row is also kept in memory. When the backing store cannot
/// be read or written, the registry logs the problem and answers from that
/// last-known copy instead of failing.
pub struct HealthRegistry {
    store: Arc<dyn HealthStore>,
    clock: Arc<dyn Clock>,
    key_locks: DashMap<HealthKey, Arc<Mutex<()>>>,
    last_known: RwLock<HashMap<HealthKey, Known>>,
}

/// In-memory copy of a row.
#[derive(Clone, Debug)]
struct Known {
    report: HealthReport,
    /// False when the row was started without ever reading the store's
    /// row for the key. Such a row only holds what happened since, so it
    /// is folded into the stored row instead of replacing it.
    grounded: bool,
}

impl HealthRegistry {
    pub fn new(store: Arc<dyn HealthStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn HealthStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            key_locks: DashMap::new(),
            last_known: RwLock::new(HashMap::new()),
        }
    }

    fn key_lock(&self, key: &HealthKey) -> Arc<Mutex<()>> {
        self.key_locks.entry(key.clone()).or_default().clone()
    }

    /// Record one observation.
    ///
    /// Returns the merged row. Only a malformed key is an error; backend
    /// failures are logged and the row is still kept as last-known.
    ///
    /// When the store cannot be read and there is no last-known row for
    /// the key, the merged row is kept in memory only: writing it would
    /// replace the stored counters with ones starting from zero.
    pub async fn report(&self, update: HealthUpdate) -> Result<HealthReport, HealthError> {
        update.key.validate()?;

        let key = update.key.clone();
        let lock = self.key_lock(&key);
        let _guard = lock.lock().await;

        let known = self.last_known.read().await.get(&key).cloned();
        let (previous, grounded) = match self.store.get(&key).await {
            Ok(stored) => (combine(stored, known), true),
            Err(e) => {
                warn!("Health: failed to read '{}' before update: {}", key, e);
                match known {
                    Some(known) => (Some(known.report), known.grounded),
                    None => (None, false),
                }
            }
        };

        let merged = HealthReport::merge(previous.as_ref(), update, self.clock.utc_now());

        if grounded {
            match self.store.upsert(&merged).await {
                Ok(()) => debug!(
                    "Health: recorded '{}' as {} (errors: {})",
                    key, merged.status, merged.error_count
                ),
                Err(e) => warn!(
                    "Health: failed to persist '{}' as {}, keeping last-known state: {}",
                    key, merged.status, e
                ),
            }
        } else {
            warn!(
                "Health: no readable row for '{}', holding {} in memory until the store recovers",
                key, merged.status
            );
        }

        self.last_known.write().await.insert(
            key,
            Known {
                report: merged.clone(),
                grounded,
            },
        );

        Ok(merged)
    }

    /// Point lookup when both parts are given, otherwise a full listing.
    pub async fn query(&self, source_type: Option<&str>, source_name: Option<&str>) -> HealthQuery {
        match (source_type, source_name) {
            (Some(source_type), Some(source_name)) => {
                HealthQuery::One(self.get(&HealthKey::new(source_type, source_name)).await)
            }
            _ => HealthQuery::All(self.list().await),
        }
    }

    /// The current row for `key`.
    pub async fn get(&self, key: &HealthKey) -> Option<HealthReport> {
        let known = self.last_known.read().await.get(key).cloned();
        match self.store.get(key).await {
            Ok(stored) => combine(stored, known),
            Err(e) => {
                warn!("Health: failed to read '{}', using last-known state: {}", key, e);
                known.map(|known| known.report)
            }
        }
    }

    /// Every known row, ordered by key.
    pub async fn list(&self) -> Vec<HealthReport> {
        let stored = match self.store.list().await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Health: failed to list reports, using last-known state: {}", e);
                Vec::new()
            }
        };

        let mut rows: BTreeMap<HealthKey, HealthReport> =
            stored.into_iter().map(|row| (row.key(), row)).collect();
        for (key, known) in self.last_known.read().await.iter() {
            let stored = rows.remove(key);
            if let Some(row) = combine(stored, Some(known.clone())) {
                rows.insert(key.clone(), row);
            }
        }

        rows.into_values().collect()
    }

    /// Overall health across every known source.
    pub async fn summary(&self) -> SystemHealth {
        SystemHealth::from_reports(self.list().await, self.clock.utc_now())
    }
}

/// Reconciles the stored row with the in-memory copy.
fn combine(stored: Option<HealthReport>, known: Option<Known>) -> Option<HealthReport> {
    match known {
        None => stored,
        Some(known) if known.grounded => fresher(stored, Some(known.report)),
        Some(known) => Some(match stored {
            Some(stored) => absorb(stored, known.report),
            None => known.report,
        }),
    }
}

/// Picks the more recently checked of the stored row and the in-memory copy.
///
/// The store wins ties, and also wins when another process wrote it last.
fn fresher(stored: Option<HealthReport>, known: Option<HealthReport>) -> Option<HealthReport> {
    match (stored, known) {
        (Some(stored), Some(known)) if known.last_check > stored.last_check => Some(known),
        (Some(stored), _) => Some(stored),
        (None, known) => known,
    }
}

/// Folds a row that started from nothing into the stored row.
///
/// Its failures are all on top of the stored count.
fn absorb(stored: HealthReport, pending: HealthReport) -> HealthReport {
    let error_count = stored.error_count.saturating_add(pending.error_count);
    let last_success = stored.last_success.max(pending.last_success);

    let mut row = if pending.last_check > stored.last_check {
        pending
    } else {
        stored
    };
    row.error_count = error_count;
    row.last_success = last_success;
    row
}
