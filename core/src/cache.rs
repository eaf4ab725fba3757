//! Analysis cache.
//!
//! Dataset-keyed get-or-compute over an injectable backend. Each key
//! owns a mutex, so two callers racing on the same dataset never
//! compute twice: the second waits, then reads the first one's report.
//! Different keys never contend.
//!
//! RULE: the model survives report invalidation. Force-train stores a
//! fresh model with no report; the next analyze reuses that model
//! instead of retraining.

use crate::aggregator::RiskReport;
use crate::error::{AuditError, AuditResult};
use crate::model::ModelState;
use crate::types::DatasetKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// One dataset's cached analysis. `report` is None after a force-train
/// until the next analyze fills it back in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub report: Option<RiskReport>,
    pub model: ModelState,
    pub computed_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(report: Option<RiskReport>, model: ModelState) -> Self {
        Self {
            report,
            model,
            computed_at: Utc::now(),
        }
    }
}

/// Storage seam. The default is the in-process map; embedders can hand
/// in a durable store instead.
pub trait CacheBackend: Send + Sync {
    fn load(&self, key: &str) -> AuditResult<Option<CacheEntry>>;
    fn save(&self, key: &str, entry: &CacheEntry) -> AuditResult<()>;
    fn remove(&self, key: &str) -> AuditResult<()>;
}

fn poisoned(context: &str) -> AuditError {
    AuditError::LockPoisoned {
        context: context.to_string(),
    }
}

#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<DatasetKey, CacheEntry>>,
}

impl CacheBackend for MemoryBackend {
    fn load(&self, key: &str) -> AuditResult<Option<CacheEntry>> {
        let entries = self.entries.lock().map_err(|_| poisoned("memory cache"))?;
        Ok(entries.get(key).cloned())
    }

    fn save(&self, key: &str, entry: &CacheEntry) -> AuditResult<()> {
        let mut entries = self.entries.lock().map_err(|_| poisoned("memory cache"))?;
        entries.insert(key.to_string(), entry.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> AuditResult<()> {
        let mut entries = self.entries.lock().map_err(|_| poisoned("memory cache"))?;
        entries.remove(key);
        Ok(())
    }
}

pub struct AnalysisCache {
    backend: Box<dyn CacheBackend>,
    key_locks: Mutex<HashMap<DatasetKey, Arc<Mutex<()>>>>,
}

impl AnalysisCache {
    pub fn in_memory() -> Self {
        Self::with_backend(Box::new(MemoryBackend::default()))
    }

    pub fn with_backend(backend: Box<dyn CacheBackend>) -> Self {
        Self {
            backend,
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    fn key_lock(&self, key: &str) -> AuditResult<Arc<Mutex<()>>> {
        let mut locks = self
            .key_locks
            .lock()
            .map_err(|_| poisoned("cache key table"))?;
        Ok(locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone())
    }

    /// Return the cached report for `key`, or run `compute` exactly
    /// once to produce it. `compute` receives the stored model state
    /// (untrained when the key is new) and returns the report plus the
    /// state to store alongside it.
    pub fn get_or_compute<F>(&self, key: &str, compute: F) -> AuditResult<RiskReport>
    where
        F: FnOnce(ModelState) -> AuditResult<(RiskReport, ModelState)>,
    {
        let slot = self.key_lock(key)?;
        let _guard = slot.lock().map_err(|_| poisoned("analysis slot"))?;

        let entry = self.backend.load(key)?;
        if let Some(entry) = &entry {
            if let Some(report) = &entry.report {
                log::debug!("dataset={key} cache hit");
                return Ok(report.clone());
            }
        }
        let model = entry.map(|e| e.model).unwrap_or_else(ModelState::untrained);
        let (report, model) = compute(model)?;
        self.backend
            .save(key, &CacheEntry::new(Some(report.clone()), model))?;
        Ok(report)
    }

    /// Swap in a new model for `key` and drop any cached report, so the
    /// next analyze reflects the new model. Used by force-train.
    pub fn replace_model<F>(&self, key: &str, train: F) -> AuditResult<ModelState>
    where
        F: FnOnce(ModelState) -> AuditResult<ModelState>,
    {
        let slot = self.key_lock(key)?;
        let _guard = slot.lock().map_err(|_| poisoned("analysis slot"))?;

        let current = self
            .backend
            .load(key)?
            .map(|e| e.model)
            .unwrap_or_else(ModelState::untrained);
        let next = train(current)?;
        self.backend.save(key, &CacheEntry::new(None, next.clone()))?;
        Ok(next)
    }

    /// Drop everything cached for `key`, model included. The key's lock
    /// slot is retired with it once no other caller holds the slot.
    pub fn invalidate(&self, key: &str) -> AuditResult<()> {
        let slot = self.key_lock(key)?;
        let _guard = slot.lock().map_err(|_| poisoned("analysis slot"))?;
        log::debug!("dataset={key} cache invalidated");
        self.backend.remove(key)?;
        self.prune_slot(key, &slot)
    }

    /// Remove `key`'s slot from the lock table unless someone else still
    /// holds it. Exactly two strong refs means the table's and `slot`
    /// itself; a third is a caller that must keep serializing here, so
    /// the slot stays until a later invalidate finds it idle.
    fn prune_slot(&self, key: &str, slot: &Arc<Mutex<()>>) -> AuditResult<()> {
        let mut locks = self
            .key_locks
            .lock()
            .map_err(|_| poisoned("cache key table"))?;
        // Clones are only handed out under the table lock held here, so
        // the count cannot rise between the check and the remove.
        if Arc::strong_count(slot) == 2 {
            locks.remove(key);
        }
        Ok(())
    }

    /// Read the current entry without taking the per-key lock. A
    /// concurrent compute may land right after; callers get a snapshot,
    /// not a reservation.
    pub fn peek(&self, key: &str) -> AuditResult<Option<CacheEntry>> {
        self.backend.load(key)
    }
}
