//! Per-session memo of decoded bets, keyed by bet id.
//!
//! Entries are never evicted or invalidated: the set of bets a session sees is
//! small and bounded, and a caller wanting fresh data bypasses the cache.
//! Concurrent fetches of the same id race; whichever completes last wins.
use crate::bet::BetRecord;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
pub struct BetCache {
    entries: Mutex<HashMap<u32, BetRecord>>,
}

impl BetCache {
    pub fn new() -> Self {
        Self::default()
    }

    // The map is always left consistent, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, HashMap<u32, BetRecord>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, id: u32) -> Option<BetRecord> {
        self.lock().get(&id).cloned()
    }

    pub fn has(&self, id: u32) -> bool {
        self.lock().contains_key(&id)
    }

    /// Store `record` under `id`, replacing any earlier entry.
    pub fn put(&self, id: u32, record: BetRecord) {
        self.lock().insert(id, record);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Cached bets in ascending id order.
    pub fn snapshot(&self) -> Vec<BetRecord> {
        let mut v: Vec<_> = self.lock().values().cloned().collect();
        v.sort_by_key(|b| b.id);
        v
    }
}
