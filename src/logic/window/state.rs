//! Active accumulators of one run.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use super::accumulator::{Accumulator, SessionKey};
use crate::models::RawRecord;

/// Open sessions keyed by client identity.
///
/// Owned by a single run and passed into the windower explicitly. Dropping
/// it discards unflushed sessions; their records stay unlinked and are
/// rebuilt by the next run.
#[derive(Debug, Default)]
pub struct WindowState {
    active: HashMap<SessionKey, Accumulator>,
}

impl WindowState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn get(&self, key: &SessionKey) -> Option<&Accumulator> {
        self.active.get(key)
    }

    /// Remove the session for `key` if a record at `at` falls outside its window.
    pub fn split_if_expired(
        &mut self,
        key: &SessionKey,
        at: DateTime<Utc>,
        window: Duration,
    ) -> Option<Accumulator> {
        let expired = self
            .active
            .get(key)
            .is_some_and(|acc| at - acc.last_seen > window);

        if expired {
            self.active.remove(key)
        } else {
            None
        }
    }

    /// Accumulator for `key`, seeded from `record` if none is open.
    pub fn entry(&mut self, key: SessionKey, record: &RawRecord, at: DateTime<Utc>) -> &mut Accumulator {
        self.active
            .entry(key.clone())
            .or_insert_with(|| Accumulator::new(key, record, at))
    }

    /// Remove every session that has been idle for a full window at `now`.
    pub fn drain_idle(&mut self, now: DateTime<Utc>, window: Duration) -> Vec<Accumulator> {
        let idle: Vec<SessionKey> = self
            .active
            .iter()
            .filter(|(_, acc)| acc.is_idle(now, window))
            .map(|(key, _)| key.clone())
            .collect();

        let mut drained: Vec<Accumulator> = idle
            .iter()
            .filter_map(|key| self.active.remove(key))
            .collect();
        in_arrival_order(&mut drained);
        drained
    }

    pub fn drain_all(&mut self) -> Vec<Accumulator> {
        let mut drained: Vec<Accumulator> = self.active.drain().map(|(_, acc)| acc).collect();
        in_arrival_order(&mut drained);
        drained
    }
}

/// Flush order follows the first record id of each session.
fn in_arrival_order(list: &mut [Accumulator]) {
    list.sort_by_key(|acc| acc.record_ids.first().copied().unwrap_or(i64::MAX));
}
