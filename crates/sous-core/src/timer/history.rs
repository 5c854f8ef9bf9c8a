//! Recently used timer durations for the quick-pick list.

use indexmap::IndexMap;

/// Number of durations remembered.
pub const HISTORY_LIMIT: usize = 10;

/// Duration (seconds) -> last used (epoch ms), least recently used first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdleTimerHistory {
    entries: IndexMap<u64, i64>,
}

impl IdleTimerHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `duration_secs` as used at `at_ms`, evicting the least recently
    /// used entry past [`HISTORY_LIMIT`].
    pub fn record(&mut self, duration_secs: u64, at_ms: i64) {
        self.entries.shift_remove(&duration_secs);
        self.entries.insert(duration_secs, at_ms);
        while self.entries.len() > HISTORY_LIMIT {
            self.entries.shift_remove_index(0);
        }
    }

    /// Durations, most recently used first.
    pub fn recent(&self) -> Vec<u64> {
        self.entries.keys().rev().copied().collect()
    }

    pub fn last_used(&self, duration_secs: u64) -> Option<i64> {
        self.entries.get(&duration_secs).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Oldest first, the order [`Self::from_pairs`] expects.
    pub fn to_pairs(&self) -> Vec<(u64, i64)> {
        self.entries.iter().map(|(d, at)| (*d, *at)).collect()
    }

    /// Rebuild from persisted pairs. Entries are re-sorted by timestamp so a
    /// hand-edited or reordered blob still evicts the right one.
    pub fn from_pairs(mut pairs: Vec<(u64, i64)>) -> Self {
        pairs.sort_by_key(|(_, at)| *at);
        let mut history = Self::new();
        for (duration, at) in pairs {
            history.record(duration, at);
        }
        history
    }
}
