//! Serialized form of the timer collection.
//!
//! In memory the collection is a keyed map; on disk it is an array of
//! `(id, record)` pairs plus the duration history. Conversion happens only
//! in [`to_persisted`] / [`from_persisted`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

use super::history::IdleTimerHistory;
use super::record::TimerRecord;
use crate::error::Result;
use crate::storage::KvStore;

/// Key under which the collection is stored.
pub const STATE_KEY: &str = "timers.state";

pub const PERSIST_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedTimers {
    pub version: u32,
    pub timers: Vec<(String, TimerRecord)>,
    #[serde(default)]
    pub history: Vec<(u64, i64)>,
}

pub fn to_persisted(
    timers: &HashMap<String, TimerRecord>,
    history: &IdleTimerHistory,
) -> PersistedTimers {
    let mut pairs: Vec<(String, TimerRecord)> = timers
        .iter()
        .map(|(id, record)| (id.clone(), record.clone()))
        .collect();
    pairs.sort_by(|a, b| {
        a.1.created_at_ms
            .cmp(&b.1.created_at_ms)
            .then_with(|| a.0.cmp(&b.0))
    });
    PersistedTimers {
        version: PERSIST_VERSION,
        timers: pairs,
        history: history.to_pairs(),
    }
}

/// Rebuild the keyed map. Records whose fields disagree with their state,
/// or whose key differs from their id, are dropped.
pub fn from_persisted(
    persisted: PersistedTimers,
) -> (HashMap<String, TimerRecord>, IdleTimerHistory) {
    let mut timers = HashMap::with_capacity(persisted.timers.len());
    for (id, record) in persisted.timers {
        if id != record.id || !record.is_consistent() {
            warn!(%id, "dropping inconsistent persisted timer");
            continue;
        }
        timers.insert(id, record);
    }
    (timers, IdleTimerHistory::from_pairs(persisted.history))
}

/// Read the collection from `kv`, failing soft to an empty collection.
pub fn load(kv: &dyn KvStore) -> (HashMap<String, TimerRecord>, IdleTimerHistory) {
    let raw = match kv.get(STATE_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Default::default(),
        Err(err) => {
            warn!(error = %err, "timer state unreadable, starting empty");
            return Default::default();
        }
    };
    match serde_json::from_str::<PersistedTimers>(&raw) {
        Ok(persisted) if persisted.version == PERSIST_VERSION => from_persisted(persisted),
        Ok(persisted) => {
            warn!(version = persisted.version, "unknown timer state version, starting empty");
            Default::default()
        }
        Err(err) => {
            warn!(error = %err, "timer state corrupt, starting empty");
            Default::default()
        }
    }
}

pub fn save(
    kv: &dyn KvStore,
    timers: &HashMap<String, TimerRecord>,
    history: &IdleTimerHistory,
) -> Result<()> {
    let json = serde_json::to_string(&to_persisted(timers, history))?;
    kv.set(STATE_KEY, &json)?;
    Ok(())
}
