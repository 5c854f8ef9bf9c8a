//! Cooking timer store.
//!
//! A global keyed collection of [`TimerRecord`]s, each a small state
//! machine:
//!
//! ```text
//! create ─> Idle ──replay──> Active ──pause──> Paused
//!            ^  <──cancel──   │  ^ <──resume──   │
//!            │                │  └───────────────┘
//!            └────cancel──────┤
//!                           finish
//!                             v
//!                          Finished ──replay──> Active
//! ```
//!
//! `start` creates a record directly in Active. `delete` removes a record
//! from any state. Every successful transition is persisted before it
//! returns; a failed save rolls the in-memory collection back.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::countdown;
use super::history::IdleTimerHistory;
use super::persist;
use super::record::{RecipeRef, TimerRecord, TimerState};
use crate::clock::Clock;
use crate::error::{Result, TimerError};
use crate::events::{timestamp, Event};
use crate::storage::KvStore;

pub struct TimerStore {
    timers: HashMap<String, TimerRecord>,
    history: IdleTimerHistory,
    kv: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    max_active: usize,
}

impl TimerStore {
    /// Rehydrate from `kv`. Unreadable state yields an empty store.
    pub fn open(kv: Arc<dyn KvStore>, clock: Arc<dyn Clock>, max_active: usize) -> Self {
        let (timers, history) = persist::load(kv.as_ref());
        let store = Self {
            timers,
            history,
            kv,
            clock,
            max_active,
        };
        let expired = store.expired().len();
        if !store.timers.is_empty() {
            info!(
                timers = store.timers.len(),
                active = store.active_count(),
                expired,
                "rehydrated timers"
            );
        }
        store
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn get(&self, id: &str) -> Option<&TimerRecord> {
        self.timers.get(id)
    }

    /// All timers, oldest first.
    pub fn list(&self) -> Vec<&TimerRecord> {
        let mut all: Vec<&TimerRecord> = self.timers.values().collect();
        all.sort_by(|a, b| {
            a.created_at_ms
                .cmp(&b.created_at_ms)
                .then_with(|| a.id.cmp(&b.id))
        });
        all
    }

    pub fn list_for_recipe(&self, recipe_id: &str) -> Vec<&TimerRecord> {
        self.list()
            .into_iter()
            .filter(|t| t.recipe_id == recipe_id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.timers.values().filter(|t| t.is_active()).count()
    }

    pub fn max_active(&self) -> usize {
        self.max_active
    }

    /// Active timers at or past their end time.
    pub fn expired(&self) -> Vec<&TimerRecord> {
        let now = self.clock.now_ms();
        self.list()
            .into_iter()
            .filter(|t| countdown::is_expired(t, now))
            .collect()
    }

    pub fn remaining_secs(&self, id: &str) -> Result<u64> {
        let record = self.find(id)?;
        Ok(countdown::remaining_secs(record, self.clock.now_ms()))
    }

    /// Recently used durations, most recent first.
    pub fn recent_durations(&self) -> Vec<u64> {
        self.history.recent()
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Add an Idle timer that has not started yet.
    pub fn create(&mut self, duration_secs: u64, name: &str, recipe: &RecipeRef) -> Result<Event> {
        self.transact(|store, now| {
            let record = store.insert_new(duration_secs, name, recipe, now)?;
            Ok(Event::TimerCreated {
                id: record.id.clone(),
                recipe_id: record.recipe_id.clone(),
                duration_secs,
                at: timestamp(now),
            })
        })
    }

    /// Create a timer and start it immediately.
    ///
    /// Fails with [`TimerError::CapacityExceeded`] without creating anything
    /// when the active cap is reached.
    pub fn start(&mut self, duration_secs: u64, name: &str, recipe: &RecipeRef) -> Result<Event> {
        self.transact(|store, now| {
            store.ensure_capacity()?;
            let record = store.insert_new(duration_secs, name, recipe, now)?;
            let end_at_ms = record.activate(now, duration_secs);
            Ok(Event::TimerStarted {
                id: record.id.clone(),
                recipe_id: record.recipe_id.clone(),
                duration_secs,
                end_at_ms,
                at: timestamp(now),
            })
        })
    }

    pub fn pause(&mut self, id: &str) -> Result<Event> {
        self.transact(|store, now| {
            let record = store.expect_state(id, &[TimerState::Active], "pause")?;
            let remaining_secs = record
                .end_at_ms
                .map_or(0, |end_at| countdown::secs_until(end_at, now));
            record.freeze(remaining_secs);
            Ok(Event::TimerPaused {
                id: id.to_string(),
                remaining_secs,
                at: timestamp(now),
            })
        })
    }

    /// Paused -> Active, re-checking the cap since another timer may have
    /// started meanwhile.
    pub fn resume(&mut self, id: &str) -> Result<Event> {
        self.transact(|store, now| {
            store.expect_state(id, &[TimerState::Paused], "resume")?;
            store.ensure_capacity()?;
            let record = store.find_mut(id)?;
            let remaining_secs = record.remaining_secs_at_pause.unwrap_or(0);
            let end_at_ms = record.activate(now, remaining_secs);
            Ok(Event::TimerResumed {
                id: id.to_string(),
                remaining_secs,
                end_at_ms,
                at: timestamp(now),
            })
        })
    }

    /// Re-arm an Idle or Finished timer with its original duration.
    pub fn replay(&mut self, id: &str) -> Result<Event> {
        self.transact(|store, now| {
            store.expect_state(id, &[TimerState::Idle, TimerState::Finished], "replay")?;
            store.ensure_capacity()?;
            let record = store.find_mut(id)?;
            let duration_secs = record.duration_secs;
            let end_at_ms = record.activate(now, duration_secs);
            store.history.record(duration_secs, now);
            Ok(Event::TimerReplayed {
                id: id.to_string(),
                duration_secs,
                end_at_ms,
                at: timestamp(now),
            })
        })
    }

    /// Any non-Finished state -> Idle, keeping the record for replay.
    pub fn cancel(&mut self, id: &str) -> Result<Event> {
        self.transact(|store, now| {
            let record = store.expect_state(
                id,
                &[TimerState::Idle, TimerState::Active, TimerState::Paused],
                "cancel",
            )?;
            record.settle(TimerState::Idle);
            Ok(Event::TimerCancelled {
                id: id.to_string(),
                at: timestamp(now),
            })
        })
    }

    /// Active -> Finished ("done early", or acknowledging the alarm while
    /// keeping the record).
    pub fn finish(&mut self, id: &str) -> Result<Event> {
        self.transact(|store, now| {
            let record = store.expect_state(id, &[TimerState::Active], "finish")?;
            record.settle(TimerState::Finished);
            Ok(Event::TimerFinished {
                id: id.to_string(),
                at: timestamp(now),
            })
        })
    }

    pub fn delete(&mut self, id: &str) -> Result<Event> {
        self.transact(|store, now| {
            store
                .timers
                .remove(id)
                .ok_or_else(|| TimerError::NotFound(id.to_string()))?;
            Ok(Event::TimerDeleted {
                id: id.to_string(),
                at: timestamp(now),
            })
        })
    }

    /// Remove an Active timer whose countdown has run out.
    pub fn acknowledge_expired(&mut self, id: &str) -> Result<Event> {
        self.transact(|store, now| {
            let record = store.find(id)?;
            if !countdown::is_expired(record, now) {
                return Err(TimerError::InvalidTransition {
                    id: id.to_string(),
                    from: record.state,
                    action: "acknowledge",
                });
            }
            store.timers.remove(id);
            Ok(Event::TimerExpired {
                id: id.to_string(),
                at: timestamp(now),
            })
        })
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn transact<F>(&mut self, apply: F) -> Result<Event>
    where
        F: FnOnce(&mut Self, i64) -> Result<Event, TimerError>,
    {
        let now = self.clock.now_ms();
        let before = (self.timers.clone(), self.history.clone());

        let event = match apply(self, now) {
            Ok(event) => event,
            Err(err) => {
                (self.timers, self.history) = before;
                return Err(err.into());
            }
        };

        if let Err(err) = persist::save(self.kv.as_ref(), &self.timers, &self.history) {
            (self.timers, self.history) = before;
            return Err(err);
        }
        debug!(?event, "timer transition");
        Ok(event)
    }

    fn insert_new(
        &mut self,
        duration_secs: u64,
        name: &str,
        recipe: &RecipeRef,
        now: i64,
    ) -> Result<&mut TimerRecord, TimerError> {
        if duration_secs == 0 {
            return Err(TimerError::InvalidDuration);
        }
        let id = Uuid::new_v4().to_string();
        let record = TimerRecord::new(id.clone(), duration_secs, name.to_string(), recipe, now);
        self.history.record(duration_secs, now);
        Ok(self.timers.entry(id).or_insert(record))
    }

    fn ensure_capacity(&self) -> Result<(), TimerError> {
        if self.active_count() >= self.max_active {
            return Err(TimerError::CapacityExceeded {
                max_active: self.max_active,
            });
        }
        Ok(())
    }

    fn find(&self, id: &str) -> Result<&TimerRecord, TimerError> {
        self.timers
            .get(id)
            .ok_or_else(|| TimerError::NotFound(id.to_string()))
    }

    fn find_mut(&mut self, id: &str) -> Result<&mut TimerRecord, TimerError> {
        self.timers
            .get_mut(id)
            .ok_or_else(|| TimerError::NotFound(id.to_string()))
    }

    fn expect_state(
        &mut self,
        id: &str,
        allowed: &[TimerState],
        action: &'static str,
    ) -> Result<&mut TimerRecord, TimerError> {
        let record = self.find_mut(id)?;
        if !allowed.contains(&record.state) {
            return Err(TimerError::InvalidTransition {
                id: id.to_string(),
                from: record.state,
                action,
            });
        }
        Ok(record)
    }
}
