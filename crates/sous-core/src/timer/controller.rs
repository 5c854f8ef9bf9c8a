//! Timer actions as the UI calls them: the store transition, then the
//! bottom-sheet pulse for anything that set a timer running.

use std::sync::Arc;

use super::record::RecipeRef;
use super::sheet::SheetVisibility;
use super::store::TimerStore;
use crate::clock::Clock;
use crate::error::Result;
use crate::events::Event;
use crate::storage::{KvStore, TimersConfig};

pub struct TimerController {
    store: TimerStore,
    sheet: SheetVisibility,
}

impl TimerController {
    pub fn new(store: TimerStore, sheet: SheetVisibility) -> Self {
        Self { store, sheet }
    }

    /// Rehydrate from `kv` with the cap and pulse length from `[timers]`.
    pub fn from_config(kv: Arc<dyn KvStore>, clock: Arc<dyn Clock>, config: &TimersConfig) -> Self {
        Self::new(
            TimerStore::open(kv, clock, config.max_active),
            SheetVisibility::new(config.sheet_pulse()),
        )
    }

    pub fn store(&self) -> &TimerStore {
        &self.store
    }

    pub fn sheet(&self) -> &SheetVisibility {
        &self.sheet
    }

    pub fn handle_create_timer(&mut self, duration_secs: u64, name: &str, recipe: &RecipeRef) -> Result<Event> {
        self.store.create(duration_secs, name, recipe)
    }

    pub fn handle_start_timer(&mut self, duration_secs: u64, name: &str, recipe: &RecipeRef) -> Result<Event> {
        let event = self.store.start(duration_secs, name, recipe)?;
        self.announce(&event);
        Ok(event)
    }

    pub fn handle_pause_timer(&mut self, id: &str) -> Result<Event> {
        self.store.pause(id)
    }

    pub fn handle_resume_timer(&mut self, id: &str) -> Result<Event> {
        let event = self.store.resume(id)?;
        self.announce(&event);
        Ok(event)
    }

    pub fn handle_replay_timer(&mut self, id: &str) -> Result<Event> {
        let event = self.store.replay(id)?;
        self.announce(&event);
        Ok(event)
    }

    pub fn handle_cancel_timer(&mut self, id: &str) -> Result<Event> {
        self.store.cancel(id)
    }

    pub fn handle_finish_timer(&mut self, id: &str) -> Result<Event> {
        self.store.finish(id)
    }

    pub fn handle_delete_timer(&mut self, id: &str) -> Result<Event> {
        self.store.delete(id)
    }

    pub fn handle_acknowledge_expired(&mut self, id: &str) -> Result<Event> {
        self.store.acknowledge_expired(id)
    }

    fn announce(&self, event: &Event) {
        if event.activates() {
            self.sheet.pulse();
        }
    }
}
