use clap::{Args, Subcommand};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use sous_core::timer::countdown::format_remaining;
use sous_core::{Config, Database, RecipeRef, SystemClock, TimerStore};

use super::{print_json, CliResult};

#[derive(Args)]
pub struct NewTimer {
    /// Duration in seconds
    #[arg(long)]
    duration: u64,
    /// Optional label shown with the countdown
    #[arg(long, default_value = "")]
    name: String,
    /// Recipe the timer belongs to
    #[arg(long, default_value = "adhoc")]
    recipe_id: String,
    #[arg(long, default_value = "Quick timer")]
    recipe_name: String,
}

impl NewTimer {
    fn recipe(&self) -> RecipeRef {
        RecipeRef::new(&self.recipe_id, &self.recipe_name)
    }
}

#[derive(Subcommand)]
pub enum TimerAction {
    /// Create an idle timer without starting it
    Create(NewTimer),
    /// Create a timer and start it immediately
    Start(NewTimer),
    /// Pause an active timer
    Pause { id: String },
    /// Resume a paused timer
    Resume { id: String },
    /// Restart an idle or finished timer with its original duration
    Replay { id: String },
    /// Reset a timer to idle
    Cancel { id: String },
    /// Mark an active timer as done
    Finish { id: String },
    /// Remove a timer
    Delete { id: String },
    /// Acknowledge and remove a timer whose countdown ran out
    Ack { id: String },
    /// List timers as JSON
    List {
        /// Only timers for this recipe
        #[arg(long)]
        recipe: Option<String>,
    },
    /// Print one timer with its remaining time
    Status { id: String },
    /// Recently used durations, most recent first
    Recent,
}

fn open_store() -> Result<TimerStore, Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let db = Database::open()?;
    debug!(max_active = config.timers.max_active, "opening timer store");
    Ok(TimerStore::open(
        Arc::new(db),
        Arc::new(SystemClock),
        config.timers.max_active,
    ))
}

pub fn run(action: TimerAction) -> CliResult {
    let mut store = open_store()?;

    let event = match action {
        TimerAction::Create(new) => store.create(new.duration, &new.name, &new.recipe())?,
        TimerAction::Start(new) => store.start(new.duration, &new.name, &new.recipe())?,
        TimerAction::Pause { id } => store.pause(&id)?,
        TimerAction::Resume { id } => store.resume(&id)?,
        TimerAction::Replay { id } => store.replay(&id)?,
        TimerAction::Cancel { id } => store.cancel(&id)?,
        TimerAction::Finish { id } => store.finish(&id)?,
        TimerAction::Delete { id } => store.delete(&id)?,
        TimerAction::Ack { id } => store.acknowledge_expired(&id)?,
        TimerAction::List { recipe } => {
            let timers = match recipe {
                Some(recipe_id) => store.list_for_recipe(&recipe_id),
                None => store.list(),
            };
            return print_json(&timers);
        }
        TimerAction::Status { id } => {
            let remaining = store.remaining_secs(&id)?;
            let expired = store.expired().iter().any(|t| t.id == id);
            let ends_at = store
                .get(&id)
                .and_then(|t| t.end_at_ms)
                .and_then(chrono::DateTime::from_timestamp_millis);
            return print_json(&json!({
                "timer": store.get(&id),
                "endsAt": ends_at,
                "remainingSecs": remaining,
                "remaining": format_remaining(remaining),
                "expired": expired,
            }));
        }
        TimerAction::Recent => return print_json(&store.recent_durations()),
    };

    print_json(&event)
}
