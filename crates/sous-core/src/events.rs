use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Every timer transition produces an Event.
/// The UI renders from them; the CLI prints them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    TimerCreated {
        id: String,
        recipe_id: String,
        duration_secs: u64,
        at: DateTime<Utc>,
    },
    TimerStarted {
        id: String,
        recipe_id: String,
        duration_secs: u64,
        end_at_ms: i64,
        at: DateTime<Utc>,
    },
    TimerPaused {
        id: String,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    TimerResumed {
        id: String,
        remaining_secs: u64,
        end_at_ms: i64,
        at: DateTime<Utc>,
    },
    /// Re-armed from Idle or Finished with the original duration.
    TimerReplayed {
        id: String,
        duration_secs: u64,
        end_at_ms: i64,
        at: DateTime<Utc>,
    },
    TimerCancelled {
        id: String,
        at: DateTime<Utc>,
    },
    TimerFinished {
        id: String,
        at: DateTime<Utc>,
    },
    TimerDeleted {
        id: String,
        at: DateTime<Utc>,
    },
    /// Natural expiry acknowledged by the user; the record is gone.
    TimerExpired {
        id: String,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn timer_id(&self) -> &str {
        match self {
            Event::TimerCreated { id, .. }
            | Event::TimerStarted { id, .. }
            | Event::TimerPaused { id, .. }
            | Event::TimerResumed { id, .. }
            | Event::TimerReplayed { id, .. }
            | Event::TimerCancelled { id, .. }
            | Event::TimerFinished { id, .. }
            | Event::TimerDeleted { id, .. }
            | Event::TimerExpired { id, .. } => id,
        }
    }

    /// Whether this event put a timer into the running state.
    pub fn activates(&self) -> bool {
        matches!(
            self,
            Event::TimerStarted { .. } | Event::TimerResumed { .. } | Event::TimerReplayed { .. }
        )
    }
}

/// Convert a clock reading into an event timestamp.
pub(crate) fn timestamp(now_ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(now_ms).unwrap_or_else(Utc::now)
}
