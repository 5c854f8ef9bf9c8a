use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimerState {
    /// Created but never started, or reset by cancel.
    Idle,
    /// Counting down toward `end_at_ms`.
    Active,
    /// Frozen with a remembered remaining-time snapshot.
    Paused,
    Finished,
}

/// The recipe a timer was started from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeRef {
    pub id: String,
    pub name: String,
}

impl RecipeRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// One cooking timer.
///
/// `end_at_ms` is only set while Active and `remaining_secs_at_pause` only
/// while Paused; the store keeps both in step with `state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerRecord {
    pub id: String,
    pub recipe_id: String,
    pub recipe_name: String,
    /// User label, may be empty.
    #[serde(default)]
    pub name: String,
    pub duration_secs: u64,
    pub state: TimerState,
    #[serde(default)]
    pub end_at_ms: Option<i64>,
    #[serde(default)]
    pub remaining_secs_at_pause: Option<u64>,
    pub created_at_ms: i64,
}

impl TimerRecord {
    pub(crate) fn new(
        id: String,
        duration_secs: u64,
        name: String,
        recipe: &RecipeRef,
        created_at_ms: i64,
    ) -> Self {
        Self {
            id,
            recipe_id: recipe.id.clone(),
            recipe_name: recipe.name.clone(),
            name,
            duration_secs,
            state: TimerState::Idle,
            end_at_ms: None,
            remaining_secs_at_pause: None,
            created_at_ms,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == TimerState::Active
    }

    pub(crate) fn activate(&mut self, now_ms: i64, secs: u64) -> i64 {
        let end_at = now_ms.saturating_add(secs_to_ms(secs));
        self.state = TimerState::Active;
        self.end_at_ms = Some(end_at);
        self.remaining_secs_at_pause = None;
        end_at
    }

    pub(crate) fn freeze(&mut self, remaining_secs: u64) {
        self.state = TimerState::Paused;
        self.end_at_ms = None;
        self.remaining_secs_at_pause = Some(remaining_secs);
    }

    pub(crate) fn settle(&mut self, state: TimerState) {
        self.state = state;
        self.end_at_ms = None;
        self.remaining_secs_at_pause = None;
    }

    /// Whether the stored fields agree with `state`.
    pub fn is_consistent(&self) -> bool {
        self.duration_secs > 0
            && self.end_at_ms.is_some() == (self.state == TimerState::Active)
            && self.remaining_secs_at_pause.is_some() == (self.state == TimerState::Paused)
    }
}

fn secs_to_ms(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX).saturating_mul(1000)
}
