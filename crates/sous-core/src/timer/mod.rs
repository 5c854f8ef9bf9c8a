mod controller;
pub mod countdown;
mod history;
pub mod persist;
mod record;
mod sheet;
mod store;

pub use controller::TimerController;
pub use history::{IdleTimerHistory, HISTORY_LIMIT};
pub use persist::{from_persisted, to_persisted, PersistedTimers};
pub use record::{RecipeRef, TimerRecord, TimerState};
pub use sheet::{SheetMode, SheetVisibility};
pub use store::TimerStore;
