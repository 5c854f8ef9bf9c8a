//! Visibility of the timer bottom sheet.
//!
//! When a timer starts while the sheet is closed, the sheet opens briefly so
//! the user sees it, then closes itself. Each pulse-open session owns at
//! most one delayed close task; interacting with the sheet re-arms it.
//! None of this touches timer state.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetMode {
    Closed,
    /// Opened by the user; stays open until closed.
    Open,
    /// Opened automatically; closes after the pulse duration.
    Pulsing,
}

#[derive(Debug)]
struct SheetInner {
    mode: SheetMode,
    /// Bumped on every arm/cancel so a close task that lost the race to
    /// `abort` cannot close a newer session.
    session: u64,
    close_task: Option<JoinHandle<()>>,
}

/// Requires a tokio runtime for [`SheetVisibility::pulse`] and
/// [`SheetVisibility::touch`].
#[derive(Debug, Clone)]
pub struct SheetVisibility {
    inner: Arc<Mutex<SheetInner>>,
    pulse_duration: Duration,
}

impl SheetVisibility {
    pub fn new(pulse_duration: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SheetInner {
                mode: SheetMode::Closed,
                session: 0,
                close_task: None,
            })),
            pulse_duration,
        }
    }

    pub fn mode(&self) -> SheetMode {
        self.lock().mode
    }

    pub fn is_open(&self) -> bool {
        self.mode() != SheetMode::Closed
    }

    /// User opened the sheet.
    pub fn open(&self) {
        let mut inner = self.lock();
        cancel(&mut inner);
        inner.mode = SheetMode::Open;
    }

    /// Open temporarily if closed. Returns whether a pulse started.
    pub fn pulse(&self) -> bool {
        let mut inner = self.lock();
        if inner.mode != SheetMode::Closed {
            return false;
        }
        inner.mode = SheetMode::Pulsing;
        self.arm(&mut inner);
        true
    }

    /// User interacted with a pulse-opened sheet: restart the countdown.
    pub fn touch(&self) {
        let mut inner = self.lock();
        if inner.mode == SheetMode::Pulsing {
            self.arm(&mut inner);
        }
    }

    pub fn close(&self) {
        let mut inner = self.lock();
        cancel(&mut inner);
        inner.mode = SheetMode::Closed;
    }

    fn arm(&self, inner: &mut SheetInner) {
        cancel(inner);
        let session = inner.session;
        let shared = Arc::clone(&self.inner);
        let delay = self.pulse_duration;
        inner.close_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut inner = shared.lock().unwrap_or_else(PoisonError::into_inner);
            if inner.session == session && inner.mode == SheetMode::Pulsing {
                inner.mode = SheetMode::Closed;
                inner.close_task = None;
                trace!("timer sheet auto-closed");
            }
        }));
    }

    fn lock(&self) -> MutexGuard<'_, SheetInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn cancel(inner: &mut SheetInner) {
    inner.session = inner.session.wrapping_add(1);
    if let Some(task) = inner.close_task.take() {
        task.abort();
    }
}
