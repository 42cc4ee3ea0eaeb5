//! Diagnostic view of the most recent touch frame. Low rate consumers can
//! poll for new frames and read a textual snapshot of every slot without
//! taking the report processing lock.

use std::{
    collections::TryReserveError,
    fmt::Write,
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::{sync::Notify, time::Instant};

use super::touch_report::ObjectStatus;

/// State of a single slot as it was last reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct TouchInfo {
    pub state: ObjectStatus,
    pub x: u32,
    pub y: u32,
    pub wx: u32,
    pub wy: u32,
    pub z: u32,
}

/// Result of waiting for a new diagnostic frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollResult {
    /// A new frame is available
    Ready,
    /// No frame arrived within the timeout
    TimedOut,
    /// The device was removed while waiting
    Ceased,
}

#[derive(Debug, Default)]
struct DiagState {
    fingers: Vec<TouchInfo>,
    fresh: bool,
    ceased: bool,
}

#[derive(Debug, Default)]
pub struct Diagnostics {
    state: Mutex<DiagState>,
    notify: Notify,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, DiagState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reallocate the snapshot for the given number of slots. Any previous
    /// data is discarded.
    pub fn resize(&self, max_objects: usize) -> Result<(), TryReserveError> {
        let mut fingers = Vec::new();
        let result = fingers.try_reserve_exact(max_objects);
        if result.is_ok() {
            fingers.resize(max_objects, TouchInfo::default());
        }

        let mut state = self.state();
        state.fingers = fingers;
        state.fresh = false;
        state.ceased = false;
        result
    }

    /// Returns the number of slots in the snapshot
    pub fn len(&self) -> usize {
        self.state().fingers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy the latest per slot state into the snapshot and wake up anyone
    /// waiting on [Diagnostics::poll].
    pub fn publish(&self, fingers: &[TouchInfo]) {
        {
            let mut state = self.state();
            if state.ceased {
                return;
            }
            if state.fingers.len() != fingers.len() {
                log::trace!(
                    "Diagnostic snapshot has {} slots but frame has {}",
                    state.fingers.len(),
                    fingers.len()
                );
                return;
            }
            state.fingers.copy_from_slice(fingers);
            state.fresh = true;
        }
        self.notify.notify_waiters();
    }

    /// Wait up to the given timeout for a frame that has not been read yet.
    pub async fn poll(&self, timeout: Duration) -> PollResult {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a publish in between is
            // not missed.
            notified.as_mut().enable();
            {
                let state = self.state();
                if state.ceased {
                    return PollResult::Ceased;
                }
                if state.fresh {
                    return PollResult::Ready;
                }
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return PollResult::TimedOut;
            }
        }
    }

    /// Render the snapshot with one line per slot and mark it as consumed.
    /// Returns an empty string if no new frame arrived since the last read.
    pub fn read(&self) -> String {
        let mut state = self.state();
        if !state.fresh {
            return String::new();
        }
        state.fresh = false;

        let mut buf = String::new();
        for (id, finger) in state.fingers.iter().enumerate() {
            let _ = writeln!(
                buf,
                "id={},state={},x={},y={},wx={},wy={},z={}",
                id,
                finger.state.to_raw(),
                finger.x,
                finger.y,
                finger.wx,
                finger.wy,
                finger.z
            );
        }
        buf
    }

    /// Returns a copy of the snapshot without consuming it
    pub fn snapshot(&self) -> Vec<TouchInfo> {
        self.state().fingers.clone()
    }

    pub fn is_fresh(&self) -> bool {
        self.state().fresh
    }

    /// Release every waiter and stop accepting new frames
    pub fn cease(&self) {
        {
            let mut state = self.state();
            state.ceased = true;
            state.fresh = false;
            state.fingers.clear();
        }
        self.notify.notify_waiters();
    }

    pub fn is_ceased(&self) -> bool {
        self.state().ceased
    }
}
