// crates/client/src/auto_read.rs
//! Auto-read dwell machine for the live notification popup.
//!
//! Each notification moves through `Unseen → Visible → Fading → Read`.
//! Visibility changes come from a single upstream source (≥50% viewport
//! intersection, decided by the embedding frontend); time comes from explicit
//! `Instant` arguments so tests drive the clock with literal values.
//!
//! A notification that stays continuously visible for the dwell period starts
//! fading (visual cue); once the fade interval passes it becomes `Read` and
//! is reported exactly once so the caller can issue the server call. Leaving
//! the viewport before the dwell elapses cancels the pending transition and
//! returns the item to `Unseen`: a cancelled dwell can never fire, and
//! re-entering visibility restarts it from zero. Once fading, the transition
//! is committed. At most one dwell is pending per notification.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Externally observable state of one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DwellState {
    Unseen,
    Visible,
    Fading,
    Read,
}

#[derive(Debug, Clone, Copy)]
enum ItemState {
    Unseen,
    Visible { since: Instant },
    Fading { since: Instant },
    Read,
}

/// Transitions produced by one [`AutoReadTracker::poll`] tick.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PollOutcome {
    /// Ids that just started fading (start the visual cue).
    pub fading: Vec<String>,
    /// Ids that just became read (issue the mark-read call once).
    pub read: Vec<String>,
}

impl PollOutcome {
    pub fn is_empty(&self) -> bool {
        self.fading.is_empty() && self.read.is_empty()
    }
}

/// Per-notification dwell timers, driven by visibility events and poll ticks.
#[derive(Debug)]
pub struct AutoReadTracker {
    dwell: Duration,
    fade: Duration,
    items: HashMap<String, ItemState>,
}

/// Continuous visibility required before a notification starts fading.
pub const DEFAULT_DWELL: Duration = Duration::from_secs(5);
/// Visual fade interval between `Fading` and `Read`.
pub const DEFAULT_FADE: Duration = Duration::from_millis(400);

impl Default for AutoReadTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl AutoReadTracker {
    pub fn new() -> Self {
        Self::with_timing(DEFAULT_DWELL, DEFAULT_FADE)
    }

    pub fn with_timing(dwell: Duration, fade: Duration) -> Self {
        Self {
            dwell,
            fade,
            items: HashMap::new(),
        }
    }

    pub fn state(&self, id: &str) -> DwellState {
        match self.items.get(id) {
            None | Some(ItemState::Unseen) => DwellState::Unseen,
            Some(ItemState::Visible { .. }) => DwellState::Visible,
            Some(ItemState::Fading { .. }) => DwellState::Fading,
            Some(ItemState::Read) => DwellState::Read,
        }
    }

    /// Feed a visibility change for one notification.
    pub fn on_visibility(&mut self, id: &str, visible: bool, now: Instant) {
        let state = self
            .items
            .entry(id.to_string())
            .or_insert(ItemState::Unseen);
        *state = match (*state, visible) {
            // Entering the viewport starts a fresh dwell.
            (ItemState::Unseen, true) => ItemState::Visible { since: now },
            // Leaving before the dwell elapsed cancels it.
            (ItemState::Visible { .. }, false) => ItemState::Unseen,
            // Repeated callbacks while visible do not restart the dwell;
            // fading and read are past the point of cancellation.
            (other, _) => other,
        };
    }

    /// Advance time-based transitions. Returns ids in sorted order so
    /// callers and tests see deterministic output.
    pub fn poll(&mut self, now: Instant) -> PollOutcome {
        let mut outcome = PollOutcome::default();
        for (id, state) in self.items.iter_mut() {
            match *state {
                ItemState::Visible { since } if now.duration_since(since) >= self.dwell => {
                    *state = ItemState::Fading { since: now };
                    outcome.fading.push(id.clone());
                }
                ItemState::Fading { since } if now.duration_since(since) >= self.fade => {
                    *state = ItemState::Read;
                    outcome.read.push(id.clone());
                }
                _ => {}
            }
        }
        outcome.fading.sort();
        outcome.read.sort();
        outcome
    }

    /// Drop tracking state for a dismissed or deleted notification.
    pub fn remove(&mut self, id: &str) {
        self.items.remove(id);
    }
}
