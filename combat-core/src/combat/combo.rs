//! Combo chain counter shared by the local attack controller and the
//! network authority.

use serde::{Deserialize, Serialize};

/// Counts consecutive attacks landed inside the combo window.
///
/// The index runs `1..=max` and wraps back to 1; an attack after the
/// deadline starts a new chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComboTracker {
    index: u32,
    deadline: Option<f32>,
}

impl ComboTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new attack at `now` and return its combo index.
    pub fn advance(&mut self, now: f32, max_combo: u32, reset_after: f32) -> u32 {
        let max_combo = max_combo.max(1);
        self.index = if self.index > 0 && self.is_live(now) {
            self.index % max_combo + 1
        } else {
            1
        };
        self.deadline = Some(now + reset_after);
        self.index
    }

    /// Push the deadline out (combo window opened).
    pub fn extend(&mut self, now: f32, reset_after: f32) {
        if self.index > 0 {
            self.deadline = Some(now + reset_after);
        }
    }

    pub fn is_live(&self, now: f32) -> bool {
        self.deadline.is_some_and(|d| now <= d)
    }

    /// Current index, or 0 when no chain is running.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn deadline(&self) -> Option<f32> {
        self.deadline
    }

    /// Drop the chain if its deadline has passed.
    pub fn expire(&mut self, now: f32) {
        if self.index > 0 && !self.is_live(now) {
            self.reset();
        }
    }

    pub fn reset(&mut self) {
        self.index = 0;
        self.deadline = None;
    }
}
