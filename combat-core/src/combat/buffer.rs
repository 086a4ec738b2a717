//! Short-lived buffer for defensive presses that arrived too early.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::settings::CombatSettings;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BufferedInput {
    Block,
    Parry,
    Dodge(Vec3),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct PendingInput {
    input: BufferedInput,
    expires_at: f32,
}

/// Holds the most recent rejected press until it succeeds or expires.
/// A newer press replaces an older one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputBuffer {
    pending: Option<PendingInput>,
}

impl InputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, input: BufferedInput, now: f32, settings: &CombatSettings) {
        if settings.input_buffer_duration <= 0.0 {
            return;
        }
        self.pending = Some(PendingInput {
            input,
            expires_at: now + settings.input_buffer_duration,
        });
    }

    /// The live buffered input, dropping it if it has expired.
    pub fn peek(&mut self, now: f32) -> Option<BufferedInput> {
        match self.pending {
            Some(pending) if now <= pending.expires_at => Some(pending.input),
            Some(_) => {
                self.pending = None;
                None
            }
            None => None,
        }
    }

    /// Remove a buffered block press (block released before it applied).
    pub fn cancel_block(&mut self) {
        if matches!(
            self.pending,
            Some(PendingInput {
                input: BufferedInput::Block,
                ..
            })
        ) {
            self.pending = None;
        }
    }

    pub fn clear(&mut self) {
        self.pending = None;
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_none()
    }
}
