// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Send flow states and progress events.

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use utoipa::ToSchema;

pub const RESOLVING_MESSAGE: &str = "Resolving recipient...";
pub const PREPARING_MESSAGE: &str = "Preparing transaction...";
pub const SENDING_MESSAGE: &str = "Sending...";
pub const CREATING_INTENT_MESSAGE: &str = "Creating transfer invitation...";

/// ```text
/// Idle → Validating → Resolving ─┬─▶ BuildingDirect ─┬─▶ Submitting → Succeeded
///                                └─▶ CreatingIntent ─┘              ↘ Failed
/// ```
#[derive(Debug, Clone, Copy, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SendState {
    Idle,
    Validating,
    Resolving,
    BuildingDirect,
    CreatingIntent,
    Submitting,
    Succeeded,
    Failed,
}

impl SendState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SendState::Succeeded | SendState::Failed)
    }
}

#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct SendProgress {
    pub state: SendState,
    pub message: String,
}

impl SendProgress {
    pub fn new(state: SendState, message: impl Into<String>) -> Self {
        Self {
            state,
            message: message.into(),
        }
    }
}

/// Receives progress events at each state entry.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, progress: SendProgress);
}

/// Discards progress.
impl ProgressReporter for () {
    fn report(&self, _progress: SendProgress) {}
}

impl ProgressReporter for UnboundedSender<SendProgress> {
    fn report(&self, progress: SendProgress) {
        // Receiver gone means nobody is watching.
        let _ = self.send(progress);
    }
}
