// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Lifecycle state tracking
//!
//! The lifecycle manager is the only writer; everyone else observes the
//! current state through a [`StateTracker`] clone or a watch receiver.

use std::{fmt, sync::Arc};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

/// Process lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    /// Connecting to the store and binding the socket
    Starting,
    /// Accepting connections
    Listening,
    /// No longer accepting connections; in-flight requests finishing
    Draining,
    /// Drain complete
    Terminated,
    /// Hard failure; the process exits without draining
    Failed,
}

impl LifecycleState {
    /// Whether moving from `self` to `next` is allowed
    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Failed, _) => false,
            (_, Self::Failed)
            | (Self::Starting, Self::Listening)
            | (Self::Listening, Self::Draining)
            | (Self::Draining, Self::Terminated) => true,
            _ => false,
        }
    }

    /// `TERMINATED` or `FAILED`
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Terminated | Self::Failed)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Starting => "STARTING",
            Self::Listening => "LISTENING",
            Self::Draining => "DRAINING",
            Self::Terminated => "TERMINATED",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Shared handle to the lifecycle state
#[derive(Debug, Clone)]
pub struct StateTracker {
    sender: Arc<watch::Sender<LifecycleState>>,
}

impl StateTracker {
    /// Start tracking in `STARTING`
    pub fn new() -> Self {
        Self {
            sender: Arc::new(watch::Sender::new(LifecycleState::Starting)),
        }
    }

    /// Current state
    pub fn current(&self) -> LifecycleState {
        *self.sender.borrow()
    }

    /// Move to `next` if the transition is allowed
    ///
    /// Returns whether the state changed.
    pub fn transition(&self, next: LifecycleState) -> bool {
        let mut previous = None;
        let changed = self.sender.send_if_modified(|state| {
            if state.can_transition_to(next) {
                previous = Some(*state);
                *state = next;
                true
            } else {
                false
            }
        });

        match previous {
            Some(from) => info!(from = %from, to = %next, "lifecycle state changed"),
            None => debug!(
                current = %self.current(),
                requested = %next,
                "ignored lifecycle transition"
            ),
        }

        changed
    }

    /// Observe state changes
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.sender.subscribe()
    }

    /// Wait until the state equals `target`
    pub async fn wait_for(&self, target: LifecycleState) {
        let mut receiver = self.subscribe();
        // The sender lives in `self`, so the channel cannot close here
        let _ = receiver.wait_for(|state| *state == target).await;
    }
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}
