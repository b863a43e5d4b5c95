//! Per-user onboarding progress, persisted in local storage.
//!
//! Independent of the session lifecycle: progress survives sign-out and is
//! picked up again when the same user signs back in.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::storage::{LocalStore, StorageError, get_json, set_json};

pub const ONBOARDING_TOTAL_STEPS: u32 = 4;
const KEY_PREFIX: &str = "gymdesk_onboarding_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnboardingState {
    /// Finished or skipped; the wizard is no longer shown.
    pub is_complete: bool,
    /// Zero-based index of the step on screen.
    pub current_step: u32,
    /// Number of wizard steps.
    pub total_steps: u32,
    /// The tutorial has been viewed at least once.
    pub has_viewed_tutorial: bool,
}

impl Default for OnboardingState {
    fn default() -> Self {
        Self { is_complete: false, current_step: 0, total_steps: ONBOARDING_TOTAL_STEPS, has_viewed_tutorial: false }
    }
}

#[must_use]
pub fn storage_key(user_id: Uuid) -> String {
    format!("{KEY_PREFIX}{user_id}")
}

pub struct OnboardingTracker {
    storage: Arc<dyn LocalStore>,
    key: String,
    state: OnboardingState,
}

impl OnboardingTracker {
    /// Load the user's progress. Missing or unreadable entries start fresh.
    #[must_use]
    pub fn load(storage: Arc<dyn LocalStore>, user_id: Uuid) -> Self {
        let key = storage_key(user_id);
        let state = match get_json::<OnboardingState>(storage.as_ref(), &key) {
            Ok(Some(state)) => state,
            Ok(None) => OnboardingState::default(),
            Err(e) => {
                warn!(%user_id, error = %e, "discarding unreadable onboarding state");
                OnboardingState::default()
            }
        };
        Self { storage, key, state }
    }

    #[must_use]
    pub fn state(&self) -> OnboardingState {
        self.state
    }

    fn save(&mut self, state: OnboardingState) -> Result<OnboardingState, StorageError> {
        set_json(self.storage.as_ref(), &self.key, &state)?;
        debug!(key = %self.key, step = state.current_step, complete = state.is_complete, "onboarding saved");
        self.state = state;
        Ok(state)
    }

    /// Advance one step; advancing past the last step completes onboarding.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be persisted.
    pub fn next_step(&mut self) -> Result<OnboardingState, StorageError> {
        let mut state = self.state;
        if state.current_step + 1 >= state.total_steps {
            state.is_complete = true;
        } else {
            state.current_step += 1;
        }
        self.save(state)
    }

    /// # Errors
    ///
    /// Returns an error if the state cannot be persisted.
    pub fn previous_step(&mut self) -> Result<OnboardingState, StorageError> {
        let mut state = self.state;
        state.current_step = state.current_step.saturating_sub(1);
        self.save(state)
    }

    /// # Errors
    ///
    /// Returns an error if the state cannot be persisted.
    pub fn complete(&mut self) -> Result<OnboardingState, StorageError> {
        let mut state = self.state;
        state.is_complete = true;
        state.current_step = state.total_steps.saturating_sub(1);
        self.save(state)
    }

    /// Complete onboarding without walking the steps.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be persisted.
    pub fn skip(&mut self) -> Result<OnboardingState, StorageError> {
        let mut state = self.state;
        state.is_complete = true;
        self.save(state)
    }

    /// # Errors
    ///
    /// Returns an error if the state cannot be persisted.
    pub fn mark_tutorial_viewed(&mut self) -> Result<OnboardingState, StorageError> {
        let mut state = self.state;
        state.has_viewed_tutorial = true;
        self.save(state)
    }

    /// # Errors
    ///
    /// Returns an error if the stored entry cannot be removed.
    pub fn reset(&mut self) -> Result<OnboardingState, StorageError> {
        self.storage.remove(&self.key)?;
        self.state = OnboardingState::default();
        Ok(self.state)
    }
}

#[cfg(test)]
#[path = "onboarding_test.rs"]
mod tests;
