//! Worker lifecycle state machine.
//!
//! ```text
//! Parsed -> Installing -> Installed -> Activating -> Activated
//!               |                                       |
//!               +--> Redundant     (re-install) <-------+
//! ```
//!
//! A failed install marks the worker `Redundant`, unless a previous version
//! was already `Activated`, in which case that version keeps control.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shellcache_core::Error;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Parsed => "parsed",
            LifecycleState::Installing => "installing",
            LifecycleState::Installed => "installed",
            LifecycleState::Activating => "activating",
            LifecycleState::Activated => "activated",
            LifecycleState::Redundant => "redundant",
        }
    }

    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Parsed | Redundant | Activated, Installing)
                | (Installing, Installed | Redundant)
                | (Installed, Activating)
                | (Activating, Activated)
        )
    }
}

/// Current lifecycle state behind an async lock.
#[derive(Debug)]
pub struct Lifecycle {
    state: RwLock<LifecycleState>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self { state: RwLock::new(LifecycleState::Parsed) }
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn state(&self) -> LifecycleState {
        *self.state.read().await
    }

    /// Move to `next`, returning the state that was left.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidState` if the transition is not allowed.
    pub async fn transition(&self, next: LifecycleState) -> Result<LifecycleState, Error> {
        let mut state = self.state.write().await;
        let previous = *state;
        if !previous.can_transition_to(next) {
            return Err(Error::InvalidState(format!(
                "cannot move from {} to {}",
                previous.as_str(),
                next.as_str()
            )));
        }
        *state = next;
        tracing::info!(from = previous.as_str(), to = next.as_str(), "worker state changed");
        Ok(previous)
    }

    /// Leave `Installing` after a failed install.
    pub async fn abort_install(&self, previous: LifecycleState) -> LifecycleState {
        let next = if previous == LifecycleState::Activated {
            LifecycleState::Activated
        } else {
            LifecycleState::Redundant
        };
        let mut state = self.state.write().await;
        if *state == LifecycleState::Installing {
            *state = next;
            tracing::info!(to = next.as_str(), "install aborted");
        }
        *state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_happy_path() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state().await, LifecycleState::Parsed);

        for next in [
            LifecycleState::Installing,
            LifecycleState::Installed,
            LifecycleState::Activating,
            LifecycleState::Activated,
        ] {
            lifecycle.transition(next).await.unwrap();
        }
        assert_eq!(lifecycle.state().await, LifecycleState::Activated);
    }

    #[tokio::test]
    async fn test_invalid_transition() {
        let lifecycle = Lifecycle::new();
        let err = lifecycle.transition(LifecycleState::Activating).await.unwrap_err();
        assert!(err.to_string().contains("INVALID_STATE"));
        assert_eq!(lifecycle.state().await, LifecycleState::Parsed);
    }

    #[tokio::test]
    async fn test_transition_cannot_skip_to_activated() {
        let lifecycle = Lifecycle::new();
        lifecycle.transition(LifecycleState::Installing).await.unwrap();
        let err = lifecycle.transition(LifecycleState::Activated).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        assert_eq!(lifecycle.state().await, LifecycleState::Installing);
    }

    #[tokio::test]
    async fn test_abort_first_install_is_redundant() {
        let lifecycle = Lifecycle::new();
        let previous = lifecycle.transition(LifecycleState::Installing).await.unwrap();
        assert_eq!(lifecycle.abort_install(previous).await, LifecycleState::Redundant);
    }

    #[tokio::test]
    async fn test_abort_reinstall_keeps_active_version() {
        let lifecycle = Lifecycle::new();
        for next in [
            LifecycleState::Installing,
            LifecycleState::Installed,
            LifecycleState::Activating,
            LifecycleState::Activated,
        ] {
            lifecycle.transition(next).await.unwrap();
        }

        let previous = lifecycle.transition(LifecycleState::Installing).await.unwrap();
        assert_eq!(previous, LifecycleState::Activated);
        assert_eq!(lifecycle.abort_install(previous).await, LifecycleState::Activated);
    }

    #[test]
    fn test_transition_table() {
        use LifecycleState::*;
        assert!(Parsed.can_transition_to(Installing));
        assert!(Installing.can_transition_to(Redundant));
        assert!(!Installing.can_transition_to(Activated));
        assert!(!Installed.can_transition_to(Activated));
        assert!(!Activated.can_transition_to(Activating));
        assert!(!Redundant.can_transition_to(Activated));
    }
}
