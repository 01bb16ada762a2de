//! Lifecycle of a single launch.

use std::fmt;

use thiserror::Error;

/// Where a launch stands.
///
/// `Created -> IdentitySwitched -> Executing -> Exited` is the only path to
/// a running program. `Failed` is reachable from `Created` (the switch
/// failed) and from `Executing` (the program image could not be loaded).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LaunchState {
    /// The child exists but still holds the parent's identity.
    Created,
    /// The child has irrevocably become the target identity.
    IdentitySwitched,
    /// The child is loading or running the program.
    Executing,
    /// The child terminated and was reaped.
    Exited,
    /// The launch failed before the program ran.
    Failed,
}

/// Rejected state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid launch transition {from} -> {to}")]
pub struct InvalidTransition {
    /// State the launch was in.
    pub from: LaunchState,
    /// State that was requested.
    pub to: LaunchState,
}

impl LaunchState {
    /// Returns `true` if the launch may move from `self` to `next`.
    #[must_use]
    pub const fn can_advance(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::IdentitySwitched | Self::Failed)
                | (Self::IdentitySwitched, Self::Executing)
                | (Self::Executing, Self::Exited | Self::Failed)
        )
    }

    /// Moves to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] if the move would skip a state.
    pub const fn advance(self, next: Self) -> Result<Self, InvalidTransition> {
        if self.can_advance(next) {
            Ok(next)
        } else {
            Err(InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for LaunchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::IdentitySwitched => write!(f, "identity-switched"),
            Self::Executing => write!(f, "executing"),
            Self::Exited => write!(f, "exited"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_path_visits_every_state() {
        let state = LaunchState::Created
            .advance(LaunchState::IdentitySwitched)
            .and_then(|s| s.advance(LaunchState::Executing))
            .and_then(|s| s.advance(LaunchState::Exited))
            .unwrap();
        assert_eq!(state, LaunchState::Exited);
    }

    #[test]
    fn execution_cannot_skip_the_identity_switch() {
        let err = LaunchState::Created
            .advance(LaunchState::Executing)
            .unwrap_err();
        assert_eq!(err.from, LaunchState::Created);
        assert_eq!(err.to.to_string(), "executing");
    }

    #[test]
    fn failure_is_reachable_only_from_created_and_executing() {
        assert!(LaunchState::Created.can_advance(LaunchState::Failed));
        assert!(LaunchState::Executing.can_advance(LaunchState::Failed));
        assert!(!LaunchState::IdentitySwitched.can_advance(LaunchState::Failed));
        assert!(!LaunchState::Exited.can_advance(LaunchState::Failed));
    }

    #[test]
    fn terminal_states_are_final() {
        for next in [
            LaunchState::Created,
            LaunchState::IdentitySwitched,
            LaunchState::Executing,
            LaunchState::Exited,
        ] {
            assert!(!LaunchState::Exited.can_advance(next));
            assert!(!LaunchState::Failed.can_advance(next));
        }
    }
}
