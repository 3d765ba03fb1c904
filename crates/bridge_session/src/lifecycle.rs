//! Lifecycle state machine.
//!
//! ```text
//! UNINITIALIZED --initialize--> EDIT --commit--> RUN --edit--> UPDATE
//!                                                 ^              |
//!                                                 +--recommit----+
//! any live state --cleanup--> STOPPED
//! ```
//!
//! Transitions are driven only by explicit calls. Besides the transitions,
//! individual operations (remote functions, entity creation) may declare a
//! window of states in which they are legal.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::error::SessionError;

/// The phase of a worker session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// The worker exists but has not been initialized.
    Uninitialized,
    /// Initialized; parameters and entities are being set up.
    Edit,
    /// Committed; the model can be evolved.
    Run,
    /// Re-opened for edits after a run.
    Update,
    /// Terminal. The worker is gone.
    Stopped,
}

impl LifecycleState {
    /// Every state except [`LifecycleState::Stopped`].
    pub const LIVE: [Self; 4] = [Self::Uninitialized, Self::Edit, Self::Run, Self::Update];
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Uninitialized => "UNINITIALIZED",
            Self::Edit => "EDIT",
            Self::Run => "RUN",
            Self::Update => "UPDATE",
            Self::Stopped => "STOPPED",
        };
        f.write_str(name)
    }
}

/// An explicit lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    /// UNINITIALIZED → EDIT.
    Initialize,
    /// EDIT → RUN.
    Commit,
    /// RUN → UPDATE.
    Edit,
    /// UPDATE → RUN.
    Recommit,
    /// Any live state → STOPPED.
    Cleanup,
}

impl Transition {
    /// Operation name used in errors and logs.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Commit => "commit",
            Self::Edit => "edit",
            Self::Recommit => "recommit",
            Self::Cleanup => "cleanup",
        }
    }

    /// States the transition may start from.
    #[must_use]
    pub fn sources(self) -> &'static [LifecycleState] {
        use LifecycleState::{Edit, Run, Uninitialized, Update};
        match self {
            Self::Initialize => &[Uninitialized],
            Self::Commit => &[Edit],
            Self::Edit => &[Run],
            Self::Recommit => &[Update],
            Self::Cleanup => &LifecycleState::LIVE,
        }
    }

    /// The state the transition ends in.
    #[must_use]
    pub fn target(self) -> LifecycleState {
        match self {
            Self::Initialize => LifecycleState::Edit,
            Self::Commit | Self::Recommit => LifecycleState::Run,
            Self::Edit => LifecycleState::Update,
            Self::Cleanup => LifecycleState::Stopped,
        }
    }
}

/// Tracks the current [`LifecycleState`] and per-operation legality
/// windows.
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: LifecycleState,
    windows: HashMap<String, Vec<LifecycleState>>,
}

impl StateMachine {
    /// A machine in UNINITIALIZED with the standard `evolve` window (RUN).
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: LifecycleState::Uninitialized,
            windows: HashMap::new(),
        }
        .with_window("evolve", [LifecycleState::Run])
    }

    /// Restrict `operation` to the given states.
    #[must_use]
    pub fn with_window(
        mut self,
        operation: impl Into<String>,
        states: impl IntoIterator<Item = LifecycleState>,
    ) -> Self {
        self.set_window(operation, states);
        self
    }

    /// Restrict `operation` to the given states, replacing any earlier
    /// window.
    pub fn set_window(
        &mut self,
        operation: impl Into<String>,
        states: impl IntoIterator<Item = LifecycleState>,
    ) {
        self.windows
            .insert(operation.into(), states.into_iter().collect());
    }

    /// The window declared for `operation`, if any.
    #[must_use]
    pub fn window(&self, operation: &str) -> Option<&[LifecycleState]> {
        self.windows.get(operation).map(Vec::as_slice)
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Returns `true` once the session has stopped.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.state == LifecycleState::Stopped
    }

    /// Check that `operation` may run now.
    ///
    /// Operations without a declared window are legal in every live state.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::IllegalStateTransition`] in STOPPED, or
    /// outside the operation's window.
    pub fn check_operation(&self, operation: &str) -> Result<(), SessionError> {
        let legal = !self.is_stopped()
            && self
                .windows
                .get(operation)
                .is_none_or(|states| states.contains(&self.state));
        if legal {
            Ok(())
        } else {
            Err(self.illegal(operation))
        }
    }

    /// Check that `operation` may run in one of `states`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::IllegalStateTransition`] otherwise.
    pub fn check_states(
        &self,
        operation: &str,
        states: &[LifecycleState],
    ) -> Result<(), SessionError> {
        if states.contains(&self.state) {
            Ok(())
        } else {
            Err(self.illegal(operation))
        }
    }

    /// Check that `transition` may start from the current state, without
    /// applying it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::IllegalStateTransition`] and leaves the state
    /// unchanged.
    pub fn check_transition(&self, transition: Transition) -> Result<(), SessionError> {
        self.check_states(transition.name(), transition.sources())
    }

    /// Apply `transition`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::IllegalStateTransition`] and leaves the state
    /// unchanged.
    pub fn apply(&mut self, transition: Transition) -> Result<LifecycleState, SessionError> {
        self.check_transition(transition)?;
        let from = self.state;
        self.state = transition.target();
        info!(
            transition = transition.name(),
            from = %from,
            to = %self.state,
            "lifecycle transition"
        );
        Ok(self.state)
    }

    /// Enter STOPPED unconditionally.
    pub fn force_stop(&mut self) {
        if !self.is_stopped() {
            warn!(from = %self.state, "session forced to STOPPED");
            self.state = LifecycleState::Stopped;
        }
    }

    fn illegal(&self, operation: &str) -> SessionError {
        SessionError::IllegalStateTransition {
            operation: operation.to_string(),
            state: self.state,
        }
    }
}

/// A setter's window for direct calls: `states` without UNINITIALIZED,
/// plus RUN when the setter is runtime-mutable.
pub(crate) fn call_window(states: &[LifecycleState], runtime_mutable: bool) -> Vec<LifecycleState> {
    let mut window: Vec<LifecycleState> = states
        .iter()
        .copied()
        .filter(|s| *s != LifecycleState::Uninitialized)
        .collect();
    if runtime_mutable && !window.contains(&LifecycleState::Run) {
        window.push(LifecycleState::Run);
    }
    window
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_cycle() {
        let mut sm = StateMachine::new();
        assert_eq!(sm.apply(Transition::Initialize).unwrap(), LifecycleState::Edit);
        assert_eq!(sm.apply(Transition::Commit).unwrap(), LifecycleState::Run);
        assert_eq!(sm.apply(Transition::Edit).unwrap(), LifecycleState::Update);
        assert_eq!(sm.apply(Transition::Recommit).unwrap(), LifecycleState::Run);
        assert_eq!(sm.apply(Transition::Cleanup).unwrap(), LifecycleState::Stopped);
    }

    #[test]
    fn test_illegal_transition_leaves_state() {
        let mut sm = StateMachine::new();
        let err = sm.apply(Transition::Commit).unwrap_err();
        assert!(matches!(
            err,
            SessionError::IllegalStateTransition {
                state: LifecycleState::Uninitialized,
                ..
            }
        ));
        assert_eq!(sm.state(), LifecycleState::Uninitialized);
    }

    #[test]
    fn test_stopped_is_terminal() {
        let mut sm = StateMachine::new();
        sm.apply(Transition::Cleanup).unwrap();
        assert!(sm.apply(Transition::Initialize).is_err());
        assert!(sm.apply(Transition::Cleanup).is_err());
        assert!(sm.check_operation("get_time").is_err());
    }

    #[test]
    fn test_operation_windows() {
        let mut sm = StateMachine::new().with_window("get_kinetic_energy", [LifecycleState::Run]);
        sm.apply(Transition::Initialize).unwrap();
        assert!(sm.check_operation("get_kinetic_energy").is_err());
        assert!(sm.check_operation("evolve").is_err());
        assert!(sm.check_operation("get_time").is_ok());
        sm.apply(Transition::Commit).unwrap();
        assert!(sm.check_operation("get_kinetic_energy").is_ok());
        assert!(sm.check_operation("evolve").is_ok());
    }

    #[test]
    fn test_force_stop() {
        let mut sm = StateMachine::new();
        sm.apply(Transition::Initialize).unwrap();
        sm.force_stop();
        assert_eq!(sm.state(), LifecycleState::Stopped);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(LifecycleState::Update.to_string(), "UPDATE");
    }
}
