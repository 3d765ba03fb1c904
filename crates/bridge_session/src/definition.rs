//! Static description of one worker code.

use std::sync::Arc;

use bridge_spec::FunctionTable;

use crate::entity_set::EntitySetDefinition;
use crate::grid::GridDefinition;
use crate::lifecycle::{LifecycleState, StateMachine};
use crate::parameters::ParameterDescriptor;

/// Remote functions run at each lifecycle transition. Hooks the function
/// table does not declare are skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct Hooks {
    /// Run by `initialize`.
    pub initialize: Vec<String>,
    /// Run by `commit`, after parameters are sent.
    pub commit: Vec<String>,
    /// Run by `recommit`.
    pub recommit: Vec<String>,
    /// Called by `evolve` with the end time.
    pub evolve: Option<String>,
    /// Run by `cleanup`.
    pub cleanup: Vec<String>,
}

impl Default for Hooks {
    fn default() -> Self {
        Self {
            initialize: vec!["initialize_code".to_string()],
            commit: vec![
                "commit_parameters".to_string(),
                "commit_particles".to_string(),
            ],
            recommit: vec![
                "recommit_parameters".to_string(),
                "recommit_particles".to_string(),
            ],
            evolve: Some("evolve_model".to_string()),
            cleanup: vec!["cleanup_code".to_string()],
        }
    }
}

/// Everything a [`Session`](crate::Session) needs to know about a worker
/// code: its functions, parameters, entity sets, grids, hooks and state
/// windows.
#[derive(Debug, Clone)]
pub struct CodeDefinition {
    /// Code name, for logs.
    pub name: String,
    /// Default worker name, for the call subject.
    pub worker: String,
    /// Declared remote functions.
    pub functions: Arc<FunctionTable>,
    /// Parameter declarations, in presentation order.
    pub parameters: Vec<ParameterDescriptor>,
    /// Entity set declarations.
    pub entity_sets: Vec<EntitySetDefinition>,
    /// Grid declarations.
    pub grids: Vec<GridDefinition>,
    /// Lifecycle hooks.
    pub hooks: Hooks,
    /// Per-operation windows.
    pub state_machine: StateMachine,
}

impl CodeDefinition {
    /// Start a definition over `functions` with default hooks.
    #[must_use]
    pub fn new(name: impl Into<String>, functions: FunctionTable) -> Self {
        let name = name.into();
        Self {
            worker: name.clone(),
            name,
            functions: Arc::new(functions),
            parameters: Vec::new(),
            entity_sets: Vec::new(),
            grids: Vec::new(),
            hooks: Hooks::default(),
            state_machine: StateMachine::new(),
        }
    }

    /// Set the default worker name.
    #[must_use]
    pub fn worker(mut self, worker: impl Into<String>) -> Self {
        self.worker = worker.into();
        self
    }

    /// Add a parameter.
    #[must_use]
    pub fn parameter(mut self, descriptor: ParameterDescriptor) -> Self {
        self.parameters.push(descriptor);
        self
    }

    /// Add an entity set.
    #[must_use]
    pub fn entity_set(mut self, definition: EntitySetDefinition) -> Self {
        self.entity_sets.push(definition);
        self
    }

    /// Add a grid.
    #[must_use]
    pub fn grid(mut self, definition: GridDefinition) -> Self {
        self.grids.push(definition);
        self
    }

    /// Replace the hooks.
    #[must_use]
    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Restrict a function to the given states.
    #[must_use]
    pub fn window(
        mut self,
        function: impl Into<String>,
        states: impl IntoIterator<Item = LifecycleState>,
    ) -> Self {
        self.state_machine.set_window(function, states);
        self
    }
}
