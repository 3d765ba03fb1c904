//! The session: one controller's view of one worker.
//!
//! A [`Session`] composes a [`Marshaller`], a [`StateMachine`], a
//! [`ParameterRegistry`] and the code's entity sets and grids. Calls are
//! strictly sequential; a session is driven from one thread at a time
//! (`&mut self` everywhere). A transport failure is fatal: the session
//! enters STOPPED and every later operation is rejected.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bridge_net::Transport;
use bridge_spec::{EntityHandle, FunctionTable, Value};
use glam::IVec3;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::definition::{CodeDefinition, Hooks};
use crate::entity_set::EntitySet;
use crate::error::SessionError;
use crate::grid::{GridSet, IndexRange};
use crate::lifecycle::{LifecycleState, StateMachine, Transition};
use crate::marshaller::{CallOutput, Marshaller};
use crate::parameters::ParameterRegistry;

/// States in which worker-side data can be read.
const READABLE: [LifecycleState; 3] = [
    LifecycleState::Edit,
    LifecycleState::Run,
    LifecycleState::Update,
];

/// A live connection to one worker.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    code: String,
    marshaller: Marshaller,
    lifecycle: StateMachine,
    parameters: ParameterRegistry,
    sets: HashMap<String, EntitySet>,
    grids: HashMap<String, GridSet>,
    hooks: Hooks,
}

impl Session {
    /// Build a session for `definition` over `transport`.
    ///
    /// # Errors
    ///
    /// Returns an error if a parameter, set or grid refers to an undeclared
    /// or ill-shaped function.
    pub fn new(
        definition: &CodeDefinition,
        transport: Box<dyn Transport>,
    ) -> Result<Self, SessionError> {
        let table = &definition.functions;
        let parameters = ParameterRegistry::new(definition.parameters.iter().cloned(), table)?;
        let sets = definition
            .entity_sets
            .iter()
            .map(|d| Ok((d.name().to_string(), EntitySet::new(d, table)?)))
            .collect::<Result<HashMap<_, _>, SessionError>>()?;
        let grids = definition
            .grids
            .iter()
            .map(|d| Ok((d.name().to_string(), GridSet::new(d, table)?)))
            .collect::<Result<HashMap<_, _>, SessionError>>()?;

        let mut lifecycle = definition.state_machine.clone();
        let bound = parameters
            .call_windows()
            .into_iter()
            .chain(sets.values().flat_map(EntitySet::call_windows))
            .chain(grids.values().flat_map(GridSet::call_windows));
        for (function, window) in bound {
            if lifecycle.window(&function).is_none() {
                lifecycle.set_window(function, window);
            }
        }

        let id = Uuid::new_v4();
        info!(
            session = %id,
            code = %definition.name,
            functions = table.len(),
            parameters = parameters.len(),
            sets = sets.len(),
            grids = grids.len(),
            "session created"
        );

        Ok(Self {
            id,
            code: definition.name.clone(),
            marshaller: Marshaller::new(Arc::clone(table), transport),
            lifecycle,
            parameters,
            sets,
            grids,
            hooks: definition.hooks.clone(),
        })
    }

    /// Connect to the worker named in `config` over NATS.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::WorkerUnresponsive`] if the connection fails,
    /// or any error of [`Session::new`].
    pub fn connect(definition: &CodeDefinition, config: &SessionConfig) -> Result<Self, SessionError> {
        let transport = config.connect().map_err(SessionError::WorkerUnresponsive)?;
        Self::new(definition, Box::new(transport))
    }

    /// Unique id of this session, for logs.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Name of the code this session drives.
    #[must_use]
    pub fn code_name(&self) -> &str {
        &self.code
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Returns `true` once the session has stopped.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.lifecycle.is_stopped()
    }

    /// Declared remote functions.
    #[must_use]
    pub fn functions(&self) -> &Arc<FunctionTable> {
        self.marshaller.table()
    }

    /// The parameter registry.
    #[must_use]
    pub fn parameters(&self) -> &ParameterRegistry {
        &self.parameters
    }

    /// An entity set by name.
    #[must_use]
    pub fn entity_set(&self, name: &str) -> Option<&EntitySet> {
        self.sets.get(name)
    }

    /// A grid by name.
    #[must_use]
    pub fn grid(&self, name: &str) -> Option<&GridSet> {
        self.grids.get(name)
    }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    /// UNINITIALIZED → EDIT, running the initialize hooks.
    ///
    /// # Errors
    ///
    /// [`SessionError::IllegalStateTransition`] from any other state, or any
    /// hook failure (the state is then unchanged).
    pub fn initialize(&mut self) -> Result<(), SessionError> {
        self.lifecycle.check_transition(Transition::Initialize)?;
        let hooks = self.hooks.initialize.clone();
        let result = self.run_hooks(&hooks);
        self.settle(result)?;
        self.lifecycle.apply(Transition::Initialize)?;
        Ok(())
    }

    /// EDIT → RUN: send unset defaults, then cached parameters, then run the
    /// commit hooks.
    ///
    /// # Errors
    ///
    /// [`SessionError::IllegalStateTransition`] outside EDIT, or any remote
    /// failure (the state is then unchanged).
    pub fn commit(&mut self) -> Result<(), SessionError> {
        self.lifecycle.check_transition(Transition::Commit)?;
        let hooks = self.hooks.commit.clone();
        let result = self
            .parameters
            .commit(&mut self.marshaller)
            .and_then(|()| self.run_hooks(&hooks));
        self.settle(result)?;
        self.lifecycle.apply(Transition::Commit)?;
        Ok(())
    }

    /// RUN → UPDATE.
    ///
    /// # Errors
    ///
    /// [`SessionError::IllegalStateTransition`] outside RUN.
    pub fn edit(&mut self) -> Result<(), SessionError> {
        self.lifecycle.apply(Transition::Edit)?;
        Ok(())
    }

    /// UPDATE → RUN, running the recommit hooks.
    ///
    /// # Errors
    ///
    /// [`SessionError::IllegalStateTransition`] outside UPDATE, or any hook
    /// failure.
    pub fn recommit(&mut self) -> Result<(), SessionError> {
        self.lifecycle.check_transition(Transition::Recommit)?;
        let hooks = self.hooks.recommit.clone();
        let result = self.run_hooks(&hooks);
        self.settle(result)?;
        self.lifecycle.apply(Transition::Recommit)?;
        Ok(())
    }

    /// Evolve the model to `end_time`. Legal only in RUN.
    ///
    /// # Errors
    ///
    /// [`SessionError::IllegalStateTransition`] outside the evolve window,
    /// [`SessionError::UnknownFunction`] if the code has no evolve hook, or
    /// any remote failure.
    pub fn evolve(&mut self, end_time: impl Into<Value>) -> Result<(), SessionError> {
        self.lifecycle.check_operation("evolve")?;
        let function = self
            .hooks
            .evolve
            .clone()
            .ok_or_else(|| SessionError::UnknownFunction("evolve".to_string()))?;
        self.lifecycle.check_operation(&function)?;
        let result = self.marshaller.call(&function, &[end_time.into()]);
        self.settle(result)?;
        debug!(session = %self.id, "model evolved");
        Ok(())
    }

    /// Run the cleanup hooks, release the worker and enter STOPPED.
    ///
    /// The session stops even if a hook fails; the hook error is returned.
    ///
    /// # Errors
    ///
    /// [`SessionError::IllegalStateTransition`] if already stopped, or the
    /// first hook failure.
    pub fn cleanup(&mut self) -> Result<(), SessionError> {
        self.lifecycle.check_transition(Transition::Cleanup)?;
        let hooks = self.hooks.cleanup.clone();
        let result = self.run_hooks(&hooks);
        if let Err(e) = self.marshaller.stop() {
            warn!(session = %self.id, error = %e, "worker did not acknowledge stop");
        }
        if !self.lifecycle.is_stopped() {
            self.lifecycle.apply(Transition::Cleanup)?;
        }
        info!(session = %self.id, "session cleaned up");
        result
    }

    /// Tear the session down without running hooks.
    pub fn stop(&mut self) {
        if self.lifecycle.is_stopped() {
            return;
        }
        if let Err(e) = self.marshaller.stop() {
            warn!(session = %self.id, error = %e, "worker did not acknowledge stop");
        }
        self.lifecycle.force_stop();
    }

    // ── Direct calls ────────────────────────────────────────────────────────

    /// Call a declared function, subject to its state window.
    ///
    /// Parameter setters, entity constructors and destructors, and set or
    /// grid setters carry the same windows as the operations that use them.
    ///
    /// # Errors
    ///
    /// [`SessionError::IllegalStateTransition`] outside the window, or any
    /// marshaller error.
    pub fn call(&mut self, function: &str, args: &[Value]) -> Result<CallOutput, SessionError> {
        self.lifecycle.check_operation(function)?;
        let result = self.marshaller.call(function, args);
        self.settle(result)
    }

    /// Like [`Session::call`], with nonzero error codes returned instead of
    /// raised.
    ///
    /// # Errors
    ///
    /// Same as [`Session::call`], except [`SessionError::RemoteError`].
    pub fn call_unchecked(
        &mut self,
        function: &str,
        args: &[Value],
    ) -> Result<CallOutput, SessionError> {
        self.lifecycle.check_operation(function)?;
        let result = self.marshaller.call_unchecked(function, args);
        self.settle(result)
    }

    // ── Parameters ──────────────────────────────────────────────────────────

    /// Read a parameter.
    ///
    /// # Errors
    ///
    /// See [`ParameterRegistry::get`].
    pub fn get_parameter(&mut self, name: &str) -> Result<Value, SessionError> {
        let state = self.lifecycle.state();
        let result = self.parameters.get(&mut self.marshaller, state, name);
        self.settle(result)
    }

    /// Set a parameter.
    ///
    /// # Errors
    ///
    /// See [`ParameterRegistry::set`].
    pub fn set_parameter(&mut self, name: &str, value: impl Into<Value>) -> Result<(), SessionError> {
        let state = self.lifecycle.state();
        let result = self
            .parameters
            .set(&mut self.marshaller, state, name, value.into());
        if result.is_ok() {
            info!(session = %self.id, parameter = name, state = %state, "parameter set");
        }
        self.settle(result)
    }

    /// Every parameter's declared default.
    #[must_use]
    pub fn parameter_defaults(&self) -> BTreeMap<String, Value> {
        self.parameters.defaults()
    }

    /// The parameter registry as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns the serialisation error, if any.
    pub fn parameters_json(&self) -> Result<String, serde_json::Error> {
        self.parameters.to_json()
    }

    // ── Entity sets ─────────────────────────────────────────────────────────

    /// Create entities in `set` through its default constructor.
    ///
    /// # Errors
    ///
    /// See [`EntitySet::create_with`].
    pub fn create(&mut self, set: &str, args: &[Value]) -> Result<Vec<EntityHandle>, SessionError> {
        let state = self.lifecycle.state();
        let entities = self.sets.get_mut(set).ok_or_else(|| unknown_set(set))?;
        let result = entities.create(&mut self.marshaller, state, args);
        self.settle(result)
    }

    /// Create entities in `set` through the named constructor.
    ///
    /// # Errors
    ///
    /// See [`EntitySet::create_with`].
    pub fn create_with(
        &mut self,
        set: &str,
        constructor: &str,
        args: &[Value],
    ) -> Result<Vec<EntityHandle>, SessionError> {
        let state = self.lifecycle.state();
        let entities = self.sets.get_mut(set).ok_or_else(|| unknown_set(set))?;
        let result = entities.create_with(&mut self.marshaller, state, constructor, args);
        self.settle(result)
    }

    /// Delete `handles` from `set`.
    ///
    /// # Errors
    ///
    /// See [`EntitySet::delete`].
    pub fn delete(&mut self, set: &str, handles: &[EntityHandle]) -> Result<(), SessionError> {
        let state = self.lifecycle.state();
        let entities = self.sets.get_mut(set).ok_or_else(|| unknown_set(set))?;
        let result = entities.delete(&mut self.marshaller, state, handles);
        self.settle(result)
    }

    /// Read `names` for `handles` of `set`.
    ///
    /// # Errors
    ///
    /// [`SessionError::IllegalStateTransition`] before initialization or
    /// after stop; otherwise see [`EntitySet::get`].
    pub fn get(
        &mut self,
        set: &str,
        handles: &[EntityHandle],
        names: &[&str],
    ) -> Result<Vec<Value>, SessionError> {
        self.lifecycle.check_states(&format!("get {set}"), &READABLE)?;
        let entities = self.sets.get_mut(set).ok_or_else(|| unknown_set(set))?;
        let result = entities.get(&mut self.marshaller, handles, names);
        self.settle(result)
    }

    /// Read one attribute of one entity.
    ///
    /// # Errors
    ///
    /// Same as [`Session::get`].
    pub fn get_one(
        &mut self,
        set: &str,
        handle: EntityHandle,
        name: &str,
    ) -> Result<Value, SessionError> {
        self.lifecycle.check_states(&format!("get {set}"), &READABLE)?;
        let entities = self.sets.get_mut(set).ok_or_else(|| unknown_set(set))?;
        let result = entities.get_one(&mut self.marshaller, handle, name);
        self.settle(result)
    }

    /// Write `values` to `names` for `handles` of `set`.
    ///
    /// # Errors
    ///
    /// See [`EntitySet::set`].
    pub fn set(
        &mut self,
        set: &str,
        handles: &[EntityHandle],
        names: &[&str],
        values: &[Value],
    ) -> Result<(), SessionError> {
        let state = self.lifecycle.state();
        let entities = self.sets.get_mut(set).ok_or_else(|| unknown_set(set))?;
        let result = entities.set(&mut self.marshaller, state, handles, names, values);
        self.settle(result)
    }

    /// The cached value of `name` for `handle`, without a remote call.
    #[must_use]
    pub fn cached(&self, set: &str, handle: EntityHandle, name: &str) -> Option<&Value> {
        self.sets.get(set)?.cached(handle, name)
    }

    /// Live handles of `set`.
    ///
    /// # Errors
    ///
    /// [`SessionError::UnknownSet`].
    pub fn handles(&self, set: &str) -> Result<Vec<EntityHandle>, SessionError> {
        Ok(self.sets.get(set).ok_or_else(|| unknown_set(set))?.handles())
    }

    // ── Grids ───────────────────────────────────────────────────────────────

    /// The inclusive index range of `grid`.
    ///
    /// # Errors
    ///
    /// See [`GridSet::range`].
    pub fn grid_range(&mut self, grid: &str) -> Result<IndexRange, SessionError> {
        self.lifecycle.check_states(&format!("range {grid}"), &READABLE)?;
        let cells = self.grids.get_mut(grid).ok_or_else(|| unknown_set(grid))?;
        let result = cells.range(&mut self.marshaller);
        self.settle(result)
    }

    /// Supply the mesh range of `grid`; its margin is applied on top.
    ///
    /// # Errors
    ///
    /// [`SessionError::IllegalStateTransition`] after stop, or
    /// [`SessionError::UnknownSet`].
    pub fn set_grid_range(&mut self, grid: &str, mesh: IndexRange) -> Result<IndexRange, SessionError> {
        self.lifecycle
            .check_states(&format!("range {grid}"), &LifecycleState::LIVE)?;
        let cells = self.grids.get_mut(grid).ok_or_else(|| unknown_set(grid))?;
        Ok(cells.set_range(mesh))
    }

    /// Number of cells along each axis of `grid`.
    ///
    /// # Errors
    ///
    /// Same as [`Session::grid_range`].
    pub fn grid_shape(&mut self, grid: &str) -> Result<IVec3, SessionError> {
        Ok(self.grid_range(grid)?.shape())
    }

    /// Every index of `grid`.
    ///
    /// # Errors
    ///
    /// Same as [`Session::grid_range`].
    pub fn grid_indices(&mut self, grid: &str) -> Result<Vec<IVec3>, SessionError> {
        Ok(self.grid_range(grid)?.indices())
    }

    /// Read `names` at `indices` of `grid`.
    ///
    /// # Errors
    ///
    /// See [`GridSet::get`].
    pub fn grid_get(
        &mut self,
        grid: &str,
        indices: &[IVec3],
        names: &[&str],
    ) -> Result<Vec<Value>, SessionError> {
        self.lifecycle.check_states(&format!("get {grid}"), &READABLE)?;
        let cells = self.grids.get_mut(grid).ok_or_else(|| unknown_set(grid))?;
        let result = cells.get(&mut self.marshaller, indices, names);
        self.settle(result)
    }

    /// Read one attribute of one cell of `grid`.
    ///
    /// # Errors
    ///
    /// See [`GridSet::get_one`].
    pub fn grid_get_one(
        &mut self,
        grid: &str,
        index: IVec3,
        name: &str,
    ) -> Result<Value, SessionError> {
        self.lifecycle.check_states(&format!("get {grid}"), &READABLE)?;
        let cells = self.grids.get_mut(grid).ok_or_else(|| unknown_set(grid))?;
        let result = cells.get_one(&mut self.marshaller, index, name);
        self.settle(result)
    }

    /// Write `values` to `names` at `indices` of `grid`.
    ///
    /// # Errors
    ///
    /// See [`GridSet::set`].
    pub fn grid_set(
        &mut self,
        grid: &str,
        indices: &[IVec3],
        names: &[&str],
        values: &[Value],
    ) -> Result<(), SessionError> {
        let state = self.lifecycle.state();
        let cells = self.grids.get_mut(grid).ok_or_else(|| unknown_set(grid))?;
        let result = cells.set(&mut self.marshaller, state, indices, names, values);
        self.settle(result)
    }

    /// Cell positions at `indices` of `grid`.
    ///
    /// # Errors
    ///
    /// See [`GridSet::positions`].
    pub fn grid_positions(
        &mut self,
        grid: &str,
        indices: &[IVec3],
    ) -> Result<Vec<Value>, SessionError> {
        self.lifecycle.check_states(&format!("get {grid}"), &READABLE)?;
        let cells = self.grids.get_mut(grid).ok_or_else(|| unknown_set(grid))?;
        let result = cells.positions(&mut self.marshaller, indices);
        self.settle(result)
    }

    // ── Internals ───────────────────────────────────────────────────────────

    fn run_hooks(&mut self, hooks: &[String]) -> Result<(), SessionError> {
        for hook in hooks {
            if self.marshaller.table().contains(hook) {
                debug!(session = %self.id, hook = %hook, "running hook");
                self.marshaller.call(hook, &[])?;
            }
        }
        Ok(())
    }

    /// A transport failure ends the session.
    fn settle<T>(&mut self, result: Result<T, SessionError>) -> Result<T, SessionError> {
        if let Err(e) = &result
            && e.is_fatal()
        {
            warn!(session = %self.id, error = %e, "worker lost, stopping session");
            self.lifecycle.force_stop();
        }
        result
    }
}

fn unknown_set(name: &str) -> SessionError {
    SessionError::UnknownSet(name.to_string())
}
