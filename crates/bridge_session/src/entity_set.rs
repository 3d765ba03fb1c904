//! Entity sets: collections of worker-held entities addressed by handle.
//!
//! A set is declared once ([`EntitySetDefinition`]) and resolved against
//! the function table into an [`EntitySet`]. The set tracks which handles
//! are live so that stale handles are rejected before anything is sent,
//! and caches the last known attribute values per handle.

use std::collections::{BTreeMap, HashMap};

use bridge_spec::{EntityHandle, FunctionTable, ScalarType, SpecError, Value};
use tracing::debug;

use crate::accessor::{AccessorDefinition, Accessors};
use crate::error::SessionError;
use crate::lifecycle::{LifecycleState, call_window};
use crate::marshaller::Marshaller;

/// Declaration of an entity set.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySetDefinition {
    name: String,
    handle_parameter: String,
    constructors: Vec<String>,
    destructor: Option<String>,
    getters: Vec<AccessorDefinition>,
    setters: Vec<AccessorDefinition>,
    create_states: Vec<LifecycleState>,
    set_states: Vec<LifecycleState>,
}

impl EntitySetDefinition {
    /// Start a set called `name` whose entities travel as
    /// `handle_parameter` (e.g. `index_of_the_star`).
    #[must_use]
    pub fn new(name: impl Into<String>, handle_parameter: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handle_parameter: handle_parameter.into(),
            constructors: Vec::new(),
            destructor: None,
            getters: Vec::new(),
            setters: Vec::new(),
            create_states: vec![LifecycleState::Edit],
            set_states: vec![LifecycleState::Edit, LifecycleState::Update],
        }
    }

    /// Add a constructor. The first one added is the default.
    #[must_use]
    pub fn constructor(mut self, function: impl Into<String>) -> Self {
        self.constructors.push(function.into());
        self
    }

    /// Set the destructor.
    #[must_use]
    pub fn destructor(mut self, function: impl Into<String>) -> Self {
        self.destructor = Some(function.into());
        self
    }

    /// Add a getter returning `names`.
    #[must_use]
    pub fn getter<S: Into<String>>(
        mut self,
        function: impl Into<String>,
        names: impl IntoIterator<Item = S>,
    ) -> Self {
        self.getters.push(AccessorDefinition::new(function, names));
        self
    }

    /// Add a setter writing `names`.
    #[must_use]
    pub fn setter<S: Into<String>>(
        mut self,
        function: impl Into<String>,
        names: impl IntoIterator<Item = S>,
    ) -> Self {
        self.setters.push(AccessorDefinition::new(function, names));
        self
    }

    /// Add a setter that stays legal while the model is running.
    #[must_use]
    pub fn runtime_setter<S: Into<String>>(
        mut self,
        function: impl Into<String>,
        names: impl IntoIterator<Item = S>,
    ) -> Self {
        self.setters
            .push(AccessorDefinition::new(function, names).runtime_mutable());
        self
    }

    /// Allow creation (and deletion) in UPDATE as well as EDIT.
    #[must_use]
    pub fn creatable_in_update(mut self) -> Self {
        if !self.create_states.contains(&LifecycleState::Update) {
            self.create_states.push(LifecycleState::Update);
        }
        self
    }

    /// The set name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A live entity set.
#[derive(Debug, Clone)]
pub struct EntitySet {
    name: String,
    handle_parameter: String,
    constructors: Vec<String>,
    destructor: Option<String>,
    accessors: Accessors,
    create_states: Vec<LifecycleState>,
    set_states: Vec<LifecycleState>,
    entities: BTreeMap<EntityHandle, HashMap<String, Value>>,
}

impl EntitySet {
    /// Resolve `definition` against `table`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownFunction`] if a referenced function is
    /// not declared, or [`SessionError::Spec`] if a constructor does not
    /// return the handle parameter or an accessor has the wrong shape.
    pub fn new(definition: &EntitySetDefinition, table: &FunctionTable) -> Result<Self, SessionError> {
        for constructor in &definition.constructors {
            let spec = table.require(constructor)?;
            let returns_handle = spec
                .outputs()
                .any(|p| p.name == definition.handle_parameter && p.ty == ScalarType::Int32);
            if !returns_handle {
                return Err(SessionError::Spec(SpecError::InvalidBinding {
                    function: constructor.clone(),
                    reason: format!("does not return '{}'", definition.handle_parameter),
                }));
            }
        }
        if let Some(destructor) = &definition.destructor
            && table.require(destructor)?.input_count() != 1
        {
            return Err(SessionError::Spec(SpecError::InvalidBinding {
                function: destructor.clone(),
                reason: "a destructor takes only the handle".to_string(),
            }));
        }

        Ok(Self {
            name: definition.name.clone(),
            handle_parameter: definition.handle_parameter.clone(),
            constructors: definition.constructors.clone(),
            destructor: definition.destructor.clone(),
            accessors: Accessors::resolve(
                &definition.name,
                1,
                &definition.getters,
                &definition.setters,
                table,
            )?,
            create_states: definition.create_states.clone(),
            set_states: definition.set_states.clone(),
            entities: BTreeMap::new(),
        })
    }

    /// The states in which the set's constructors, destructor and setters
    /// may be called directly.
    pub(crate) fn call_windows(&self) -> Vec<(String, Vec<LifecycleState>)> {
        let create = call_window(&self.create_states, false);
        let mut windows: Vec<_> = self
            .constructors
            .iter()
            .chain(&self.destructor)
            .map(|f| (f.clone(), create.clone()))
            .collect();
        windows.extend(self.accessors.setter_windows(&self.set_states));
        windows
    }

    /// The set name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if the set holds no live entity.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Live handles, ascending.
    #[must_use]
    pub fn handles(&self) -> Vec<EntityHandle> {
        self.entities.keys().copied().collect()
    }

    /// Returns `true` if `handle` is live.
    #[must_use]
    pub fn contains(&self, handle: EntityHandle) -> bool {
        self.entities.contains_key(&handle)
    }

    /// Readable attribute names, sorted.
    #[must_use]
    pub fn attributes(&self) -> Vec<&str> {
        self.accessors.readable()
    }

    /// The last value seen for `attribute` of `handle`, without a remote
    /// call.
    #[must_use]
    pub fn cached(&self, handle: EntityHandle, attribute: &str) -> Option<&Value> {
        self.entities.get(&handle)?.get(attribute)
    }

    /// Create entities through the default constructor.
    ///
    /// `args` are the constructor's inputs in declaration order; scalars
    /// create one entity, sequences one per row.
    ///
    /// # Errors
    ///
    /// See [`EntitySet::create_with`].
    pub fn create(
        &mut self,
        marshaller: &mut Marshaller,
        state: LifecycleState,
        args: &[Value],
    ) -> Result<Vec<EntityHandle>, SessionError> {
        let constructor = self
            .constructors
            .first()
            .cloned()
            .ok_or_else(|| SessionError::UnknownFunction(format!("new ({})", self.name)))?;
        self.create_with(marshaller, state, &constructor, args)
    }

    /// Create entities through the named constructor. Handles are returned
    /// in input order.
    ///
    /// # Errors
    ///
    /// - [`SessionError::IllegalStateTransition`] outside the creation
    ///   window (EDIT, plus UPDATE if the set opts in).
    /// - [`SessionError::UnknownFunction`] if `constructor` is not one of
    ///   the set's constructors.
    /// - Any marshaller error.
    pub fn create_with(
        &mut self,
        marshaller: &mut Marshaller,
        state: LifecycleState,
        constructor: &str,
        args: &[Value],
    ) -> Result<Vec<EntityHandle>, SessionError> {
        self.check_create(state, "create")?;
        if !self.constructors.iter().any(|c| c == constructor) {
            return Err(SessionError::UnknownFunction(constructor.to_string()));
        }

        let output = marshaller.call(constructor, args)?;
        let handles = match output.get(&self.handle_parameter) {
            Some(Value::Scalar(s)) => s.as_i32().map(|id| vec![EntityHandle(id)]),
            Some(Value::Sequence(column)) => column.to_handles(),
            _ => None,
        }
        .ok_or_else(|| {
            SessionError::Protocol(format!(
                "'{constructor}' returned no '{}' handles",
                self.handle_parameter
            ))
        })?;

        let spec = marshaller.table().require(constructor)?;
        let inputs: Vec<String> = spec.inputs().map(|p| p.name.clone()).collect();
        for (row, &handle) in handles.iter().enumerate() {
            let mut attributes = HashMap::new();
            for (name, arg) in inputs.iter().zip(args) {
                if self.accessors.has_getter(name)
                    && let Some(value) = arg.row(row)
                {
                    attributes.insert(name.clone(), value);
                }
            }
            self.entities.insert(handle, attributes);
        }
        debug!(set = %self.name, constructor, created = handles.len(), "entities created");
        Ok(handles)
    }

    /// Delete `handles`.
    ///
    /// Every handle is validated before the destructor is called. Rows the
    /// worker reports as failed stay live.
    ///
    /// # Errors
    ///
    /// - [`SessionError::InvalidHandle`] for an unknown, already deleted or
    ///   repeated handle.
    /// - [`SessionError::IllegalStateTransition`] outside the creation
    ///   window.
    /// - [`SessionError::RemoteError`] for the first row the worker failed.
    pub fn delete(
        &mut self,
        marshaller: &mut Marshaller,
        state: LifecycleState,
        handles: &[EntityHandle],
    ) -> Result<(), SessionError> {
        self.check_handles(handles)?;
        for (i, handle) in handles.iter().enumerate() {
            if handles[..i].contains(handle) {
                return Err(self.invalid(*handle));
            }
        }
        self.check_create(state, "delete")?;
        let destructor = self
            .destructor
            .clone()
            .ok_or_else(|| SessionError::UnknownFunction(format!("delete ({})", self.name)))?;

        let output = marshaller.call_unchecked(&destructor, &[Value::handles(handles)])?;
        let codes = output.error_codes();
        for (row, handle) in handles.iter().enumerate() {
            if codes.get(row).copied().unwrap_or(0) == 0 {
                self.entities.remove(handle);
            }
        }
        if let Some((row, code)) = output.first_error() {
            return Err(SessionError::RemoteError {
                function: destructor,
                code,
                row,
            });
        }
        debug!(set = %self.name, deleted = handles.len(), "entities deleted");
        Ok(())
    }

    /// Read `names` for `handles`. Each returned value is a sequence in
    /// handle order, one per name.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidHandle`] or [`SessionError::UnknownAttribute`]
    /// before any call; then any marshaller error.
    pub fn get(
        &mut self,
        marshaller: &mut Marshaller,
        handles: &[EntityHandle],
        names: &[&str],
    ) -> Result<Vec<Value>, SessionError> {
        self.check_handles(handles)?;
        let values = self
            .accessors
            .get(marshaller, &[Value::handles(handles)], names)?;
        for (name, value) in names.iter().zip(&values) {
            self.remember(handles, name, value);
        }
        Ok(values)
    }

    /// Read one attribute of one entity as a scalar.
    ///
    /// # Errors
    ///
    /// Same as [`EntitySet::get`].
    pub fn get_one(
        &mut self,
        marshaller: &mut Marshaller,
        handle: EntityHandle,
        name: &str,
    ) -> Result<Value, SessionError> {
        self.check_handles(&[handle])?;
        let mut values = self
            .accessors
            .get(marshaller, &[Value::from(handle.id())], &[name])?;
        let value = values.pop().ok_or_else(|| {
            SessionError::Protocol(format!("no value for '{name}' of {handle}"))
        })?;
        if let Some(attributes) = self.entities.get_mut(&handle) {
            attributes.insert(name.to_string(), value.clone());
        }
        Ok(value)
    }

    /// Write `values` (one sequence per name, in handle order) to `names`.
    ///
    /// # Errors
    ///
    /// - [`SessionError::InvalidHandle`] before any call.
    /// - [`SessionError::ParameterLocked`] in RUN unless the setter is
    ///   runtime-mutable; [`SessionError::IllegalStateTransition`] in other
    ///   states outside the window.
    /// - [`SessionError::ArityMismatch`] if a setter would not receive all
    ///   of its attributes, or lengths disagree.
    pub fn set(
        &mut self,
        marshaller: &mut Marshaller,
        state: LifecycleState,
        handles: &[EntityHandle],
        names: &[&str],
        values: &[Value],
    ) -> Result<(), SessionError> {
        self.check_handles(handles)?;
        self.accessors.set(
            marshaller,
            &[Value::handles(handles)],
            names,
            values,
            state,
            &self.set_states,
        )?;
        for (name, value) in names.iter().zip(values) {
            self.remember(handles, name, value);
        }
        Ok(())
    }

    fn remember(&mut self, handles: &[EntityHandle], name: &str, value: &Value) {
        for (row, handle) in handles.iter().enumerate() {
            if let (Some(attributes), Some(v)) = (self.entities.get_mut(handle), value.row(row)) {
                attributes.insert(name.to_string(), v);
            }
        }
    }

    fn check_handles(&self, handles: &[EntityHandle]) -> Result<(), SessionError> {
        match handles.iter().find(|h| !self.entities.contains_key(*h)) {
            Some(&handle) => Err(self.invalid(handle)),
            None => Ok(()),
        }
    }

    fn check_create(&self, state: LifecycleState, operation: &str) -> Result<(), SessionError> {
        if self.create_states.contains(&state) {
            Ok(())
        } else {
            Err(SessionError::IllegalStateTransition {
                operation: format!("{operation} {}", self.name),
                state,
            })
        }
    }

    fn invalid(&self, handle: EntityHandle) -> SessionError {
        SessionError::InvalidHandle {
            set: self.name.clone(),
            handle,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bridge_spec::{RemoteFunctionSpec, Scalar};
    use bridge_worker::{LoopbackTransport, MemoryKernel};

    use super::*;

    const HANDLE: &str = "index_of_the_star";

    fn table() -> Arc<FunctionTable> {
        let status = |name: &str| RemoteFunctionSpec::builder(name).returns_error_code();
        let accessor = |name: &str| status(name).input(HANDLE, ScalarType::Int32).can_handle_array();
        let mut table = FunctionTable::new();
        table
            .register_all(
                [
                    status("new_zams_star")
                        .output(HANDLE, ScalarType::Int32)
                        .input("mass", ScalarType::Float64)
                        .can_handle_array(),
                    status("new_prems_star")
                        .output(HANDLE, ScalarType::Int32)
                        .input("mass", ScalarType::Float64)
                        .can_handle_array(),
                    status("bad_constructor").input("mass", ScalarType::Float64),
                    accessor("delete_star"),
                    accessor("get_mass").output("mass", ScalarType::Float64),
                    accessor("get_position")
                        .output("x", ScalarType::Float64)
                        .output("y", ScalarType::Float64),
                    accessor("set_position")
                        .input("x", ScalarType::Float64)
                        .input("y", ScalarType::Float64),
                    accessor("set_wind")
                        .input("wind", ScalarType::Float64),
                ]
                .into_iter()
                .map(|b| b.build().unwrap()),
            )
            .unwrap();
        Arc::new(table)
    }

    fn definition() -> EntitySetDefinition {
        EntitySetDefinition::new("stars", HANDLE)
            .constructor("new_zams_star")
            .constructor("new_prems_star")
            .destructor("delete_star")
            .getter("get_mass", ["mass"])
            .getter("get_position", ["x", "y"])
            .setter("set_position", ["x", "y"])
            .runtime_setter("set_wind", ["wind"])
    }

    fn setup(definition: &EntitySetDefinition) -> (EntitySet, Marshaller, MemoryKernel) {
        let table = table();
        let kernel = MemoryKernel::new()
            .entity_constructor("new_zams_star", "stars")
            .entity_constructor("new_prems_star", "stars")
            .entity_destructor("delete_star", "stars")
            .entity_getter("get_mass", "stars")
            .entity_getter("get_position", "stars")
            .entity_setter("set_position", "stars")
            .entity_setter("set_wind", "stars");
        let transport = LoopbackTransport::new(Arc::clone(&table), kernel.clone());
        let set = EntitySet::new(definition, &table).unwrap();
        (set, Marshaller::new(table, Box::new(transport)), kernel)
    }

    #[test]
    fn test_alternate_constructor() {
        let (mut stars, mut m, kernel) = setup(&definition());
        let zams = stars
            .create(&mut m, LifecycleState::Edit, &[Value::from(1.0)])
            .unwrap();
        let prems = stars
            .create_with(&mut m, LifecycleState::Edit, "new_prems_star", &[Value::from(0.5)])
            .unwrap();
        assert_eq!(zams, vec![EntityHandle(1)]);
        assert_eq!(prems, vec![EntityHandle(2)]);
        assert_eq!(stars.len(), 2);
        assert_eq!(kernel.call_log(), vec!["new_zams_star", "new_prems_star"]);

        let err = stars
            .create_with(&mut m, LifecycleState::Edit, "get_mass", &[Value::from(1)])
            .unwrap_err();
        assert!(matches!(err, SessionError::UnknownFunction(_)));
    }

    #[test]
    fn test_create_window() {
        let (mut stars, mut m, _) = setup(&definition());
        assert!(matches!(
            stars.create(&mut m, LifecycleState::Update, &[Value::from(1.0)]),
            Err(SessionError::IllegalStateTransition { state: LifecycleState::Update, .. })
        ));

        let (mut stars, mut m, _) = setup(&definition().creatable_in_update());
        assert!(stars
            .create(&mut m, LifecycleState::Update, &[Value::from(1.0)])
            .is_ok());
        assert!(stars
            .create(&mut m, LifecycleState::Run, &[Value::from(1.0)])
            .is_err());
    }

    #[test]
    fn test_setter_needs_every_attribute() {
        let (mut stars, mut m, kernel) = setup(&definition());
        let handles = stars
            .create(&mut m, LifecycleState::Edit, &[Value::from(1.0)])
            .unwrap();
        let err = stars
            .set(&mut m, LifecycleState::Edit, &handles, &["x"], &[Value::from(vec![1.0])])
            .unwrap_err();
        assert!(matches!(err, SessionError::ArityMismatch(_)));
        assert_eq!(kernel.calls_to("set_position"), 0);

        stars
            .set(
                &mut m,
                LifecycleState::Edit,
                &handles,
                &["y", "x"],
                &[Value::from(vec![2.0]), Value::from(vec![1.0])],
            )
            .unwrap();
        assert_eq!(kernel.attribute("stars", handles[0], "x"), Some(Scalar::Float64(1.0)));
        assert_eq!(kernel.attribute("stars", handles[0], "y"), Some(Scalar::Float64(2.0)));
        assert_eq!(
            stars.cached(handles[0], "y"),
            Some(&Value::Scalar(Scalar::Float64(2.0)))
        );
    }

    #[test]
    fn test_runtime_setter() {
        let (mut stars, mut m, _) = setup(&definition());
        let handles = stars
            .create(&mut m, LifecycleState::Edit, &[Value::from(1.0)])
            .unwrap();
        stars
            .set(&mut m, LifecycleState::Run, &handles, &["wind"], &[Value::from(vec![0.5])])
            .unwrap();
        let err = stars
            .set(
                &mut m,
                LifecycleState::Run,
                &handles,
                &["x", "y"],
                &[Value::from(vec![0.0]), Value::from(vec![0.0])],
            )
            .unwrap_err();
        assert!(matches!(err, SessionError::ParameterLocked { .. }));
    }

    #[test]
    fn test_one_call_per_getter() {
        let (mut stars, mut m, kernel) = setup(&definition());
        let handles = stars
            .create(&mut m, LifecycleState::Edit, &[Value::from(vec![1.0, 2.0])])
            .unwrap();
        let values = stars.get(&mut m, &handles, &["x", "mass", "y"]).unwrap();
        assert_eq!(values.len(), 3);
        assert_eq!(kernel.calls_to("get_position"), 1);
        assert_eq!(kernel.calls_to("get_mass"), 1);

        let err = stars.get(&mut m, &handles, &["luminosity"]).unwrap_err();
        assert!(matches!(err, SessionError::UnknownAttribute { .. }));
    }

    #[test]
    fn test_delete_rejects_repeats_before_calling() {
        let (mut stars, mut m, kernel) = setup(&definition());
        let handles = stars
            .create(&mut m, LifecycleState::Edit, &[Value::from(vec![1.0, 2.0])])
            .unwrap();
        let err = stars
            .delete(&mut m, LifecycleState::Edit, &[handles[0], handles[0]])
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidHandle { .. }));
        assert_eq!(kernel.calls_to("delete_star"), 0);
        assert_eq!(stars.len(), 2);
    }

    #[test]
    fn test_worker_side_deletion_failure_keeps_handle() {
        let (mut stars, mut m, kernel) = setup(&definition());
        let handles = stars
            .create(&mut m, LifecycleState::Edit, &[Value::from(1.0)])
            .unwrap();
        kernel.inject_failure("delete_star", -1);
        let err = stars
            .delete(&mut m, LifecycleState::Edit, &handles)
            .unwrap_err();
        assert!(matches!(err, SessionError::RemoteError { code: -1, .. }));
        assert!(stars.contains(handles[0]));
    }

    #[test]
    fn test_constructor_must_return_handle() {
        let table = table();
        let definition = EntitySetDefinition::new("stars", HANDLE).constructor("bad_constructor");
        assert!(matches!(
            EntitySet::new(&definition, &table),
            Err(SessionError::Spec(SpecError::InvalidBinding { .. }))
        ));
    }
}
