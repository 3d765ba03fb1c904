//! Parameter registry.
//!
//! Named configuration values backed by getter/setter function pairs, with
//! declared defaults and mutation windows. Values set before the worker is
//! initialized are cached and sent at commit. Parameters the caller never
//! set are sent once, at the first commit, with their defaults.

use std::collections::{BTreeMap, HashMap};

use bridge_net::values::{self, Cardinality};
use bridge_spec::{FunctionTable, ParameterSpec, Scalar, SpecError, Value};
use bridge_units::Unit;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::SessionError;
use crate::lifecycle::{LifecycleState, call_window};
use crate::marshaller::Marshaller;

/// How a parameter's value is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParameterKind {
    /// The value is passed through as declared.
    Method,
    /// A bool at the surface, an int32 (0/1) on the wire.
    Boolean,
}

/// Declaration of one parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDescriptor {
    name: String,
    description: String,
    getter: Option<String>,
    setter: Option<String>,
    default: Value,
    kind: ParameterKind,
    window: Vec<LifecycleState>,
    runtime_mutable: bool,
}

impl ParameterDescriptor {
    fn build(
        name: impl Into<String>,
        getter: Option<String>,
        setter: Option<String>,
        default: Value,
        kind: ParameterKind,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            getter,
            setter,
            default,
            kind,
            window: vec![
                LifecycleState::Uninitialized,
                LifecycleState::Edit,
                LifecycleState::Update,
            ],
            runtime_mutable: false,
        }
    }

    /// A parameter read and written through a function pair.
    #[must_use]
    pub fn method(
        name: impl Into<String>,
        getter: impl Into<String>,
        setter: impl Into<String>,
        default: impl Into<Value>,
    ) -> Self {
        Self::build(
            name,
            Some(getter.into()),
            Some(setter.into()),
            default.into(),
            ParameterKind::Method,
        )
    }

    /// A boolean parameter over an int32 function pair.
    #[must_use]
    pub fn boolean(
        name: impl Into<String>,
        getter: impl Into<String>,
        setter: impl Into<String>,
        default: bool,
    ) -> Self {
        Self::build(
            name,
            Some(getter.into()),
            Some(setter.into()),
            Value::from(default),
            ParameterKind::Boolean,
        )
    }

    /// A parameter with a getter only.
    #[must_use]
    pub fn read_only(
        name: impl Into<String>,
        getter: impl Into<String>,
        default: impl Into<Value>,
    ) -> Self {
        Self::build(
            name,
            Some(getter.into()),
            None,
            default.into(),
            ParameterKind::Method,
        )
    }

    /// A parameter with a setter only. Reads return the last value set.
    #[must_use]
    pub fn write_only(
        name: impl Into<String>,
        setter: impl Into<String>,
        default: impl Into<Value>,
    ) -> Self {
        Self::build(
            name,
            None,
            Some(setter.into()),
            default.into(),
            ParameterKind::Method,
        )
    }

    /// Attach a description.
    #[must_use]
    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.description = text.into();
        self
    }

    /// Allow changes while the model is running.
    #[must_use]
    pub fn runtime_mutable(mut self) -> Self {
        self.runtime_mutable = true;
        self
    }

    /// Replace the states in which the parameter may be changed.
    #[must_use]
    pub fn mutable_in(mut self, states: impl IntoIterator<Item = LifecycleState>) -> Self {
        self.window = states.into_iter().collect();
        self
    }

    /// Parameter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Free-form description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The declared default.
    #[must_use]
    pub fn default_value(&self) -> &Value {
        &self.default
    }

    /// Returns `true` if the parameter has no setter.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.setter.is_none()
    }

    /// Returns `true` if the parameter may change in RUN.
    #[must_use]
    pub fn is_runtime_mutable(&self) -> bool {
        self.runtime_mutable
    }
}

/// One row of a registry dump.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSnapshot {
    /// Parameter name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Unit symbol, if any.
    pub unit: Option<String>,
    /// Surface kind.
    pub kind: ParameterKind,
    /// The declared default.
    pub default: Value,
    /// The last value read or written, if any.
    pub value: Option<Value>,
    /// Whether the caller set the parameter explicitly.
    pub explicitly_set: bool,
    /// Whether the parameter has no setter.
    pub read_only: bool,
    /// Whether the parameter may change in RUN.
    pub runtime_mutable: bool,
}

#[derive(Debug, Clone)]
struct Entry {
    descriptor: ParameterDescriptor,
    setter_param: Option<ParameterSpec>,
    unit: Option<Unit>,
    explicitly_set: bool,
    pending: Option<Value>,
    last_known: Option<Value>,
}

/// All parameters of one session.
#[derive(Debug, Clone)]
pub struct ParameterRegistry {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
    defaults_sent: bool,
}

impl ParameterRegistry {
    /// Resolve `descriptors` against `table`.
    ///
    /// # Errors
    ///
    /// - [`SessionError::UnknownFunction`] if a getter or setter is missing.
    /// - [`SessionError::Spec`] on duplicate names, or a getter/setter that
    ///   is not a single OUT/IN function.
    /// - A codec error if a default does not fit its setter.
    pub fn new(
        descriptors: impl IntoIterator<Item = ParameterDescriptor>,
        table: &FunctionTable,
    ) -> Result<Self, SessionError> {
        let mut entries = Vec::new();
        let mut index = HashMap::new();

        for descriptor in descriptors {
            if index.contains_key(descriptor.name()) {
                return Err(SessionError::Spec(SpecError::DuplicateParameter {
                    function: "parameters".to_string(),
                    parameter: descriptor.name().to_string(),
                }));
            }

            let mut unit = None;
            let mut setter_param = None;
            if let Some(getter) = &descriptor.getter {
                let spec = table.require(getter)?;
                let mut outputs = spec.outputs();
                match (spec.input_count(), outputs.next(), outputs.next()) {
                    (0, Some(param), None) => unit = param.unit.clone(),
                    _ => return Err(binding(getter, "a getter has one OUT parameter")),
                }
            }
            if let Some(setter) = &descriptor.setter {
                let spec = table.require(setter)?;
                let mut inputs = spec.inputs();
                match (spec.output_count(), inputs.next(), inputs.next()) {
                    (0, Some(param), None) => {
                        unit = param.unit.clone().or(unit);
                        values::encode(
                            &to_wire(&descriptor.default, descriptor.kind),
                            param,
                            Cardinality::Scalar,
                        )?;
                        setter_param = Some(param.clone());
                    }
                    _ => return Err(binding(setter, "a setter has one IN parameter")),
                }
            }

            index.insert(descriptor.name().to_string(), entries.len());
            entries.push(Entry {
                descriptor,
                setter_param,
                unit,
                explicitly_set: false,
                pending: None,
                last_known: None,
            });
        }

        Ok(Self {
            entries,
            index,
            defaults_sent: false,
        })
    }

    /// Parameter names, in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.descriptor.name()).collect()
    }

    /// The declaration of `name`.
    #[must_use]
    pub fn descriptor(&self, name: &str) -> Option<&ParameterDescriptor> {
        self.index.get(name).map(|&i| &self.entries[i].descriptor)
    }

    /// The unit of `name`, if it has one.
    #[must_use]
    pub fn unit(&self, name: &str) -> Option<&Unit> {
        self.index.get(name).and_then(|&i| self.entries[i].unit.as_ref())
    }

    /// Returns `true` if `name` was set explicitly.
    #[must_use]
    pub fn is_explicitly_set(&self, name: &str) -> bool {
        self.index
            .get(name)
            .is_some_and(|&i| self.entries[i].explicitly_set)
    }

    /// Number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no parameter is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every parameter's declared default.
    #[must_use]
    pub fn defaults(&self) -> BTreeMap<String, Value> {
        self.entries
            .iter()
            .map(|e| (e.descriptor.name.clone(), e.descriptor.default.clone()))
            .collect()
    }

    /// Read `name`.
    ///
    /// Before initialization, and for write-only parameters, the last value
    /// set (or the default) is returned without a remote call.
    ///
    /// # Errors
    ///
    /// [`SessionError::UnknownParameter`], an illegal state (STOPPED), or
    /// any marshaller error.
    pub fn get(
        &mut self,
        marshaller: &mut Marshaller,
        state: LifecycleState,
        name: &str,
    ) -> Result<Value, SessionError> {
        let entry = self.entry_mut(name)?;
        if state == LifecycleState::Stopped {
            return Err(SessionError::IllegalStateTransition {
                operation: format!("get {name}"),
                state,
            });
        }
        let getter = match &entry.descriptor.getter {
            Some(getter) if state != LifecycleState::Uninitialized => getter.clone(),
            _ => {
                return Ok(entry
                    .last_known
                    .clone()
                    .unwrap_or_else(|| entry.descriptor.default.clone()));
            }
        };

        let output = marshaller.call(&getter, &[])?;
        let raw = output
            .output(0)
            .cloned()
            .ok_or_else(|| SessionError::Protocol(format!("'{getter}' returned nothing")))?;
        let value = from_wire(raw, entry.descriptor.kind);
        entry.last_known = Some(value.clone());
        Ok(value)
    }

    /// Set `name`.
    ///
    /// # Errors
    ///
    /// - [`SessionError::UnknownParameter`] / [`SessionError::ReadOnlyParameter`].
    /// - [`SessionError::ParameterLocked`] outside the parameter's window
    ///   (RUN is allowed only for runtime-mutable parameters).
    /// - A codec error if the value has the wrong unit or type.
    /// - Any marshaller error.
    pub fn set(
        &mut self,
        marshaller: &mut Marshaller,
        state: LifecycleState,
        name: &str,
        value: Value,
    ) -> Result<(), SessionError> {
        let entry = self.entry_mut(name)?;
        let (Some(setter), Some(param)) = (&entry.descriptor.setter, &entry.setter_param) else {
            return Err(SessionError::ReadOnlyParameter(name.to_string()));
        };
        if state == LifecycleState::Stopped {
            return Err(SessionError::IllegalStateTransition {
                operation: format!("set {name}"),
                state,
            });
        }
        let allowed = entry.descriptor.window.contains(&state)
            || (state == LifecycleState::Run && entry.descriptor.runtime_mutable);
        if !allowed {
            return Err(SessionError::ParameterLocked {
                name: name.to_string(),
                state,
            });
        }

        let wire = to_wire(&value, entry.descriptor.kind);
        values::encode(&wire, param, Cardinality::Scalar)?;
        if state == LifecycleState::Uninitialized {
            debug!(parameter = name, "parameter cached until commit");
            entry.pending = Some(wire);
        } else {
            let setter = setter.clone();
            marshaller.call(&setter, &[wire])?;
            entry.pending = None;
        }
        entry.explicitly_set = true;
        entry.last_known = Some(value);
        Ok(())
    }

    /// Send the defaults of every parameter the caller never set. Runs at
    /// most once per session.
    ///
    /// # Errors
    ///
    /// Any marshaller error; the registry stays unsent so a retry resends.
    pub fn send_not_set(&mut self, marshaller: &mut Marshaller) -> Result<(), SessionError> {
        if self.defaults_sent {
            return Ok(());
        }
        let mut sent = 0;
        for entry in &self.entries {
            if entry.explicitly_set {
                continue;
            }
            if let Some(setter) = &entry.descriptor.setter {
                let wire = to_wire(&entry.descriptor.default, entry.descriptor.kind);
                marshaller.call(setter, &[wire])?;
                sent += 1;
            }
        }
        self.defaults_sent = true;
        info!(sent, "default parameters sent");
        Ok(())
    }

    /// Send values cached before initialization.
    ///
    /// # Errors
    ///
    /// Any marshaller error.
    pub fn send_cached(&mut self, marshaller: &mut Marshaller) -> Result<(), SessionError> {
        for entry in &mut self.entries {
            if let (Some(wire), Some(setter)) = (entry.pending.take(), &entry.descriptor.setter) {
                debug!(parameter = %entry.descriptor.name, "sending cached parameter");
                marshaller.call(setter, &[wire])?;
            }
        }
        Ok(())
    }

    /// Commit-time synchronisation: defaults first, then cached values.
    ///
    /// # Errors
    ///
    /// Any marshaller error.
    pub fn commit(&mut self, marshaller: &mut Marshaller) -> Result<(), SessionError> {
        self.send_not_set(marshaller)?;
        self.send_cached(marshaller)
    }

    /// A dump of every parameter.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ParameterSnapshot> {
        self.entries
            .iter()
            .map(|e| ParameterSnapshot {
                name: e.descriptor.name.clone(),
                description: e.descriptor.description.clone(),
                unit: e.unit.as_ref().map(|u| u.symbol().to_string()),
                kind: e.descriptor.kind,
                default: e.descriptor.default.clone(),
                value: e.last_known.clone(),
                explicitly_set: e.explicitly_set,
                read_only: e.descriptor.is_read_only(),
                runtime_mutable: e.descriptor.runtime_mutable,
            })
            .collect()
    }

    /// [`ParameterRegistry::snapshot`] as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns the serialisation error, if any.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.snapshot())
    }

    /// The states in which each parameter setter may be called directly.
    pub(crate) fn call_windows(&self) -> Vec<(String, Vec<LifecycleState>)> {
        self.entries
            .iter()
            .filter_map(|e| {
                let setter = e.descriptor.setter.clone()?;
                Some((
                    setter,
                    call_window(&e.descriptor.window, e.descriptor.runtime_mutable),
                ))
            })
            .collect()
    }

    fn entry_mut(&mut self, name: &str) -> Result<&mut Entry, SessionError> {
        match self.index.get(name) {
            Some(&i) => Ok(&mut self.entries[i]),
            None => Err(SessionError::UnknownParameter(name.to_string())),
        }
    }
}

fn to_wire(value: &Value, kind: ParameterKind) -> Value {
    match (kind, value) {
        (ParameterKind::Boolean, Value::Scalar(Scalar::Bool(b))) => Value::from(i32::from(*b)),
        _ => value.clone(),
    }
}

fn from_wire(value: Value, kind: ParameterKind) -> Value {
    match (kind, &value) {
        (ParameterKind::Boolean, Value::Scalar(s)) => {
            s.as_i32().map_or(value.clone(), |x| Value::from(x != 0))
        }
        _ => value,
    }
}

fn binding(function: &str, reason: &str) -> SessionError {
    SessionError::Spec(SpecError::InvalidBinding {
        function: function.to_string(),
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bridge_net::CodecError;
    use bridge_spec::{RemoteFunctionSpec, ScalarType};
    use bridge_units::{UnitValue, si};
    use bridge_worker::{LoopbackTransport, MemoryKernel};

    use super::*;

    fn table() -> Arc<FunctionTable> {
        let status = |name: &str| RemoteFunctionSpec::builder(name).returns_error_code();
        let mut table = FunctionTable::new();
        table
            .register_all(
                [
                    status("get_verbosity").output("verbosity", ScalarType::Int32),
                    status("set_verbosity").input("verbosity", ScalarType::Int32),
                    status("set_path").input("path", ScalarType::String),
                    status("get_number_of_particles").output("n", ScalarType::Int32),
                    status("get_maximum_radius").output_with_unit(
                        "radius",
                        ScalarType::Float64,
                        si::m(),
                    ),
                    status("set_maximum_radius").input_with_unit(
                        "radius",
                        ScalarType::Float64,
                        si::m(),
                    ),
                ]
                .into_iter()
                .map(|b| b.build().unwrap()),
            )
            .unwrap();
        Arc::new(table)
    }

    fn descriptors() -> Vec<ParameterDescriptor> {
        vec![
            ParameterDescriptor::boolean("verbosity", "get_verbosity", "set_verbosity", false),
            ParameterDescriptor::write_only("path_to_data", "set_path", "data/"),
            ParameterDescriptor::read_only("number_of_particles", "get_number_of_particles", 0),
            ParameterDescriptor::method(
                "maximum_radius",
                "get_maximum_radius",
                "set_maximum_radius",
                UnitValue::scalar(1.0, si::m()),
            )
            .runtime_mutable(),
        ]
    }

    fn setup() -> (ParameterRegistry, Marshaller, MemoryKernel) {
        let table = table();
        let kernel = MemoryKernel::new()
            .parameter_getter("get_verbosity", "verbosity")
            .parameter_setter("set_verbosity", "verbosity")
            .parameter_setter("set_path", "path")
            .parameter_getter("get_number_of_particles", "n")
            .parameter_getter("get_maximum_radius", "radius")
            .parameter_setter("set_maximum_radius", "radius");
        let transport = LoopbackTransport::new(Arc::clone(&table), kernel.clone());
        let registry = ParameterRegistry::new(descriptors(), &table).unwrap();
        (registry, Marshaller::new(table, Box::new(transport)), kernel)
    }

    #[test]
    fn test_boolean_travels_as_int() {
        let (mut registry, mut m, kernel) = setup();
        registry
            .set(&mut m, LifecycleState::Edit, "verbosity", Value::from(true))
            .unwrap();
        assert_eq!(kernel.parameter("verbosity"), Some(Scalar::Int32(1)));
        assert_eq!(
            registry.get(&mut m, LifecycleState::Edit, "verbosity").unwrap(),
            Value::from(true)
        );
    }

    #[test]
    fn test_write_only_reads_last_value() {
        let (mut registry, mut m, kernel) = setup();
        assert_eq!(
            registry.get(&mut m, LifecycleState::Edit, "path_to_data").unwrap(),
            Value::from("data/")
        );
        registry
            .set(&mut m, LifecycleState::Edit, "path_to_data", Value::from("/opt/evtwin"))
            .unwrap();
        assert_eq!(
            registry.get(&mut m, LifecycleState::Edit, "path_to_data").unwrap(),
            Value::from("/opt/evtwin")
        );
        assert_eq!(kernel.call_log(), vec!["set_path"]);
    }

    #[test]
    fn test_read_only_rejects_set() {
        let (mut registry, mut m, kernel) = setup();
        let err = registry
            .set(&mut m, LifecycleState::Edit, "number_of_particles", Value::from(3))
            .unwrap_err();
        assert!(matches!(err, SessionError::ReadOnlyParameter(_)));
        kernel.seed_parameter("n", Scalar::Int32(12));
        assert_eq!(
            registry
                .get(&mut m, LifecycleState::Edit, "number_of_particles")
                .unwrap(),
            Value::from(12)
        );
    }

    #[test]
    fn test_unit_conversion_on_set() {
        let (mut registry, mut m, kernel) = setup();
        registry
            .set(
                &mut m,
                LifecycleState::Edit,
                "maximum_radius",
                Value::from(UnitValue::scalar(250.0, si::cm())),
            )
            .unwrap();
        let stored = kernel.parameter("radius").and_then(|s| s.as_f64()).unwrap();
        assert!((stored - 2.5).abs() < 1e-12);

        let read = registry
            .get(&mut m, LifecycleState::Edit, "maximum_radius")
            .unwrap();
        assert_eq!(read.as_quantity().map(|q| q.unit().symbol()), Some("m"));
    }

    #[test]
    fn test_incompatible_unit_rejected() {
        let (mut registry, mut m, kernel) = setup();
        let err = registry
            .set(
                &mut m,
                LifecycleState::Edit,
                "maximum_radius",
                Value::from(UnitValue::scalar(1.0, si::kg())),
            )
            .unwrap_err();
        assert!(matches!(err, SessionError::Codec(CodecError::Unit { .. })));

        let err = registry
            .set(&mut m, LifecycleState::Edit, "maximum_radius", Value::from(1.0))
            .unwrap_err();
        assert!(matches!(err, SessionError::Codec(CodecError::MissingUnit { .. })));
        assert!(kernel.calls().is_empty());
        assert!(!registry.is_explicitly_set("maximum_radius"));
    }

    #[test]
    fn test_runtime_mutable_in_run() {
        let (mut registry, mut m, _) = setup();
        registry
            .set(
                &mut m,
                LifecycleState::Run,
                "maximum_radius",
                Value::from(UnitValue::scalar(2.0, si::m())),
            )
            .unwrap();
        let err = registry
            .set(&mut m, LifecycleState::Run, "verbosity", Value::from(true))
            .unwrap_err();
        assert!(matches!(err, SessionError::ParameterLocked { .. }));
    }

    #[test]
    fn test_defaults_sent_once() {
        let (mut registry, mut m, kernel) = setup();
        registry
            .set(&mut m, LifecycleState::Uninitialized, "verbosity", Value::from(true))
            .unwrap();
        assert!(kernel.calls().is_empty());

        registry.commit(&mut m).unwrap();
        registry.commit(&mut m).unwrap();
        assert_eq!(kernel.calls_to("set_path"), 1);
        assert_eq!(kernel.calls_to("set_maximum_radius"), 1);
        assert_eq!(kernel.calls_to("set_verbosity"), 1);
        assert_eq!(kernel.parameter("verbosity"), Some(Scalar::Int32(1)));
    }

    #[test]
    fn test_later_set_replaces_cached_value() {
        let (mut registry, mut m, kernel) = setup();
        registry
            .set(&mut m, LifecycleState::Uninitialized, "verbosity", Value::from(true))
            .unwrap();
        registry
            .set(&mut m, LifecycleState::Edit, "verbosity", Value::from(false))
            .unwrap();
        registry.commit(&mut m).unwrap();

        assert_eq!(kernel.parameter("verbosity"), Some(Scalar::Int32(0)));
        assert_eq!(kernel.calls_to("set_verbosity"), 1);
        assert_eq!(
            registry.get(&mut m, LifecycleState::Run, "verbosity").unwrap(),
            Value::from(false)
        );
    }

    #[test]
    fn test_stopped_rejects_access() {
        let (mut registry, mut m, _) = setup();
        assert!(matches!(
            registry.get(&mut m, LifecycleState::Stopped, "verbosity"),
            Err(SessionError::IllegalStateTransition { .. })
        ));
    }

    #[test]
    fn test_getter_shape_is_checked() {
        let table = table();
        let err = ParameterRegistry::new(
            [ParameterDescriptor::read_only("verbosity", "set_verbosity", 0)],
            &table,
        )
        .unwrap_err();
        assert!(matches!(err, SessionError::Spec(SpecError::InvalidBinding { .. })));
    }

    #[test]
    fn test_bad_default_is_rejected() {
        let table = table();
        let err = ParameterRegistry::new(
            [ParameterDescriptor::method(
                "verbosity",
                "get_verbosity",
                "set_verbosity",
                "loud",
            )],
            &table,
        )
        .unwrap_err();
        assert!(matches!(err, SessionError::Codec(CodecError::TypeMismatch { .. })));
    }

    #[test]
    fn test_snapshot_lists_every_parameter() {
        let (registry, _, _) = setup();
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 4);
        assert!(snapshot.iter().any(|s| s.name == "number_of_particles" && s.read_only));
        assert_eq!(registry.unit("maximum_radius").map(Unit::symbol), Some("m"));
    }
}
