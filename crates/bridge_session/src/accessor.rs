//! Attribute accessors shared by entity sets and grids.
//!
//! A getter takes the key columns (a handle, or `i, j, k`) and returns one
//! OUT parameter per attribute; a setter takes the key columns followed by
//! one IN parameter per attribute. Attribute names map to those value
//! parameters by position, so a worker's `rhovx` can surface as `rhox`.

use std::collections::HashMap;
use std::sync::Arc;

use bridge_spec::{FunctionTable, RemoteFunctionSpec, SpecError, Value};

use crate::error::SessionError;
use crate::lifecycle::{LifecycleState, call_window};
use crate::marshaller::{CallOutput, Marshaller};

/// A getter or setter binding.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessorDefinition {
    /// The remote function.
    pub function: String,
    /// Attribute names, in the order of the function's value parameters.
    pub names: Vec<String>,
    /// Setter only: also legal in RUN.
    pub runtime_mutable: bool,
}

impl AccessorDefinition {
    /// Bind `function` to `names`.
    #[must_use]
    pub fn new<S: Into<String>>(
        function: impl Into<String>,
        names: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            function: function.into(),
            names: names.into_iter().map(Into::into).collect(),
            runtime_mutable: false,
        }
    }

    /// Allow the setter while the model is running.
    #[must_use]
    pub fn runtime_mutable(mut self) -> Self {
        self.runtime_mutable = true;
        self
    }
}

#[derive(Debug, Clone)]
struct Bound {
    spec: Arc<RemoteFunctionSpec>,
    names: Vec<String>,
    runtime_mutable: bool,
}

/// Accessors resolved against a function table.
#[derive(Debug, Clone)]
pub(crate) struct Accessors {
    owner: String,
    getters: Vec<Bound>,
    setters: Vec<Bound>,
    getter_of: HashMap<String, (usize, usize)>,
    setter_of: HashMap<String, usize>,
}

impl Accessors {
    /// Resolve `getters` and `setters` for a set whose accessors take `keys`
    /// key arguments.
    pub(crate) fn resolve(
        owner: &str,
        keys: usize,
        getters: &[AccessorDefinition],
        setters: &[AccessorDefinition],
        table: &FunctionTable,
    ) -> Result<Self, SessionError> {
        let mut resolved = Self {
            owner: owner.to_string(),
            getters: Vec::with_capacity(getters.len()),
            setters: Vec::with_capacity(setters.len()),
            getter_of: HashMap::new(),
            setter_of: HashMap::new(),
        };

        for def in getters {
            let spec = bind(def, table)?;
            if spec.input_count() != keys || spec.output_count() != def.names.len() {
                return Err(invalid(
                    &spec,
                    format!(
                        "getter for {:?} needs {keys} inputs and {} outputs",
                        def.names,
                        def.names.len()
                    ),
                ));
            }
            let index = resolved.getters.len();
            for (pos, name) in def.names.iter().enumerate() {
                resolved
                    .getter_of
                    .entry(name.clone())
                    .or_insert((index, pos));
            }
            resolved.getters.push(Bound {
                spec,
                names: def.names.clone(),
                runtime_mutable: false,
            });
        }

        for def in setters {
            let spec = bind(def, table)?;
            if spec.input_count() != keys + def.names.len() {
                return Err(invalid(
                    &spec,
                    format!(
                        "setter for {:?} needs {} inputs",
                        def.names,
                        keys + def.names.len()
                    ),
                ));
            }
            let index = resolved.setters.len();
            for name in &def.names {
                resolved.setter_of.entry(name.clone()).or_insert(index);
            }
            resolved.setters.push(Bound {
                spec,
                names: def.names.clone(),
                runtime_mutable: def.runtime_mutable,
            });
        }

        Ok(resolved)
    }

    /// Returns `true` if `name` can be read.
    pub(crate) fn has_getter(&self, name: &str) -> bool {
        self.getter_of.contains_key(name)
    }

    /// Each setter function with its direct-call window under `set_states`.
    pub(crate) fn setter_windows(
        &self,
        set_states: &[LifecycleState],
    ) -> Vec<(String, Vec<LifecycleState>)> {
        self.setters
            .iter()
            .map(|b| {
                (
                    b.spec.name().to_string(),
                    call_window(set_states, b.runtime_mutable),
                )
            })
            .collect()
    }

    /// Attribute names that can be read, sorted.
    pub(crate) fn readable(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.getter_of.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Read `names` for the rows addressed by `keys`, calling each getter
    /// once. Values come back in the order of `names`.
    pub(crate) fn get(
        &self,
        marshaller: &mut Marshaller,
        keys: &[Value],
        names: &[&str],
    ) -> Result<Vec<Value>, SessionError> {
        let plan = names
            .iter()
            .map(|&name| {
                self.getter_of
                    .get(name)
                    .copied()
                    .ok_or_else(|| self.unknown(name))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut outputs: Vec<Option<CallOutput>> = vec![None; self.getters.len()];
        for &(getter, _) in &plan {
            if outputs[getter].is_none() {
                let function = self.getters[getter].spec.name();
                outputs[getter] = Some(marshaller.call(function, keys)?);
            }
        }

        plan.iter()
            .map(|&(getter, pos)| {
                outputs[getter]
                    .as_ref()
                    .and_then(|out| out.output(pos))
                    .cloned()
                    .ok_or_else(|| {
                        SessionError::Protocol(format!(
                            "'{}' returned no output {pos}",
                            self.getters[getter].spec.name()
                        ))
                    })
            })
            .collect()
    }

    /// Write `values` to `names` for the rows addressed by `keys`.
    ///
    /// Every setter involved must be legal in `state` and must receive all
    /// of its attributes; both are checked before any call is made.
    pub(crate) fn set(
        &self,
        marshaller: &mut Marshaller,
        keys: &[Value],
        names: &[&str],
        values: &[Value],
        state: LifecycleState,
        set_states: &[LifecycleState],
    ) -> Result<(), SessionError> {
        if names.len() != values.len() {
            return Err(SessionError::ArityMismatch(format!(
                "{} attribute names but {} values",
                names.len(),
                values.len()
            )));
        }

        let mut used: Vec<usize> = Vec::new();
        for &name in names {
            let setter = *self.setter_of.get(name).ok_or_else(|| self.unknown(name))?;
            if !used.contains(&setter) {
                used.push(setter);
            }
        }

        for &setter in &used {
            let bound = &self.setters[setter];
            let allowed = set_states.contains(&state)
                || (state == LifecycleState::Run && bound.runtime_mutable);
            if !allowed {
                let name = format!("{}.{}", self.owner, bound.names.join(","));
                return Err(if state == LifecycleState::Run {
                    SessionError::ParameterLocked { name, state }
                } else {
                    SessionError::IllegalStateTransition {
                        operation: format!("set {name}"),
                        state,
                    }
                });
            }
            if let Some(missing) = bound.names.iter().find(|n| !names.contains(&n.as_str())) {
                return Err(SessionError::ArityMismatch(format!(
                    "'{}' sets {:?} together; '{missing}' is missing",
                    bound.spec.name(),
                    bound.names
                )));
            }
        }

        for &setter in &used {
            let bound = &self.setters[setter];
            let mut args = keys.to_vec();
            for name in &bound.names {
                if let Some(pos) = names.iter().position(|n| n == name) {
                    args.push(values[pos].clone());
                }
            }
            marshaller.call(bound.spec.name(), &args)?;
        }
        Ok(())
    }

    fn unknown(&self, attribute: &str) -> SessionError {
        SessionError::UnknownAttribute {
            set: self.owner.clone(),
            attribute: attribute.to_string(),
        }
    }
}

fn bind(
    def: &AccessorDefinition,
    table: &FunctionTable,
) -> Result<Arc<RemoteFunctionSpec>, SessionError> {
    let spec = Arc::clone(table.require(&def.function)?);
    if !spec.array_mode().accepts_arrays() {
        return Err(invalid(&spec, "accessors must accept arrays".to_string()));
    }
    Ok(spec)
}

fn invalid(spec: &RemoteFunctionSpec, reason: String) -> SessionError {
    SessionError::Spec(SpecError::InvalidBinding {
        function: spec.name().to_string(),
        reason,
    })
}
