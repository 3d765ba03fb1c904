//! A configurable kernel holding its state in memory.
//!
//! [`MemoryKernel`] stands in for a scientific code. Each function is bound
//! to a behavior (construct entities, read a parameter, fail with a code,
//! and so on); unbound functions succeed and return zeros. Clones share
//! state, so a test can keep one clone for inspection while a transport
//! owns the other.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bridge_spec::{
    Column, EntityHandle, HandleAllocator, ParameterSpec, RemoteFunctionSpec, ResultKind, Scalar,
    ScalarType,
};
use tracing::{debug, trace};

use crate::error::KernelError;
use crate::kernel::{Invocation, Kernel, Outcome};

/// Error code for rows naming an unknown handle.
pub const UNKNOWN_HANDLE: i32 = -1;

type Attributes = HashMap<String, Scalar>;

#[derive(Debug, Clone)]
enum Behavior {
    Construct(String),
    Destroy(String),
    EntityGet(String),
    EntitySet(String),
    CellGet(String),
    CellSet(String),
    CellCentres { origin: [f64; 3], spacing: [f64; 3] },
    ParameterGet(String),
    ParameterSet(String),
    KeyedGet,
    KeyedSet,
    Constant(Vec<Scalar>),
    Fail(i32),
}

/// One call as the kernel received it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Function name.
    pub function: String,
    /// Number of rows.
    pub rows: usize,
    /// Input columns, LENGTH stripped.
    pub inputs: Vec<Column>,
}

#[derive(Debug, Default)]
struct EntityStore {
    allocator: HandleAllocator,
    rows: BTreeMap<i32, Attributes>,
}

#[derive(Debug, Default)]
struct State {
    behaviors: HashMap<String, Behavior>,
    sets: HashMap<String, EntityStore>,
    grids: HashMap<String, HashMap<[i32; 3], Attributes>>,
    parameters: HashMap<String, Scalar>,
    calls: Vec<RecordedCall>,
    stopped: bool,
}

/// An in-memory [`Kernel`].
#[derive(Debug, Clone, Default)]
pub struct MemoryKernel {
    state: Arc<Mutex<State>>,
}

impl MemoryKernel {
    /// A kernel with no bound functions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bind(self, function: impl Into<String>, behavior: Behavior) -> Self {
        self.lock().behaviors.insert(function.into(), behavior);
        self
    }

    // ── Configuration ───────────────────────────────────────────────────────

    /// `function` creates one entity of `set` per row, storing its inputs
    /// as attributes and returning the new handle as its first output.
    #[must_use]
    pub fn entity_constructor(self, function: impl Into<String>, set: impl Into<String>) -> Self {
        self.bind(function, Behavior::Construct(set.into()))
    }

    /// `function` deletes the entity named by its first input.
    #[must_use]
    pub fn entity_destructor(self, function: impl Into<String>, set: impl Into<String>) -> Self {
        self.bind(function, Behavior::Destroy(set.into()))
    }

    /// `function` reads attributes named after its outputs.
    #[must_use]
    pub fn entity_getter(self, function: impl Into<String>, set: impl Into<String>) -> Self {
        self.bind(function, Behavior::EntityGet(set.into()))
    }

    /// `function` writes attributes named after its inputs after the first.
    #[must_use]
    pub fn entity_setter(self, function: impl Into<String>, set: impl Into<String>) -> Self {
        self.bind(function, Behavior::EntitySet(set.into()))
    }

    /// `function` reads cell attributes at the `(i, j, k)` of its first
    /// three inputs.
    #[must_use]
    pub fn grid_getter(self, function: impl Into<String>, grid: impl Into<String>) -> Self {
        self.bind(function, Behavior::CellGet(grid.into()))
    }

    /// `function` writes cell attributes at the `(i, j, k)` of its first
    /// three inputs.
    #[must_use]
    pub fn grid_setter(self, function: impl Into<String>, grid: impl Into<String>) -> Self {
        self.bind(function, Behavior::CellSet(grid.into()))
    }

    /// `function` returns cell centres `origin + (index + 0.5) * spacing`.
    #[must_use]
    pub fn cell_centres(
        self,
        function: impl Into<String>,
        origin: [f64; 3],
        spacing: [f64; 3],
    ) -> Self {
        self.bind(function, Behavior::CellCentres { origin, spacing })
    }

    /// `function` returns the stored parameter `key`.
    #[must_use]
    pub fn parameter_getter(self, function: impl Into<String>, key: impl Into<String>) -> Self {
        self.bind(function, Behavior::ParameterGet(key.into()))
    }

    /// `function` stores its first input as parameter `key`.
    #[must_use]
    pub fn parameter_setter(self, function: impl Into<String>, key: impl Into<String>) -> Self {
        self.bind(function, Behavior::ParameterSet(key.into()))
    }

    /// `function(block, name)` returns parameter `block.name`.
    #[must_use]
    pub fn keyed_getter(self, function: impl Into<String>) -> Self {
        self.bind(function, Behavior::KeyedGet)
    }

    /// `function(block, name, ..)` stores parameter `block.name`. The value
    /// is the first numeric input after the two keys, so trailing format
    /// and comment strings are ignored.
    #[must_use]
    pub fn keyed_setter(self, function: impl Into<String>) -> Self {
        self.bind(function, Behavior::KeyedSet)
    }

    /// `function` always returns `values` as its outputs.
    #[must_use]
    pub fn constant(self, function: impl Into<String>, values: Vec<Scalar>) -> Self {
        self.bind(function, Behavior::Constant(values))
    }

    /// `function` fails every row with `code`.
    #[must_use]
    pub fn fail_with(self, function: impl Into<String>, code: i32) -> Self {
        self.bind(function, Behavior::Fail(code))
    }

    /// Make `function` fail every row with `code` from now on.
    pub fn inject_failure(&self, function: impl Into<String>, code: i32) {
        self.lock().behaviors.insert(function.into(), Behavior::Fail(code));
    }

    /// Store parameter `key` as if the code had computed it.
    pub fn seed_parameter(&self, key: impl Into<String>, value: Scalar) {
        self.lock().parameters.insert(key.into(), value);
    }

    /// Store a cell attribute as if the code had computed it.
    pub fn seed_cell(&self, grid: &str, index: [i32; 3], name: impl Into<String>, value: Scalar) {
        self.lock()
            .grids
            .entry(grid.to_string())
            .or_default()
            .entry(index)
            .or_default()
            .insert(name.into(), value);
    }

    // ── Inspection ──────────────────────────────────────────────────────────

    /// Every call received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    /// Names of the functions called so far, in order.
    #[must_use]
    pub fn call_log(&self) -> Vec<String> {
        self.lock().calls.iter().map(|c| c.function.clone()).collect()
    }

    /// How many times `function` was called.
    #[must_use]
    pub fn calls_to(&self, function: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.function == function)
            .count()
    }

    /// The stored parameter `key`.
    #[must_use]
    pub fn parameter(&self, key: &str) -> Option<Scalar> {
        self.lock().parameters.get(key).cloned()
    }

    /// Number of live entities in `set`.
    #[must_use]
    pub fn entity_count(&self, set: &str) -> usize {
        self.lock().sets.get(set).map_or(0, |s| s.rows.len())
    }

    /// A stored entity attribute.
    #[must_use]
    pub fn attribute(&self, set: &str, handle: EntityHandle, name: &str) -> Option<Scalar> {
        self.lock()
            .sets
            .get(set)?
            .rows
            .get(&handle.id())?
            .get(name)
            .cloned()
    }

    /// A stored cell attribute.
    #[must_use]
    pub fn cell(&self, grid: &str, index: [i32; 3], name: &str) -> Option<Scalar> {
        self.lock().grids.get(grid)?.get(&index)?.get(name).cloned()
    }

    /// Returns `true` once the kernel has been stopped.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }
}

impl Kernel for MemoryKernel {
    fn invoke(&mut self, call: &Invocation<'_>) -> Result<Outcome, KernelError> {
        let mut state = self.lock();
        if state.stopped {
            return Err(KernelError::Stopped);
        }
        let spec = call.spec;
        trace!(function = spec.name(), rows = call.rows, "memory kernel call");
        state.calls.push(RecordedCall {
            function: spec.name().to_string(),
            rows: call.rows,
            inputs: call.inputs.iter().map(|c| (*c).clone()).collect(),
        });

        match state.behaviors.get(spec.name()).cloned() {
            None => Ok(finish(spec, call.rows, vec![0; call.rows], zeros(spec, call.rows), None)),
            Some(Behavior::Construct(set)) => state.construct(&set, call),
            Some(Behavior::Destroy(set)) => state.destroy(&set, call),
            Some(Behavior::EntityGet(set)) => state.entity_get(&set, call),
            Some(Behavior::EntitySet(set)) => state.entity_set(&set, call),
            Some(Behavior::CellGet(grid)) => state.cell_get(&grid, call),
            Some(Behavior::CellSet(grid)) => state.cell_set(&grid, call),
            Some(Behavior::CellCentres { origin, spacing }) => cell_centres(call, origin, spacing),
            Some(Behavior::ParameterGet(key)) => {
                let keys = vec![key; call.rows];
                Ok(state.parameter_get(call, &keys))
            }
            Some(Behavior::ParameterSet(key)) => {
                if call.rows > 0 {
                    let value = call.scalar(0, call.rows - 1)?;
                    state.parameters.insert(key, value);
                }
                Ok(finish(spec, call.rows, vec![0; call.rows], zeros(spec, call.rows), None))
            }
            Some(Behavior::KeyedGet) => {
                let keys = (0..call.rows)
                    .map(|row| block_key(call, row))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(state.parameter_get(call, &keys))
            }
            Some(Behavior::KeyedSet) => {
                let slot = spec
                    .inputs()
                    .skip(2)
                    .position(|p| p.ty.is_numeric())
                    .map_or(2, |i| i + 2);
                for row in 0..call.rows {
                    let key = block_key(call, row)?;
                    let value = call.scalar(slot, row)?;
                    state.parameters.insert(key, value);
                }
                Ok(finish(spec, call.rows, vec![0; call.rows], zeros(spec, call.rows), None))
            }
            Some(Behavior::Constant(values)) => {
                let outputs = spec
                    .outputs()
                    .enumerate()
                    .map(|(i, p)| fill(p, std::iter::repeat_n(values.get(i), call.rows)))
                    .collect();
                Ok(finish(spec, call.rows, vec![0; call.rows], outputs, None))
            }
            Some(Behavior::Fail(code)) => {
                debug!(function = spec.name(), code, "injected failure");
                Ok(finish(spec, call.rows, vec![code; call.rows], zeros(spec, call.rows), None))
            }
        }
    }

    fn stop(&mut self) {
        let mut state = self.lock();
        state.stopped = true;
        state.sets.clear();
        state.grids.clear();
    }
}

impl State {
    fn construct(&mut self, set: &str, call: &Invocation<'_>) -> Result<Outcome, KernelError> {
        let store = self.sets.entry(set.to_string()).or_default();
        let mut handles = Vec::with_capacity(call.rows);
        for row in 0..call.rows {
            let mut attributes = Attributes::new();
            for (i, param) in call.spec.inputs().enumerate() {
                attributes.insert(param.name.clone(), call.scalar(i, row)?);
            }
            let handle = store.allocator.allocate().id();
            store.rows.insert(handle, attributes);
            handles.push(handle);
        }
        debug!(set, created = handles.len(), "entities created");
        let outputs = call
            .spec
            .outputs()
            .enumerate()
            .map(|(i, p)| {
                if i == 0 {
                    Column::Int32(handles.clone())
                } else {
                    fill(p, std::iter::repeat_n(None, call.rows))
                }
            })
            .collect();
        Ok(finish(call.spec, call.rows, vec![0; call.rows], outputs, None))
    }

    fn destroy(&mut self, set: &str, call: &Invocation<'_>) -> Result<Outcome, KernelError> {
        let handles = row_handles(call)?;
        let store = self.sets.entry(set.to_string()).or_default();
        let codes = handles
            .iter()
            .map(|h| if store.rows.remove(h).is_some() { 0 } else { UNKNOWN_HANDLE })
            .collect();
        Ok(finish(call.spec, call.rows, codes, zeros(call.spec, call.rows), None))
    }

    fn entity_get(&self, set: &str, call: &Invocation<'_>) -> Result<Outcome, KernelError> {
        let handles = row_handles(call)?;
        let store = self.sets.get(set);
        let found: Vec<Option<&Attributes>> = handles
            .iter()
            .map(|h| store.and_then(|s| s.rows.get(h)))
            .collect();
        let codes = found
            .iter()
            .map(|f| if f.is_some() { 0 } else { UNKNOWN_HANDLE })
            .collect();
        let outputs = from_rows(call.spec, &found);
        Ok(finish(call.spec, call.rows, codes, outputs, None))
    }

    fn entity_set(&mut self, set: &str, call: &Invocation<'_>) -> Result<Outcome, KernelError> {
        let handles = row_handles(call)?;
        let store = self.sets.entry(set.to_string()).or_default();
        let mut codes = Vec::with_capacity(call.rows);
        for (row, handle) in handles.iter().enumerate() {
            let Some(attributes) = store.rows.get_mut(handle) else {
                codes.push(UNKNOWN_HANDLE);
                continue;
            };
            for (i, param) in call.spec.inputs().enumerate().skip(1) {
                attributes.insert(param.name.clone(), call.scalar(i, row)?);
            }
            codes.push(0);
        }
        Ok(finish(call.spec, call.rows, codes, zeros(call.spec, call.rows), None))
    }

    fn cell_get(&self, grid: &str, call: &Invocation<'_>) -> Result<Outcome, KernelError> {
        let cells = self.grids.get(grid);
        let indices = (0..call.rows)
            .map(|row| row_index(call, row))
            .collect::<Result<Vec<_>, _>>()?;
        let found: Vec<Option<&Attributes>> = indices
            .iter()
            .map(|index| cells.and_then(|c| c.get(index)))
            .collect();
        let outputs = from_rows(call.spec, &found);
        Ok(finish(call.spec, call.rows, vec![0; call.rows], outputs, None))
    }

    fn cell_set(&mut self, grid: &str, call: &Invocation<'_>) -> Result<Outcome, KernelError> {
        let cells = self.grids.entry(grid.to_string()).or_default();
        for row in 0..call.rows {
            let attributes = cells.entry(row_index(call, row)?).or_default();
            for (i, param) in call.spec.inputs().enumerate().skip(3) {
                attributes.insert(param.name.clone(), call.scalar(i, row)?);
            }
        }
        Ok(finish(call.spec, call.rows, vec![0; call.rows], zeros(call.spec, call.rows), None))
    }

    fn parameter_get(&self, call: &Invocation<'_>, keys: &[String]) -> Outcome {
        let values = move || keys.iter().map(move |k| self.parameters.get(k));
        let outputs = call.spec.outputs().map(|p| fill(p, values())).collect();
        let value = match call.spec.result() {
            ResultKind::Value { ty, .. } if call.spec.output_count() == 0 => {
                let scalars = values().map(|v| coerce_or_zero(v, *ty));
                Column::from_scalars(*ty, scalars)
            }
            _ => None,
        };
        finish(call.spec, call.rows, vec![0; call.rows], outputs, value)
    }
}

fn row_handles(call: &Invocation<'_>) -> Result<Vec<i32>, KernelError> {
    (0..call.rows)
        .map(|row| Ok(call.scalar(0, row)?.as_i32().unwrap_or(UNKNOWN_HANDLE)))
        .collect()
}

fn row_index(call: &Invocation<'_>, row: usize) -> Result<[i32; 3], KernelError> {
    let mut index = [0; 3];
    for (axis, slot) in index.iter_mut().enumerate() {
        *slot = call.scalar(axis, row)?.as_i32().unwrap_or_default();
    }
    Ok(index)
}

fn block_key(call: &Invocation<'_>, row: usize) -> Result<String, KernelError> {
    let block = call.scalar(0, row)?;
    let name = call.scalar(1, row)?;
    Ok(format!(
        "{}.{}",
        block.as_str().unwrap_or_default(),
        name.as_str().unwrap_or_default()
    ))
}

fn cell_centres(
    call: &Invocation<'_>,
    origin: [f64; 3],
    spacing: [f64; 3],
) -> Result<Outcome, KernelError> {
    let indices = (0..call.rows)
        .map(|row| row_index(call, row))
        .collect::<Result<Vec<_>, _>>()?;
    let outputs = call
        .spec
        .outputs()
        .enumerate()
        .map(|(axis, p)| {
            let axis = axis.min(2);
            let centres: Vec<f64> = indices
                .iter()
                .map(|index| origin[axis] + (f64::from(index[axis]) + 0.5) * spacing[axis])
                .collect();
            Column::from_f64(p.ty, &centres).unwrap_or_else(|| fill(p, centres.iter().map(|_| None)))
        })
        .collect();
    Ok(finish(call.spec, call.rows, vec![0; call.rows], outputs, None))
}

fn coerce_or_zero(value: Option<&Scalar>, ty: ScalarType) -> Scalar {
    value
        .and_then(|v| v.coerce(ty))
        .unwrap_or_else(|| Scalar::zero(ty))
}

fn fill<'a>(param: &ParameterSpec, values: impl Iterator<Item = Option<&'a Scalar>>) -> Column {
    let scalars: Vec<Scalar> = values.map(|v| coerce_or_zero(v, param.ty)).collect();
    let rows = scalars.len();
    Column::from_scalars(param.ty, scalars)
        .unwrap_or_else(|| Column::repeat(&Scalar::zero(param.ty), rows))
}

fn from_rows(spec: &RemoteFunctionSpec, rows: &[Option<&Attributes>]) -> Vec<Column> {
    spec.outputs()
        .map(|p| fill(p, rows.iter().map(|r| r.and_then(|a| a.get(&p.name)))))
        .collect()
}

fn zeros(spec: &RemoteFunctionSpec, rows: usize) -> Vec<Column> {
    spec.outputs()
        .map(|p| Column::repeat(&Scalar::zero(p.ty), rows))
        .collect()
}

fn finish(
    spec: &RemoteFunctionSpec,
    rows: usize,
    codes: Vec<i32>,
    outputs: Vec<Column>,
    value: Option<Column>,
) -> Outcome {
    let result = match spec.result() {
        ResultKind::None => None,
        ResultKind::ErrorCode => Some(Column::Int32(codes)),
        ResultKind::Value { ty, .. } => {
            Some(value.unwrap_or_else(|| Column::repeat(&Scalar::zero(*ty), rows)))
        }
    };
    Outcome { result, outputs }
}
