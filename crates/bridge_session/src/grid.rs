//! Grid sets: cells addressed by 3-D integer indices.
//!
//! A grid's extent is an inclusive [`IndexRange`]. It is either fixed by
//! the definition, read from a range function on the worker, or supplied
//! later by the code definition. A margin widens the range on every side
//! (a potential grid with ghost cells is one cell larger than the mesh).

use bridge_spec::{Column, FunctionTable, ScalarType, SpecError, Value};
use glam::IVec3;

use crate::accessor::{AccessorDefinition, Accessors};
use crate::error::SessionError;
use crate::lifecycle::LifecycleState;
use crate::marshaller::Marshaller;

/// Attribute names of a grid's cell-position getter.
pub const POSITION_ATTRIBUTES: [&str; 3] = ["x", "y", "z"];

/// An inclusive index range per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRange {
    /// Smallest valid index on each axis.
    pub min: IVec3,
    /// Largest valid index on each axis.
    pub max: IVec3,
}

impl IndexRange {
    /// A range from `min` to `max`, both inclusive.
    #[must_use]
    pub const fn new(min: IVec3, max: IVec3) -> Self {
        Self { min, max }
    }

    /// The range `0..=n-1` on each axis for a mesh of `shape` cells.
    #[must_use]
    pub fn from_shape(shape: IVec3) -> Self {
        Self::new(IVec3::ZERO, shape - IVec3::ONE)
    }

    /// Returns `true` if `index` lies inside the range.
    #[must_use]
    pub fn contains(&self, index: IVec3) -> bool {
        index.cmpge(self.min).all() && index.cmple(self.max).all()
    }

    /// Number of cells along each axis.
    #[must_use]
    pub fn shape(&self) -> IVec3 {
        (self.max - self.min + IVec3::ONE).max(IVec3::ZERO)
    }

    /// Total number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        let s = self.shape();
        s.x as usize * s.y as usize * s.z as usize
    }

    /// Returns `true` if the range holds no cell.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The range widened by `margin` cells on every side.
    #[must_use]
    pub fn expand(&self, margin: i32) -> Self {
        Self::new(self.min - IVec3::splat(margin), self.max + IVec3::splat(margin))
    }

    /// Every index in the range; `i` varies slowest and `k` fastest.
    #[must_use]
    pub fn indices(&self) -> Vec<IVec3> {
        let mut out = Vec::with_capacity(self.len());
        for i in self.min.x..=self.max.x {
            for j in self.min.y..=self.max.y {
                for k in self.min.z..=self.max.z {
                    out.push(IVec3::new(i, j, k));
                }
            }
        }
        out
    }
}

impl std::fmt::Display for IndexRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}..={}, {}..={}, {}..={}]",
            self.min.x, self.max.x, self.min.y, self.max.y, self.min.z, self.max.z
        )
    }
}

/// Where a grid's index range comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum RangeSource {
    /// Known up front.
    Fixed(IndexRange),
    /// Read from a worker function returning
    /// `imin, imax, jmin, jmax, kmin, kmax`.
    Function(String),
    /// Supplied later through [`GridSet::set_range`].
    Unset,
}

/// Declaration of a grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GridDefinition {
    name: String,
    range: RangeSource,
    margin: i32,
    getters: Vec<AccessorDefinition>,
    setters: Vec<AccessorDefinition>,
    set_states: Vec<LifecycleState>,
}

impl GridDefinition {
    /// Start a grid called `name` with an unset range.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            range: RangeSource::Unset,
            margin: 0,
            getters: Vec::new(),
            setters: Vec::new(),
            set_states: vec![LifecycleState::Edit, LifecycleState::Update],
        }
    }

    /// Set where the range comes from.
    #[must_use]
    pub fn range(mut self, source: RangeSource) -> Self {
        self.range = source;
        self
    }

    /// Widen the range by `margin` cells on every side.
    #[must_use]
    pub fn margin(mut self, margin: i32) -> Self {
        self.margin = margin;
        self
    }

    /// Add a getter. Its inputs are `i, j, k`.
    #[must_use]
    pub fn getter<S: Into<String>>(
        mut self,
        function: impl Into<String>,
        names: impl IntoIterator<Item = S>,
    ) -> Self {
        self.getters.push(AccessorDefinition::new(function, names));
        self
    }

    /// Add a setter. Its inputs are `i, j, k` followed by the attributes.
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

    /// The grid name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A live grid.
#[derive(Debug, Clone)]
pub struct GridSet {
    name: String,
    source: RangeSource,
    margin: i32,
    range: Option<IndexRange>,
    accessors: Accessors,
    set_states: Vec<LifecycleState>,
}

impl GridSet {
    /// Resolve `definition` against `table`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownFunction`] or [`SessionError::Spec`]
    /// if a referenced function is missing or has the wrong shape.
    pub fn new(definition: &GridDefinition, table: &FunctionTable) -> Result<Self, SessionError> {
        if let RangeSource::Function(function) = &definition.range {
            let spec = table.require(function)?;
            let shape_ok = spec.input_count() == 0
                && spec.output_count() == 6
                && spec.outputs().all(|p| p.ty == ScalarType::Int32);
            if !shape_ok {
                return Err(SessionError::Spec(SpecError::InvalidBinding {
                    function: function.clone(),
                    reason: "a range function returns six int32 bounds".to_string(),
                }));
            }
        }
        let range = match &definition.range {
            RangeSource::Fixed(range) => Some(range.expand(definition.margin)),
            RangeSource::Function(_) | RangeSource::Unset => None,
        };

        Ok(Self {
            name: definition.name.clone(),
            source: definition.range.clone(),
            margin: definition.margin,
            range,
            accessors: Accessors::resolve(
                &definition.name,
                3,
                &definition.getters,
                &definition.setters,
                table,
            )?,
            set_states: definition.set_states.clone(),
        })
    }

    /// The grid name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The range if already known, margin included.
    #[must_use]
    pub fn known_range(&self) -> Option<IndexRange> {
        self.range
    }

    /// The states in which the grid's setters may be called directly.
    pub(crate) fn call_windows(&self) -> Vec<(String, Vec<LifecycleState>)> {
        self.accessors.setter_windows(&self.set_states)
    }

    /// Supply the mesh range. The grid's margin is applied on top.
    pub fn set_range(&mut self, mesh: IndexRange) -> IndexRange {
        let range = mesh.expand(self.margin);
        self.range = Some(range);
        range
    }

    /// Forget a range read from the worker, so the next access reads it
    /// again.
    pub fn invalidate_range(&mut self) {
        if matches!(self.source, RangeSource::Function(_)) {
            self.range = None;
        }
    }

    /// The grid's inclusive range, reading it from the worker if needed.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::GridRangeUnset`] if no range is known and
    /// none can be read, or any marshaller error.
    pub fn range(&mut self, marshaller: &mut Marshaller) -> Result<IndexRange, SessionError> {
        if let Some(range) = self.range {
            return Ok(range);
        }
        let RangeSource::Function(function) = &self.source else {
            return Err(SessionError::GridRangeUnset(self.name.clone()));
        };
        let output = marshaller.call(function, &[])?;
        let mut bounds = [0i32; 6];
        for (i, bound) in bounds.iter_mut().enumerate() {
            *bound = output
                .output(i)
                .and_then(Value::as_scalar)
                .and_then(|s| s.as_i32())
                .ok_or_else(|| {
                    SessionError::Protocol(format!("'{function}' returned no bound {i}"))
                })?;
        }
        let mesh = IndexRange::new(
            IVec3::new(bounds[0], bounds[2], bounds[4]),
            IVec3::new(bounds[1], bounds[3], bounds[5]),
        );
        Ok(self.set_range(mesh))
    }

    /// Number of cells along each axis.
    ///
    /// # Errors
    ///
    /// Same as [`GridSet::range`].
    pub fn shape(&mut self, marshaller: &mut Marshaller) -> Result<IVec3, SessionError> {
        Ok(self.range(marshaller)?.shape())
    }

    /// Every index of the grid.
    ///
    /// # Errors
    ///
    /// Same as [`GridSet::range`].
    pub fn indices(&mut self, marshaller: &mut Marshaller) -> Result<Vec<IVec3>, SessionError> {
        Ok(self.range(marshaller)?.indices())
    }

    /// Read `names` at `indices`. Each returned value is a sequence in index
    /// order, one per name.
    ///
    /// # Errors
    ///
    /// [`SessionError::IndexOutOfRange`] before any call; then any
    /// marshaller error.
    pub fn get(
        &mut self,
        marshaller: &mut Marshaller,
        indices: &[IVec3],
        names: &[&str],
    ) -> Result<Vec<Value>, SessionError> {
        self.check_indices(marshaller, indices)?;
        self.accessors.get(marshaller, &index_columns(indices), names)
    }

    /// Read one attribute of one cell as a scalar.
    ///
    /// # Errors
    ///
    /// Same as [`GridSet::get`].
    pub fn get_one(
        &mut self,
        marshaller: &mut Marshaller,
        index: IVec3,
        name: &str,
    ) -> Result<Value, SessionError> {
        self.check_indices(marshaller, &[index])?;
        let keys = [Value::from(index.x), Value::from(index.y), Value::from(index.z)];
        let mut values = self.accessors.get(marshaller, &keys, &[name])?;
        values
            .pop()
            .ok_or_else(|| SessionError::Protocol(format!("no value for '{name}' at {index}")))
    }

    /// Write `values` (one sequence per name, in index order) to `names`.
    ///
    /// # Errors
    ///
    /// [`SessionError::IndexOutOfRange`] before any call;
    /// [`SessionError::ParameterLocked`] in RUN unless the setter is
    /// runtime-mutable; then any marshaller error.
    pub fn set(
        &mut self,
        marshaller: &mut Marshaller,
        state: LifecycleState,
        indices: &[IVec3],
        names: &[&str],
        values: &[Value],
    ) -> Result<(), SessionError> {
        self.check_indices(marshaller, indices)?;
        self.accessors.set(
            marshaller,
            &index_columns(indices),
            names,
            values,
            state,
            &self.set_states,
        )
    }

    /// Cell positions `x, y, z` at `indices`.
    ///
    /// # Errors
    ///
    /// Same as [`GridSet::get`]; [`SessionError::UnknownAttribute`] if the
    /// grid has no position getter.
    pub fn positions(
        &mut self,
        marshaller: &mut Marshaller,
        indices: &[IVec3],
    ) -> Result<Vec<Value>, SessionError> {
        self.get(marshaller, indices, &POSITION_ATTRIBUTES)
    }

    fn check_indices(
        &mut self,
        marshaller: &mut Marshaller,
        indices: &[IVec3],
    ) -> Result<(), SessionError> {
        let range = self.range(marshaller)?;
        match indices.iter().find(|&&index| !range.contains(index)) {
            Some(&index) => Err(SessionError::IndexOutOfRange {
                grid: self.name.clone(),
                index,
                range,
            }),
            None => Ok(()),
        }
    }
}

fn index_columns(indices: &[IVec3]) -> [Value; 3] {
    [
        Value::Sequence(Column::Int32(indices.iter().map(|v| v.x).collect())),
        Value::Sequence(Column::Int32(indices.iter().map(|v| v.y).collect())),
        Value::Sequence(Column::Int32(indices.iter().map(|v| v.z).collect())),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_from_shape() {
        let range = IndexRange::from_shape(IVec3::new(4, 3, 2));
        assert_eq!(range.max, IVec3::new(3, 2, 1));
        assert_eq!(range.shape(), IVec3::new(4, 3, 2));
        assert_eq!(range.len(), 24);
    }

    #[test]
    fn test_contains_is_inclusive() {
        let range = IndexRange::from_shape(IVec3::new(4, 4, 4));
        assert!(range.contains(IVec3::ZERO));
        assert!(range.contains(IVec3::new(3, 3, 3)));
        assert!(!range.contains(IVec3::new(4, 0, 0)));
        assert!(!range.contains(IVec3::new(0, -1, 0)));
    }

    #[test]
    fn test_expand_adds_ghost_layer() {
        let range = IndexRange::from_shape(IVec3::new(4, 4, 4)).expand(1);
        assert_eq!(range.min, IVec3::splat(-1));
        assert_eq!(range.max, IVec3::splat(4));
        assert_eq!(range.shape(), IVec3::splat(6));
    }

    #[test]
    fn test_indices_order() {
        let range = IndexRange::from_shape(IVec3::new(2, 1, 2));
        assert_eq!(
            range.indices(),
            vec![
                IVec3::new(0, 0, 0),
                IVec3::new(0, 0, 1),
                IVec3::new(1, 0, 0),
                IVec3::new(1, 0, 1),
            ]
        );
    }

    #[test]
    fn test_empty_range() {
        let range = IndexRange::from_shape(IVec3::new(0, 4, 4));
        assert!(range.is_empty());
        assert!(range.indices().is_empty());
    }

    #[test]
    fn test_display() {
        let range = IndexRange::from_shape(IVec3::new(2, 3, 4));
        assert_eq!(range.to_string(), "[0..=1, 0..=2, 0..=3]");
    }
}
