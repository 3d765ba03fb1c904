//! Athena, a grid-based magnetohydrodynamics code.
//!
//! Athena is configured through string-keyed `block.name` parameters
//! (`par_seti`, `par_setd`) before `initialize_grid`. The hydro state lives
//! on `grid`; the gravitational potential lives on `potential_grid`, which
//! has one ghost cell on every side.

use std::fmt;
use std::str::FromStr;

use bridge_session::{
    CodeDefinition, GridDefinition, Hooks, IndexRange, ParameterDescriptor, Session, SessionError,
};
use bridge_spec::{
    FunctionSpecBuilder, FunctionTable, RemoteFunctionSpec, Scalar, ScalarType, SpecError, Value,
};
use bridge_units::{Unit, UnitValue, generic};
use bridge_worker::MemoryKernel;
use glam::{DVec3, IVec3};
use tracing::debug;

use crate::error::CodeError;

/// Code name.
pub const NAME: &str = "athena";
/// Worker binary.
pub const WORKER: &str = "athena_worker";
/// The hydro grid.
pub const GRID: &str = "grid";
/// The potential grid.
pub const POTENTIAL_GRID: &str = "potential_grid";

/// Hydro state attributes, in the order of the state functions.
pub const STATE_ATTRIBUTES: [&str; 5] = ["rho", "rhox", "rhoy", "rhoz", "energy"];
const STATE_WIRE: [&str; 5] = ["rho", "rhovx", "rhovy", "rhovz", "en"];
const INDEX: [&str; 3] = ["i", "j", "k"];
const POSITION: [&str; 3] = ["x", "y", "z"];

/// Boundary condition on one face of the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    Reflective,
    Outflow,
    Periodic,
}

impl Boundary {
    /// The worker's flag value.
    #[must_use]
    pub const fn flag(self) -> i32 {
        match self {
            Self::Reflective => 1,
            Self::Outflow => 2,
            Self::Periodic => 4,
        }
    }
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Reflective => "reflective",
            Self::Outflow => "outflow",
            Self::Periodic => "periodic",
        })
    }
}

impl FromStr for Boundary {
    type Err = CodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reflective" => Ok(Self::Reflective),
            "outflow" => Ok(Self::Outflow),
            "periodic" => Ok(Self::Periodic),
            other => Err(CodeError::UnknownBoundary(other.to_string())),
        }
    }
}

/// Boundaries of the six mesh faces, inner then outer per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundaries {
    pub x: (Boundary, Boundary),
    pub y: (Boundary, Boundary),
    pub z: (Boundary, Boundary),
}

impl Boundaries {
    /// The same condition on every face.
    #[must_use]
    pub const fn all(boundary: Boundary) -> Self {
        Self {
            x: (boundary, boundary),
            y: (boundary, boundary),
            z: (boundary, boundary),
        }
    }

    fn flags(&self) -> [(&'static str, i32); 6] {
        [
            ("ibc_x1", self.x.0.flag()),
            ("obc_x1", self.x.1.flag()),
            ("ibc_x2", self.y.0.flag()),
            ("obc_x2", self.y.1.flag()),
            ("ibc_x3", self.z.0.flag()),
            ("obc_x3", self.z.1.flag()),
        ]
    }
}

/// A regular mesh: cell counts and physical extent per axis. The mesh
/// starts at the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mesh {
    /// Number of cells along each axis.
    pub cells: IVec3,
    /// Physical length along each axis, in generic length.
    pub extent: DVec3,
}

impl Mesh {
    /// A mesh of `cells` cells spanning `extent`.
    #[must_use]
    pub const fn new(cells: IVec3, extent: DVec3) -> Self {
        Self { cells, extent }
    }

    /// Cell size along each axis.
    #[must_use]
    pub fn spacing(&self) -> DVec3 {
        self.extent / self.cells.max(IVec3::ONE).as_dvec3()
    }

    /// Inclusive index range of the hydro grid.
    #[must_use]
    pub fn range(&self) -> IndexRange {
        IndexRange::from_shape(self.cells)
    }
}

fn state_units() -> [Unit; 5] {
    let momentum = generic::momentum();
    [
        generic::density(),
        momentum.clone(),
        momentum.clone(),
        momentum,
        generic::energy(),
    ]
}

fn cell_function(name: &str) -> FunctionSpecBuilder {
    INDEX
        .iter()
        .fold(RemoteFunctionSpec::builder(name), |b, axis| {
            b.input(*axis, ScalarType::Int32)
        })
}

fn keyed(name: &str) -> FunctionSpecBuilder {
    RemoteFunctionSpec::builder(name)
        .input("block", ScalarType::String)
        .input("name", ScalarType::String)
}

/// Every function of the Athena worker.
///
/// # Errors
///
/// Returns [`SpecError`] if a declaration is rejected.
pub fn function_table() -> Result<FunctionTable, SpecError> {
    let mut specs = Vec::new();
    for hook in [
        "initialize_code",
        "commit_parameters",
        "recommit_parameters",
        "initialize_grid",
        "cleanup_code",
    ] {
        specs.push(RemoteFunctionSpec::builder(hook).returns_error_code().build()?);
    }

    specs.push(
        keyed("par_seti")
            .input("fmt", ScalarType::String)
            .input("ival", ScalarType::Int32)
            .input("comment", ScalarType::String)
            .build()?,
    );
    specs.push(keyed("par_geti").returns(ScalarType::Int32).build()?);
    specs.push(
        keyed("par_setd")
            .input("fmt", ScalarType::String)
            .input("dval", ScalarType::Float64)
            .input("comment", ScalarType::String)
            .build()?,
    );
    specs.push(keyed("par_getd").returns(ScalarType::Float64).build()?);

    let length = generic::length();
    let mut position = cell_function("get_position_of_index").can_handle_array();
    for axis in POSITION {
        position = position.output_with_unit(axis, ScalarType::Float64, length.clone());
    }
    specs.push(position.returns_error_code().build()?);

    let mut index_of = RemoteFunctionSpec::builder("get_index_of_position").can_handle_array();
    for axis in POSITION {
        index_of = index_of.input_with_unit(axis, ScalarType::Float64, length.clone());
    }
    for axis in INDEX {
        index_of = index_of.output(axis, ScalarType::Float64);
    }
    specs.push(index_of.returns_error_code().build()?);

    for (name, setter, batched) in [
        ("get_grid_state", false, false),
        ("fill_grid_state", true, false),
        ("get_grid_state_mpi", false, true),
        ("fill_grid_state_mpi", true, true),
    ] {
        let mut builder = cell_function(name);
        for (wire, unit) in STATE_WIRE.iter().zip(state_units()) {
            builder = if setter {
                builder.input_with_unit(*wire, ScalarType::Float64, unit)
            } else {
                builder.output_with_unit(*wire, ScalarType::Float64, unit)
            };
        }
        builder = if batched {
            builder.length("number_of_points").must_handle_array()
        } else {
            builder.can_handle_array()
        };
        specs.push(builder.returns_error_code().build()?);
    }

    specs.push(
        cell_function("set_potential")
            .input_with_unit("potential", ScalarType::Float64, generic::energy())
            .length("number_of_points")
            .must_handle_array()
            .returns_error_code()
            .build()?,
    );
    specs.push(
        cell_function("get_potential")
            .output_with_unit("potential", ScalarType::Float64, generic::energy())
            .length("number_of_points")
            .must_handle_array()
            .returns_error_code()
            .build()?,
    );

    specs.push(
        RemoteFunctionSpec::builder("evolve")
            .input_with_unit("value", ScalarType::Float64, generic::time())
            .returns_error_code()
            .build()?,
    );
    for (name, unit) in [("get_timestep", generic::time()), ("get_time", generic::time())] {
        specs.push(
            RemoteFunctionSpec::builder(name)
                .output_with_unit("value", ScalarType::Float64, unit)
                .returns_error_code()
                .build()?,
        );
    }
    specs.push(
        RemoteFunctionSpec::builder("set_timestep")
            .input_with_unit("value", ScalarType::Float64, generic::time())
            .returns_error_code()
            .build()?,
    );
    specs.push(
        RemoteFunctionSpec::builder("get_nghost")
            .output("value", ScalarType::Int32)
            .returns_error_code()
            .build()?,
    );

    let mut eigensystem = RemoteFunctionSpec::builder("esys_roe_adb_hydro")
        .output("index", ScalarType::Int32);
    for name in ["u", "v", "w", "h", "ev"] {
        eigensystem = eigensystem.output(name, ScalarType::Float64);
    }
    for prefix in ["rem", "lem"] {
        for i in 0..5 {
            eigensystem = eigensystem.output(format!("{prefix}{i}"), ScalarType::Float64);
        }
    }
    specs.push(eigensystem.can_handle_array().returns_error_code().build()?);
    specs.push(
        RemoteFunctionSpec::builder("fill_grid_linearwave_1d")
            .input("wave_flag", ScalarType::Int32)
            .input("amplitude", ScalarType::Float64)
            .input("vflow", ScalarType::Float64)
            .input("wave_dir", ScalarType::Int32)
            .can_handle_array()
            .returns_error_code()
            .build()?,
    );

    let mut table = FunctionTable::new();
    table.register_all(specs)?;
    Ok(table)
}

/// The hydro grid. Its range is supplied by [`setup_mesh`] or
/// [`sync_grid_ranges`].
#[must_use]
pub fn grid() -> GridDefinition {
    GridDefinition::new(GRID)
        .getter("get_position_of_index", POSITION)
        .getter("get_grid_state_mpi", STATE_ATTRIBUTES)
        .runtime_setter("fill_grid_state_mpi", STATE_ATTRIBUTES)
}

/// The potential grid, one cell larger than the hydro grid on every side.
#[must_use]
pub fn potential_grid() -> GridDefinition {
    GridDefinition::new(POTENTIAL_GRID)
        .margin(1)
        .getter("get_position_of_index", POSITION)
        .getter("get_potential", ["potential"])
        .runtime_setter("set_potential", ["potential"])
}

/// The Athena code definition.
///
/// # Errors
///
/// Returns [`SpecError`] if a declaration is rejected.
pub fn definition() -> Result<CodeDefinition, SpecError> {
    Ok(CodeDefinition::new(NAME, function_table()?)
        .worker(WORKER)
        .grid(grid())
        .grid(potential_grid())
        .parameter(
            ParameterDescriptor::method(
                "timestep",
                "get_timestep",
                "set_timestep",
                UnitValue::scalar(0.0, generic::time()),
            )
            .describe("Fixed time step; zero lets the code choose.")
            .runtime_mutable(),
        )
        .parameter(
            ParameterDescriptor::read_only("number_of_ghost_cells", "get_nghost", 0)
                .describe("Ghost cells on each side of the mesh."),
        )
        .hooks(Hooks {
            commit: vec!["commit_parameters".to_string(), "initialize_grid".to_string()],
            recommit: vec!["recommit_parameters".to_string()],
            evolve: Some("evolve".to_string()),
            ..Hooks::default()
        }))
}

/// A [`MemoryKernel`] bound to the Athena functions, with cell centres laid
/// out for `mesh`.
#[must_use]
pub fn memory_kernel(mesh: &Mesh) -> MemoryKernel {
    MemoryKernel::new()
        .keyed_setter("par_seti")
        .keyed_setter("par_setd")
        .keyed_getter("par_geti")
        .keyed_getter("par_getd")
        .cell_centres("get_position_of_index", [0.0; 3], mesh.spacing().to_array())
        .grid_getter("get_grid_state_mpi", GRID)
        .grid_setter("fill_grid_state_mpi", GRID)
        .grid_getter("get_grid_state", GRID)
        .grid_setter("fill_grid_state", GRID)
        .grid_getter("get_potential", POTENTIAL_GRID)
        .grid_setter("set_potential", POTENTIAL_GRID)
        .parameter_getter("get_timestep", "timestep")
        .parameter_setter("set_timestep", "timestep")
        .parameter_setter("evolve", "time")
        .parameter_getter("get_time", "time")
        .constant("get_nghost", vec![Scalar::Int32(4)])
}

/// Set an integer `block.name` parameter.
///
/// # Errors
///
/// Any remote failure.
pub fn set_int(session: &mut Session, block: &str, name: &str, value: i32) -> Result<(), SessionError> {
    session.call(
        "par_seti",
        &[
            Value::from(block),
            Value::from(name),
            Value::from("%d"),
            Value::from(value),
            Value::from("-"),
        ],
    )?;
    Ok(())
}

/// Set a floating-point `block.name` parameter.
///
/// # Errors
///
/// Any remote failure.
pub fn set_float(session: &mut Session, block: &str, name: &str, value: f64) -> Result<(), SessionError> {
    session.call(
        "par_setd",
        &[
            Value::from(block),
            Value::from(name),
            Value::from("%.15e"),
            Value::from(value),
            Value::from("-"),
        ],
    )?;
    Ok(())
}

/// Read an integer `block.name` parameter.
///
/// # Errors
///
/// Any remote failure, or [`SessionError::Protocol`] if no value came back.
pub fn get_int(session: &mut Session, block: &str, name: &str) -> Result<i32, SessionError> {
    let output = session.call("par_geti", &[Value::from(block), Value::from(name)])?;
    output
        .result()
        .and_then(Value::as_scalar)
        .and_then(|s| s.as_i32())
        .ok_or_else(|| SessionError::Protocol(format!("par_geti returned no value for {block}.{name}")))
}

/// Read a floating-point `block.name` parameter.
///
/// # Errors
///
/// Same as [`get_int`].
pub fn get_float(session: &mut Session, block: &str, name: &str) -> Result<f64, SessionError> {
    let output = session.call("par_getd", &[Value::from(block), Value::from(name)])?;
    output
        .result()
        .and_then(Value::as_scalar)
        .and_then(|s| s.as_f64())
        .ok_or_else(|| SessionError::Protocol(format!("par_getd returned no value for {block}.{name}")))
}

/// Write the mesh size and extent, then fix both grid ranges from it.
///
/// # Errors
///
/// Any remote failure.
pub fn setup_mesh(session: &mut Session, mesh: &Mesh) -> Result<(), SessionError> {
    for (axis, (cells, extent)) in mesh
        .cells
        .to_array()
        .into_iter()
        .zip(mesh.extent.to_array())
        .enumerate()
    {
        let n = axis + 1;
        set_int(session, "grid", &format!("Nx{n}"), cells)?;
        set_float(session, "grid", &format!("x{n}min"), 0.0)?;
        set_float(session, "grid", &format!("x{n}max"), extent)?;
    }
    debug!(cells = %mesh.cells, extent = %mesh.extent, "mesh configured");
    set_ranges(session, mesh.range())
}

/// The hydro grid's inclusive range, computed from the worker's cell
/// counts.
///
/// # Errors
///
/// Any remote failure.
pub fn index_range_inclusive(session: &mut Session) -> Result<IndexRange, SessionError> {
    let cells = IVec3::new(
        get_int(session, "grid", "Nx1")?,
        get_int(session, "grid", "Nx2")?,
        get_int(session, "grid", "Nx3")?,
    );
    Ok(IndexRange::from_shape(cells))
}

/// Read the mesh size from the worker and fix both grid ranges.
///
/// # Errors
///
/// Any remote failure.
pub fn sync_grid_ranges(session: &mut Session) -> Result<IndexRange, SessionError> {
    let range = index_range_inclusive(session)?;
    set_ranges(session, range)?;
    Ok(range)
}

fn set_ranges(session: &mut Session, range: IndexRange) -> Result<(), SessionError> {
    session.set_grid_range(GRID, range)?;
    session.set_grid_range(POTENTIAL_GRID, range)?;
    Ok(())
}

/// Set the boundary condition of every face.
///
/// # Errors
///
/// Any remote failure.
pub fn set_boundary(session: &mut Session, boundaries: &Boundaries) -> Result<(), SessionError> {
    for (name, flag) in boundaries.flags() {
        set_int(session, "grid", name, flag)?;
    }
    Ok(())
}

/// Ratio of specific heats.
///
/// # Errors
///
/// Any remote failure.
pub fn set_gamma(session: &mut Session, gamma: f64) -> Result<(), SessionError> {
    set_float(session, "problem", "gamma", gamma)
}

/// Isothermal sound speed.
///
/// # Errors
///
/// Any remote failure.
pub fn set_isocsound(session: &mut Session, value: f64) -> Result<(), SessionError> {
    set_float(session, "problem", "iso_csound", value)
}

/// Courant-Friedrichs-Lewy number.
///
/// # Errors
///
/// Any remote failure.
pub fn set_courant_friedrichs_lewy_number(session: &mut Session, value: f64) -> Result<(), SessionError> {
    set_float(session, "time", "cour_no", value)
}

/// Number of MPI domains along each axis.
///
/// # Errors
///
/// Any remote failure.
pub fn set_parallel(session: &mut Session, domains: IVec3) -> Result<(), SessionError> {
    for (name, n) in ["NGrid_x1", "NGrid_x2", "NGrid_x3"].into_iter().zip(domains.to_array()) {
        set_int(session, "parallel", name, n)?;
    }
    Ok(())
}

/// Let the worker choose its own domain decomposition.
///
/// # Errors
///
/// Any remote failure.
pub fn set_auto_decomposition(session: &mut Session, enabled: bool) -> Result<(), SessionError> {
    set_int(session, "parallel", "auto", i32::from(enabled))
}

/// Fill the grid with a one-dimensional linear wave.
///
/// # Errors
///
/// Any remote failure.
pub fn fill_linear_wave(
    session: &mut Session,
    wave_flag: i32,
    amplitude: f64,
    vflow: f64,
    wave_dir: i32,
) -> Result<(), SessionError> {
    session.call(
        "fill_grid_linearwave_1d",
        &[
            Value::from(wave_flag),
            Value::from(amplitude),
            Value::from(vflow),
            Value::from(wave_dir),
        ],
    )?;
    Ok(())
}

/// Model time.
///
/// # Errors
///
/// Any remote failure.
pub fn model_time(session: &mut Session) -> Result<UnitValue, SessionError> {
    let output = session.call("get_time", &[])?;
    output
        .output(0)
        .and_then(Value::as_quantity)
        .cloned()
        .ok_or_else(|| SessionError::Protocol("get_time returned no quantity".to_string()))
}
