//! Huayno, a hierarchically split n-body integrator.
//!
//! Huayno works in generic units (G = 1). Quantities are converted to and
//! from SI with an [`NbodyConverter`](bridge_units::NbodyConverter).

use std::fmt;
use std::str::FromStr;

use bridge_session::{
    CallOutput, CodeDefinition, EntitySetDefinition, LifecycleState, ParameterDescriptor, Session,
    SessionError,
};
use bridge_spec::{
    FunctionSpecBuilder, FunctionTable, RemoteFunctionSpec, ScalarType, SpecError, Value,
};
use bridge_units::{Unit, UnitValue, generic};
use bridge_worker::MemoryKernel;

use crate::error::CodeError;

/// Code name.
pub const NAME: &str = "huayno";
/// Handle parameter of the particle set.
pub const PARTICLE_HANDLE: &str = "index_of_the_particle";
/// Name of the particle set.
pub const PARTICLES: &str = "particles";

/// Build flavour of the worker binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Plain CPU build.
    #[default]
    Cpu,
    /// OpenCL build.
    OpenCl,
    /// OpenMP build.
    OpenMp,
}

impl Mode {
    /// Worker binary for this mode.
    #[must_use]
    pub fn worker_name(self) -> &'static str {
        match self {
            Self::Cpu => "huayno_worker",
            Self::OpenCl => "huayno_worker_cl",
            Self::OpenMp => "huayno_worker_mp",
        }
    }
}

impl FromStr for Mode {
    type Err = CodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" | "" => Ok(Self::Cpu),
            "opencl" => Ok(Self::OpenCl),
            "openmp" => Ok(Self::OpenMp),
            other => Err(CodeError::UnknownMode(other.to_string())),
        }
    }
}

/// Integration scheme, selected through `inttype_parameter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Integrator {
    Shared2,
    PassKdk,
    HoldKdk,
    BridgeKdk,
    Extrapolate,
    PassDkd,
    #[default]
    HoldDkd,
    PpassDkd,
    BridgeDkd,
    Cc,
    CcKepler,
    Ok,
    Shared4,
    Shared6,
    Shared8,
    Shared10,
    SharedBs,
}

impl Integrator {
    /// Every scheme, in code order.
    pub const ALL: [Self; 17] = [
        Self::Shared2,
        Self::PassKdk,
        Self::HoldKdk,
        Self::BridgeKdk,
        Self::Extrapolate,
        Self::PassDkd,
        Self::HoldDkd,
        Self::PpassDkd,
        Self::BridgeDkd,
        Self::Cc,
        Self::CcKepler,
        Self::Ok,
        Self::Shared4,
        Self::Shared6,
        Self::Shared8,
        Self::Shared10,
        Self::SharedBs,
    ];

    /// The worker's numeric code.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Shared2 => 1,
            Self::PassKdk => 2,
            Self::HoldKdk => 3,
            Self::BridgeKdk => 4,
            Self::Extrapolate => 5,
            Self::PassDkd => 7,
            Self::HoldDkd => 8,
            Self::PpassDkd => 9,
            Self::BridgeDkd => 10,
            Self::Cc => 11,
            Self::CcKepler => 12,
            Self::Ok => 13,
            Self::Shared4 => 15,
            Self::Shared6 => 18,
            Self::Shared8 => 19,
            Self::Shared10 => 20,
            Self::SharedBs => 21,
        }
    }

    /// The scheme with numeric code `code`.
    #[must_use]
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|i| i.code() == code)
    }

    /// Upper-case name, as the worker documents it.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Shared2 => "SHARED2",
            Self::PassKdk => "PASS_KDK",
            Self::HoldKdk => "HOLD_KDK",
            Self::BridgeKdk => "BRIDGE_KDK",
            Self::Extrapolate => "EXTRAPOLATE",
            Self::PassDkd => "PASS_DKD",
            Self::HoldDkd => "HOLD_DKD",
            Self::PpassDkd => "PPASS_DKD",
            Self::BridgeDkd => "BRIDGE_DKD",
            Self::Cc => "CC",
            Self::CcKepler => "CC_KEPLER",
            Self::Ok => "OK",
            Self::Shared4 => "SHARED4",
            Self::Shared6 => "SHARED6",
            Self::Shared8 => "SHARED8",
            Self::Shared10 => "SHARED10",
            Self::SharedBs => "SHAREDBS",
        }
    }
}

impl fmt::Display for Integrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Integrator {
    type Err = CodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|i| i.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| CodeError::UnknownIntegrator(s.to_string()))
    }
}

fn particle_function(name: &str) -> FunctionSpecBuilder {
    RemoteFunctionSpec::builder(name)
        .input(PARTICLE_HANDLE, ScalarType::Int32)
        .can_handle_array()
        .returns_error_code()
}

fn with_outputs(mut builder: FunctionSpecBuilder, names: &[&str], unit: &Unit) -> FunctionSpecBuilder {
    for name in names {
        builder = builder.output_with_unit(*name, ScalarType::Float64, unit.clone());
    }
    builder
}

fn with_inputs(mut builder: FunctionSpecBuilder, names: &[&str], unit: &Unit) -> FunctionSpecBuilder {
    for name in names {
        builder = builder.input_with_unit(*name, ScalarType::Float64, unit.clone());
    }
    builder
}

fn scalar_getter(name: &str, value: &str, ty: ScalarType, unit: Option<Unit>) -> FunctionSpecBuilder {
    let builder = RemoteFunctionSpec::builder(name);
    let builder = match unit {
        Some(unit) => builder.output_with_unit(value, ty, unit),
        None => builder.output(value, ty),
    };
    builder.returns_error_code()
}

fn scalar_setter(name: &str, value: &str, ty: ScalarType, unit: Option<Unit>) -> FunctionSpecBuilder {
    let builder = RemoteFunctionSpec::builder(name);
    let builder = match unit {
        Some(unit) => builder.input_with_unit(value, ty, unit),
        None => builder.input(value, ty),
    };
    builder.returns_error_code()
}

const POSITION: [&str; 3] = ["x", "y", "z"];
const VELOCITY: [&str; 3] = ["vx", "vy", "vz"];

/// `(parameter, getter/setter suffix, wire name, type, unit)` of each
/// method parameter.
fn parameter_table() -> [(&'static str, &'static str, &'static str, ScalarType, Option<Unit>); 5] {
    [
        ("epsilon_squared", "eps2_parameter", "eps2", ScalarType::Float64, Some(generic::length().powi(2))),
        ("timestep_parameter", "timestep_parameter", "time_param", ScalarType::Float64, None),
        ("timestep", "timestep", "timestep", ScalarType::Float64, Some(generic::time())),
        ("inttype_parameter", "inttype_parameter", "inttype", ScalarType::Int32, None),
        ("begin_time", "begin_time", "time", ScalarType::Float64, Some(generic::time())),
    ]
}

/// Every function of the Huayno worker.
///
/// # Errors
///
/// Returns [`SpecError`] if a declaration is rejected.
pub fn function_table() -> Result<FunctionTable, SpecError> {
    let mass = generic::mass();
    let length = generic::length();
    let speed = generic::speed();

    let mut specs = Vec::new();
    for hook in [
        "initialize_code",
        "commit_parameters",
        "recommit_parameters",
        "commit_particles",
        "recommit_particles",
        "synchronize_model",
        "cleanup_code",
    ] {
        specs.push(RemoteFunctionSpec::builder(hook).returns_error_code().build()?);
    }

    let new_particle = RemoteFunctionSpec::builder("new_particle")
        .output(PARTICLE_HANDLE, ScalarType::Int32)
        .input_with_unit("mass", ScalarType::Float64, mass.clone());
    let new_particle = with_inputs(new_particle, &POSITION, &length);
    let new_particle = with_inputs(new_particle, &VELOCITY, &speed)
        .input_with_unit("radius", ScalarType::Float64, length.clone())
        .can_handle_array()
        .returns_error_code();
    specs.push(new_particle.build()?);
    specs.push(particle_function("delete_particle").build()?);

    specs.push(with_outputs(particle_function("get_mass"), &["mass"], &mass).build()?);
    specs.push(with_inputs(particle_function("set_mass"), &["mass"], &mass).build()?);
    specs.push(with_outputs(particle_function("get_radius"), &["radius"], &length).build()?);
    specs.push(with_inputs(particle_function("set_radius"), &["radius"], &length).build()?);
    specs.push(with_outputs(particle_function("get_position"), &POSITION, &length).build()?);
    specs.push(with_inputs(particle_function("set_position"), &POSITION, &length).build()?);
    specs.push(with_outputs(particle_function("get_velocity"), &VELOCITY, &speed).build()?);
    specs.push(with_inputs(particle_function("set_velocity"), &VELOCITY, &speed).build()?);

    specs.push(
        RemoteFunctionSpec::builder("evolve_model")
            .input_with_unit("time_end", ScalarType::Float64, generic::time())
            .returns_error_code()
            .build()?,
    );
    specs.push(scalar_getter("get_time", "time", ScalarType::Float64, Some(generic::time())).build()?);
    specs.push(
        scalar_getter("get_kinetic_energy", "kinetic_energy", ScalarType::Float64, Some(generic::energy()))
            .build()?,
    );
    specs.push(
        scalar_getter("get_potential_energy", "potential_energy", ScalarType::Float64, Some(generic::energy()))
            .build()?,
    );
    specs.push(scalar_getter("get_number_of_particles", "number_of_particles", ScalarType::Int32, None).build()?);

    for (_, suffix, wire, ty, unit) in parameter_table() {
        specs.push(scalar_getter(&format!("get_{suffix}"), wire, ty, unit.clone()).build()?);
        specs.push(scalar_setter(&format!("set_{suffix}"), wire, ty, unit).build()?);
    }

    let mut table = FunctionTable::new();
    table.register_all(specs)?;
    Ok(table)
}

fn parameters() -> Vec<ParameterDescriptor> {
    parameter_table()
        .into_iter()
        .map(|(name, suffix, _, _, unit)| {
            let getter = format!("get_{suffix}");
            let setter = format!("set_{suffix}");
            let descriptor = match (name, unit) {
                ("inttype_parameter", _) => {
                    ParameterDescriptor::method(name, getter, setter, Integrator::default().code())
                }
                ("timestep_parameter", _) => ParameterDescriptor::method(name, getter, setter, 0.03),
                (_, Some(unit)) => {
                    ParameterDescriptor::method(name, getter, setter, UnitValue::scalar(0.0, unit))
                }
                (_, None) => ParameterDescriptor::method(name, getter, setter, 0.0),
            };
            descriptor.describe(match name {
                "epsilon_squared" => "Smoothing parameter for gravity calculations.",
                "timestep_parameter" => "Accuracy parameter of the time step criterion.",
                "timestep" => "Time step for the fixed-step integrators.",
                "inttype_parameter" => "Integration scheme; see Integrator.",
                _ => "Model time to start the simulation at.",
            })
        })
        .collect()
}

/// The gravitational-dynamics particle set.
#[must_use]
pub fn particles() -> EntitySetDefinition {
    EntitySetDefinition::new(PARTICLES, PARTICLE_HANDLE)
        .constructor("new_particle")
        .destructor("delete_particle")
        .getter("get_mass", ["mass"])
        .setter("set_mass", ["mass"])
        .getter("get_radius", ["radius"])
        .setter("set_radius", ["radius"])
        .getter("get_position", POSITION)
        .setter("set_position", POSITION)
        .getter("get_velocity", VELOCITY)
        .setter("set_velocity", VELOCITY)
}

/// The Huayno code definition for a worker built in `mode`.
///
/// # Errors
///
/// Returns [`SpecError`] if a declaration is rejected.
pub fn definition(mode: Mode) -> Result<CodeDefinition, SpecError> {
    let mut definition = CodeDefinition::new(NAME, function_table()?)
        .worker(mode.worker_name())
        .entity_set(particles())
        .window("get_kinetic_energy", [LifecycleState::Run])
        .window("get_potential_energy", [LifecycleState::Run]);
    for descriptor in parameters() {
        definition = definition.parameter(descriptor);
    }
    Ok(definition)
}

/// A [`MemoryKernel`] bound to the Huayno functions.
#[must_use]
pub fn memory_kernel() -> MemoryKernel {
    let mut kernel = MemoryKernel::new()
        .entity_constructor("new_particle", PARTICLES)
        .entity_destructor("delete_particle", PARTICLES)
        .parameter_setter("evolve_model", "model_time")
        .parameter_getter("get_time", "model_time");
    for attribute in ["mass", "radius", "position", "velocity"] {
        kernel = kernel
            .entity_getter(format!("get_{attribute}"), PARTICLES)
            .entity_setter(format!("set_{attribute}"), PARTICLES);
    }
    for (name, suffix, _, _, _) in parameter_table() {
        kernel = kernel
            .parameter_getter(format!("get_{suffix}"), name)
            .parameter_setter(format!("set_{suffix}"), name);
    }
    kernel
}

/// Model time.
///
/// # Errors
///
/// Any remote failure.
pub fn model_time(session: &mut Session) -> Result<UnitValue, SessionError> {
    let output = session.call("get_time", &[])?;
    quantity(&output, "get_time")
}

/// Kinetic and potential energy. Legal only in RUN.
///
/// # Errors
///
/// [`SessionError::IllegalStateTransition`] outside RUN, or any remote
/// failure.
pub fn energies(session: &mut Session) -> Result<(UnitValue, UnitValue), SessionError> {
    let kinetic = session.call("get_kinetic_energy", &[])?;
    let potential = session.call("get_potential_energy", &[])?;
    Ok((
        quantity(&kinetic, "get_kinetic_energy")?,
        quantity(&potential, "get_potential_energy")?,
    ))
}

/// Select the integration scheme.
///
/// # Errors
///
/// Same as [`Session::set_parameter`].
pub fn set_integrator(session: &mut Session, integrator: Integrator) -> Result<(), SessionError> {
    session.set_parameter("inttype_parameter", integrator.code())
}

fn quantity(output: &CallOutput, function: &str) -> Result<UnitValue, SessionError> {
    output
        .output(0)
        .and_then(Value::as_quantity)
        .cloned()
        .ok_or_else(|| SessionError::Protocol(format!("'{function}' returned no quantity")))
}
