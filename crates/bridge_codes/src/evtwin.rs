//! EVtwin, a stellar evolution code.
//!
//! Stars are created from a zero-age main-sequence mass, a pre-main-sequence
//! mass or a saved model file, and evolve one at a time. The code has no
//! model-wide evolve; use [`evolve_one_step`] and [`evolve_for`].

use bridge_session::{
    CodeDefinition, EntitySetDefinition, Hooks, LifecycleState, ParameterDescriptor, Session,
    SessionError,
};
use bridge_spec::{
    EntityHandle, FunctionSpecBuilder, FunctionTable, RemoteFunctionSpec, ScalarType, SpecError,
    Value,
};
use bridge_units::{Unit, UnitValue, si};
use bridge_worker::MemoryKernel;

/// Code name.
pub const NAME: &str = "evtwin";
/// Worker binary.
pub const WORKER: &str = "evtwin_worker";
/// Handle parameter of the star set.
pub const STAR_HANDLE: &str = "index_of_the_star";
/// Name of the star set.
pub const PARTICLES: &str = "particles";
/// Default `path_to_data`, relative to the worker's working directory.
pub const DEFAULT_DATA_PATH: &str = "data/evtwin/input";

const STAR_GETTERS: [(&str, &str, Option<fn() -> Unit>, ScalarType); 9] = [
    ("get_mass", "mass", Some(si::msun), ScalarType::Float64),
    ("get_radius", "radius", Some(si::rsun), ScalarType::Float64),
    ("get_stellar_type", "stellar_type", None, ScalarType::Int32),
    ("get_age", "age", Some(si::yr), ScalarType::Float64),
    ("get_time_step", "time_step", Some(si::yr), ScalarType::Float64),
    ("get_spin", "spin", Some(si::day), ScalarType::Float64),
    ("get_luminosity", "luminosity", Some(si::lsun), ScalarType::Float64),
    ("get_temperature", "temperature", Some(si::kelvin), ScalarType::Float64),
    ("get_wind_multiplier", "wind_multiplier", None, ScalarType::Float64),
];

/// Unit of the wind and mass transfer rates.
#[must_use]
pub fn mass_loss_rate() -> Unit {
    (si::msun() / si::yr()).named("MSun/yr")
}

fn star_function(name: &str) -> FunctionSpecBuilder {
    RemoteFunctionSpec::builder(name)
        .input(STAR_HANDLE, ScalarType::Int32)
        .can_handle_array()
        .returns_error_code()
}

fn constructor(name: &str, input: &str, ty: ScalarType, unit: Option<Unit>) -> FunctionSpecBuilder {
    let builder = RemoteFunctionSpec::builder(name).output(STAR_HANDLE, ScalarType::Int32);
    let builder = match unit {
        Some(unit) => builder.input_with_unit(input, ty, unit),
        None => builder.input(input, ty),
    };
    builder.can_handle_array().returns_error_code()
}

fn accessor(
    name: &str,
    value: &str,
    ty: ScalarType,
    unit: Option<Unit>,
    setter: bool,
) -> Result<RemoteFunctionSpec, SpecError> {
    let builder = RemoteFunctionSpec::builder(name);
    let builder = match (setter, unit) {
        (false, Some(unit)) => builder.output_with_unit(value, ty, unit),
        (false, None) => builder.output(value, ty),
        (true, Some(unit)) => builder.input_with_unit(value, ty, unit),
        (true, None) => builder.input(value, ty),
    };
    builder.returns_error_code().build()
}

/// Every function of the EVtwin worker.
///
/// # Errors
///
/// Returns [`SpecError`] if a declaration is rejected.
pub fn function_table() -> Result<FunctionTable, SpecError> {
    let mut specs = vec![
        RemoteFunctionSpec::builder("initialize_code").returns_error_code().build()?,
        RemoteFunctionSpec::builder("commit_parameters").returns_error_code().build()?,
        RemoteFunctionSpec::builder("recommit_parameters").returns_error_code().build()?,
        RemoteFunctionSpec::builder("commit_particles").returns_error_code().build()?,
        RemoteFunctionSpec::builder("recommit_particles").returns_error_code().build()?,
        RemoteFunctionSpec::builder("cleanup_code").returns_error_code().build()?,
        constructor("new_zams_star", "mass", ScalarType::Float64, Some(si::msun()))
            .describe("Create a zero-age main-sequence star.")
            .build()?,
        constructor("new_prems_star", "mass", ScalarType::Float64, Some(si::msun()))
            .describe("Create a pre-main-sequence star.")
            .build()?,
        constructor("new_star_from_file", "filename", ScalarType::String, None)
            .describe("Load a star from a saved model file.")
            .build()?,
        star_function("delete_star").build()?,
        star_function("evolve_one_step").build()?,
        star_function("evolve_for")
            .input_with_unit("delta_t", ScalarType::Float64, si::yr())
            .build()?,
        star_function("write_star_to_file")
            .input("filename", ScalarType::String)
            .build()?,
        star_function("set_wind_multiplier")
            .input("wind_multiplier", ScalarType::Float64)
            .build()?,
        star_function("get_wind_mass_loss_rate")
            .output_with_unit("value", ScalarType::Float64, mass_loss_rate())
            .build()?,
        star_function("get_manual_mass_transfer_rate")
            .output_with_unit("mass_change", ScalarType::Float64, mass_loss_rate())
            .describe("User-set mass transfer rate: negative for winds, positive for accretion.")
            .build()?,
        star_function("set_manual_mass_transfer_rate")
            .input_with_unit("mass_change", ScalarType::Float64, mass_loss_rate())
            .build()?,
    ];
    for (function, value, unit, ty) in STAR_GETTERS {
        let builder = star_function(function);
        let builder = match unit {
            Some(unit) => builder.output_with_unit(value, ty, unit()),
            None => builder.output(value, ty),
        };
        specs.push(builder.build()?);
    }

    specs.extend(parameter_functions()?);
    let mut table = FunctionTable::new();
    table.register_all(specs)?;
    Ok(table)
}

fn parameter_functions() -> Result<Vec<RemoteFunctionSpec>, SpecError> {
    let mut specs = vec![
        accessor("get_verbosity", "verbosity", ScalarType::Int32, None, false)?,
        accessor("set_verbosity", "verbosity", ScalarType::Int32, None, true)?,
        accessor("set_ev_path", "path", ScalarType::String, None, true)?,
    ];
    let numeric: [(&str, &str, ScalarType, Option<Unit>); 11] = [
        ("maximum_number_of_stars", "maximum_number_of_stars", ScalarType::Int32, None),
        ("metallicity", "metallicity", ScalarType::Float64, None),
        ("max_age_stop_condition", "max_age_stop_condition", ScalarType::Float64, Some(si::yr())),
        ("min_timestep_stop_condition", "min_timestep", ScalarType::Float64, Some(si::s())),
        ("number_of_ionization_elements", "number_of_ionization_elements", ScalarType::Int32, None),
        ("convective_overshoot_parameter", "convective_overshoot_parameter", ScalarType::Float64, None),
        ("mixing_length_ratio", "mixing_length_ratio", ScalarType::Float64, None),
        ("semi_convection_efficiency", "semi_convection_efficiency", ScalarType::Float64, None),
        ("thermohaline_efficiency", "thermohaline_mixing_parameter", ScalarType::Float64, None),
        ("AGB_wind_setting", "value", ScalarType::Int32, None),
        ("RGB_wind_setting", "value", ScalarType::Float64, None),
    ];
    for (suffix, value, ty, unit) in numeric {
        specs.push(accessor(&format!("get_{suffix}"), value, ty, unit.clone(), false)?);
        specs.push(accessor(&format!("set_{suffix}"), value, ty, unit, true)?);
    }
    specs.push(accessor("get_Ostar_wind_setting", "value", ScalarType::Float64, None, false)?);
    specs.push(accessor("set_Ostar_wind_setting", "value", ScalarType::Float64, None, true)?);
    Ok(specs)
}

fn parameters() -> Vec<ParameterDescriptor> {
    let method = |name: &str, default: Value| {
        ParameterDescriptor::method(name, format!("get_{name}"), format!("set_{name}"), default)
    };
    vec![
        ParameterDescriptor::boolean("verbosity", "get_verbosity", "set_verbosity", false)
            .describe("Print progress of the stellar evolution."),
        method("maximum_number_of_stars", Value::from(10))
            .describe("Maximum number of stars that can be allocated."),
        method("metallicity", Value::from(0.02)).describe("Metallicity of all stars."),
        ParameterDescriptor::write_only("path_to_data", "set_ev_path", DEFAULT_DATA_PATH)
            .describe("Directory holding the EVtwin input data."),
        method(
            "max_age_stop_condition",
            Value::from(UnitValue::scalar(1.0e12, si::yr())),
        )
        .describe("Stars stop evolving past this age.")
        .runtime_mutable(),
        method(
            "min_timestep_stop_condition",
            Value::from(UnitValue::scalar(1.0e6, si::s())),
        )
        .describe("Stars stop evolving once their time step drops below this.")
        .runtime_mutable(),
        method("number_of_ionization_elements", Value::from(2))
            .describe("Number of elements whose ionization is solved."),
        method("convective_overshoot_parameter", Value::from(0.12))
            .describe("Convective overshoot parameter."),
        method("mixing_length_ratio", Value::from(2.0))
            .describe("Mixing length over pressure scale height."),
        method("semi_convection_efficiency", Value::from(0.04))
            .describe("Efficiency of semi-convection."),
        method("thermohaline_efficiency", Value::from(1.0))
            .describe("Efficiency of thermohaline mixing."),
        method("AGB_wind_setting", Value::from(1))
            .describe("AGB wind prescription: 1 Wachter et al., 2 Vassiliadis and Wood."),
        method("RGB_wind_setting", Value::from(1.0))
            .describe("RGB wind: positive for Schroeder and Cuntz, negative for Reimers."),
        ParameterDescriptor::method(
            "OB_wind_setting",
            "get_Ostar_wind_setting",
            "set_Ostar_wind_setting",
            1.0,
        )
        .describe("Multiplier for the Vink et al. O-star wind."),
    ]
}

/// The star set: three constructors, per-star getters, and a wind
/// multiplier and manual mass transfer rate that can change while running.
#[must_use]
pub fn particles() -> EntitySetDefinition {
    let mut set = EntitySetDefinition::new(PARTICLES, STAR_HANDLE)
        .constructor("new_zams_star")
        .constructor("new_prems_star")
        .constructor("new_star_from_file")
        .destructor("delete_star")
        .runtime_setter("set_wind_multiplier", ["wind_multiplier"])
        .getter("get_wind_mass_loss_rate", ["wind_mass_loss_rate"])
        .runtime_setter("set_manual_mass_transfer_rate", ["manual_mass_transfer_rate"])
        .getter("get_manual_mass_transfer_rate", ["manual_mass_transfer_rate"])
        .creatable_in_update();
    for (function, name, _, _) in STAR_GETTERS {
        set = set.getter(function, [name]);
    }
    set
}

/// The EVtwin code definition.
///
/// # Errors
///
/// Returns [`SpecError`] if a declaration is rejected.
pub fn definition() -> Result<CodeDefinition, SpecError> {
    let mut definition = CodeDefinition::new(NAME, function_table()?)
        .worker(WORKER)
        .entity_set(particles())
        .hooks(Hooks {
            evolve: None,
            ..Hooks::default()
        })
        .window("evolve_one_step", [LifecycleState::Run])
        .window("evolve_for", [LifecycleState::Run]);
    for descriptor in parameters() {
        definition = definition.parameter(descriptor);
    }
    Ok(definition)
}

/// A [`MemoryKernel`] bound to the EVtwin functions.
#[must_use]
pub fn memory_kernel() -> MemoryKernel {
    let mut kernel = MemoryKernel::new()
        .entity_constructor("new_zams_star", PARTICLES)
        .entity_constructor("new_prems_star", PARTICLES)
        .entity_constructor("new_star_from_file", PARTICLES)
        .entity_destructor("delete_star", PARTICLES)
        .entity_setter("set_wind_multiplier", PARTICLES)
        .entity_getter("get_wind_mass_loss_rate", PARTICLES)
        .entity_setter("set_manual_mass_transfer_rate", PARTICLES)
        .entity_getter("get_manual_mass_transfer_rate", PARTICLES)
        .parameter_getter("get_verbosity", "verbosity")
        .parameter_setter("set_verbosity", "verbosity")
        .parameter_setter("set_ev_path", "path_to_data")
        .parameter_getter("get_Ostar_wind_setting", "OB_wind_setting")
        .parameter_setter("set_Ostar_wind_setting", "OB_wind_setting");
    for (function, _, _, _) in STAR_GETTERS {
        kernel = kernel.entity_getter(function, PARTICLES);
    }
    for descriptor in parameters() {
        let name = descriptor.name();
        if matches!(name, "verbosity" | "path_to_data" | "OB_wind_setting") {
            continue;
        }
        kernel = kernel
            .parameter_getter(format!("get_{name}"), name)
            .parameter_setter(format!("set_{name}"), name);
    }
    kernel
}

/// Evolve each star by one internal time step.
///
/// # Errors
///
/// [`SessionError::IllegalStateTransition`] outside RUN, or any remote
/// failure.
pub fn evolve_one_step(session: &mut Session, stars: &[EntityHandle]) -> Result<(), SessionError> {
    session.call("evolve_one_step", &[Value::handles(stars)])?;
    Ok(())
}

/// Evolve each star for `delta_t`. A scalar `delta_t` applies to every
/// star.
///
/// # Errors
///
/// Same as [`evolve_one_step`]; a `delta_t` that is not a time is a codec
/// error.
pub fn evolve_for(
    session: &mut Session,
    stars: &[EntityHandle],
    delta_t: &UnitValue,
) -> Result<(), SessionError> {
    let delta_t = match delta_t.as_scalar() {
        Some(dt) => UnitValue::sequence(vec![dt; stars.len()], delta_t.unit().clone()),
        None => delta_t.clone(),
    };
    session.call("evolve_for", &[Value::handles(stars), Value::from(delta_t)])?;
    Ok(())
}

/// Save each star's model to `filename`.
///
/// # Errors
///
/// Any remote failure.
pub fn write_star_to_file(
    session: &mut Session,
    star: EntityHandle,
    filename: &str,
) -> Result<(), SessionError> {
    session.call("write_star_to_file", &[Value::from(star.id()), Value::from(filename)])?;
    Ok(())
}
