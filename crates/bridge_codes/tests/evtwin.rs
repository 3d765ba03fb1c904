use std::sync::Arc;

use bridge_codes::evtwin;
use bridge_session::{LifecycleState, Session, SessionError};
use bridge_spec::{Column, Scalar, Value};
use bridge_units::{UnitValue, si};
use bridge_worker::{LoopbackTransport, MemoryKernel};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn session() -> (Session, MemoryKernel) {
    init_tracing();
    let definition = evtwin::definition().unwrap();
    let kernel = evtwin::memory_kernel();
    let transport = LoopbackTransport::new(Arc::clone(&definition.functions), kernel.clone());
    let session = Session::new(&definition, Box::new(transport)).unwrap();
    (session, kernel)
}

fn masses(values: Vec<f64>) -> Value {
    Value::from(UnitValue::sequence(values, si::msun()))
}

#[test]
fn test_cached_parameter_sent_after_defaults() {
    let (mut session, kernel) = session();
    session.set_parameter("metallicity", 0.001).unwrap();
    session.initialize().unwrap();
    session.commit().unwrap();

    let log = kernel.call_log();
    let position = |name: &str| log.iter().position(|f| f == name).unwrap();
    assert!(position("set_ev_path") < position("set_metallicity"));
    assert!(position("set_Ostar_wind_setting") < position("set_metallicity"));
    assert!(position("set_metallicity") < position("commit_parameters"));
    assert_eq!(kernel.calls_to("set_metallicity"), 1);
    assert_eq!(kernel.parameter("metallicity"), Some(Scalar::Float64(0.001)));
    assert_eq!(
        kernel.parameter("path_to_data"),
        Some(Scalar::String(evtwin::DEFAULT_DATA_PATH.to_string()))
    );
}

#[test]
fn test_stars_from_every_constructor() {
    let (mut session, _) = session();
    session.initialize().unwrap();
    let zams = session.create("particles", &[masses(vec![1.0, 2.0])]).unwrap();
    let prems = session
        .create_with("particles", "new_prems_star", &[masses(vec![0.8])])
        .unwrap();
    let loaded = session
        .create_with("particles", "new_star_from_file", &[Value::from("star.dat")])
        .unwrap();
    assert_eq!(zams.len() + prems.len() + loaded.len(), 4);
    session.commit().unwrap();

    let mut handles = zams.clone();
    handles.extend(&prems);
    let values = session.get("particles", &handles, &["mass"]).unwrap();
    let mass = values[0].as_quantity().unwrap();
    assert_eq!(mass.unit().symbol(), "MSun");
    assert_eq!(mass.magnitude().to_vec(), vec![1.0, 2.0, 0.8]);
    assert_eq!(
        session.cached("particles", zams[1], "mass"),
        Some(&Value::from(UnitValue::scalar(2.0, si::msun())))
    );
}

#[test]
fn test_no_model_wide_evolve() {
    let (mut session, kernel) = session();
    session.initialize().unwrap();
    let stars = session.create("particles", &[masses(vec![1.0, 1.5])]).unwrap();
    session.commit().unwrap();

    assert!(matches!(
        session.evolve(UnitValue::scalar(1.0, si::myr())),
        Err(SessionError::UnknownFunction(_))
    ));
    evtwin::evolve_one_step(&mut session, &stars).unwrap();
    evtwin::evolve_for(&mut session, &stars, &UnitValue::scalar(250.0, si::yr())).unwrap();

    let call = kernel
        .calls()
        .into_iter()
        .find(|c| c.function == "evolve_for")
        .unwrap();
    assert_eq!(call.rows, 2);
    assert_eq!(call.inputs[1], Column::Float64(vec![250.0, 250.0]));
}

#[test]
fn test_evolve_only_in_run() {
    let (mut session, _) = session();
    session.initialize().unwrap();
    let stars = session.create("particles", &[masses(vec![1.0])]).unwrap();
    assert!(matches!(
        evtwin::evolve_one_step(&mut session, &stars),
        Err(SessionError::IllegalStateTransition { .. })
    ));
}

#[test]
fn test_runtime_mutable_settings() {
    let (mut session, kernel) = session();
    session.initialize().unwrap();
    let stars = session.create("particles", &[masses(vec![1.0])]).unwrap();
    session.commit().unwrap();
    assert_eq!(session.state(), LifecycleState::Run);

    session
        .set_parameter("max_age_stop_condition", UnitValue::scalar(1.0e9, si::yr()))
        .unwrap();
    assert_eq!(kernel.parameter("max_age_stop_condition"), Some(Scalar::Float64(1.0e9)));
    assert!(matches!(
        session.set_parameter("metallicity", 0.03),
        Err(SessionError::ParameterLocked { .. })
    ));

    session
        .set("particles", &stars, &["wind_multiplier"], &[Value::from(vec![0.5])])
        .unwrap();
    assert_eq!(
        session.get_one("particles", stars[0], "wind_multiplier").unwrap(),
        Value::from(0.5)
    );
}

#[test]
fn test_boolean_and_write_only_parameters() {
    let (mut session, kernel) = session();
    session.set_parameter("verbosity", true).unwrap();
    session.initialize().unwrap();
    session.commit().unwrap();

    assert_eq!(kernel.parameter("verbosity"), Some(Scalar::Int32(1)));
    assert_eq!(session.get_parameter("verbosity").unwrap(), Value::from(true));
    assert_eq!(
        session.get_parameter("path_to_data").unwrap(),
        Value::from(evtwin::DEFAULT_DATA_PATH)
    );
    assert_eq!(kernel.calls_to("get_verbosity"), 1);
}

#[test]
fn test_create_in_update() {
    let (mut session, kernel) = session();
    session.initialize().unwrap();
    session.create("particles", &[masses(vec![1.0])]).unwrap();
    session.commit().unwrap();

    assert!(session.create("particles", &[masses(vec![3.0])]).is_err());
    session.edit().unwrap();
    let added = session.create("particles", &[masses(vec![3.0])]).unwrap();
    session.recommit().unwrap();

    assert_eq!(session.handles("particles").unwrap().len(), 2);
    assert_eq!(kernel.entity_count("particles"), 2);
    assert_eq!(
        kernel.call_log()[kernel.call_log().len() - 2..],
        ["recommit_parameters".to_string(), "recommit_particles".to_string()]
    );
    assert!(session.handles("particles").unwrap().contains(&added[0]));
}

#[test]
fn test_wind_mass_loss_rate_unit() {
    let (mut session, _) = session();
    session.initialize().unwrap();
    let stars = session.create("particles", &[masses(vec![20.0])]).unwrap();
    session.commit().unwrap();

    let rate = session
        .get_one("particles", stars[0], "wind_mass_loss_rate")
        .unwrap();
    let rate = rate.as_quantity().unwrap();
    assert_eq!(rate.unit().symbol(), "MSun/yr");
    assert_eq!(rate.as_scalar(), Some(0.0));
}

#[test]
fn test_cleanup_stops_worker() {
    let (mut session, kernel) = session();
    session.initialize().unwrap();
    session.cleanup().unwrap();
    assert!(session.is_stopped());
    assert!(kernel.is_stopped());
    assert!(session.get_parameter("metallicity").is_err());
}

#[test]
fn test_manual_mass_transfer_rate_while_running() {
    let (mut session, kernel) = session();
    session.initialize().unwrap();
    let stars = session.create("particles", &[masses(vec![1.0, 3.0])]).unwrap();
    session.commit().unwrap();

    let rate = evtwin::mass_loss_rate();
    session
        .set(
            "particles",
            &stars,
            &["manual_mass_transfer_rate"],
            &[Value::from(UnitValue::sequence(vec![-1.0e-6, 2.0e-7], rate))],
        )
        .unwrap();
    assert_eq!(
        kernel.attribute("particles", stars[1], "mass_change"),
        Some(Scalar::Float64(2.0e-7))
    );

    let read = session
        .get("particles", &stars, &["manual_mass_transfer_rate"])
        .unwrap();
    let read = read[0].as_quantity().unwrap();
    assert_eq!(read.unit().symbol(), "MSun/yr");
    assert_eq!(read.magnitude().to_vec(), vec![-1.0e-6, 2.0e-7]);

    assert!(matches!(
        session.set(
            "particles",
            &stars[..1],
            &["manual_mass_transfer_rate"],
            &[masses(vec![1.0])],
        ),
        Err(SessionError::Codec(_))
    ));
}

#[test]
fn test_deleted_star_is_gone() {
    let (mut session, kernel) = session();
    session.initialize().unwrap();
    let stars = session
        .create("particles", &[masses(vec![1.0, 2.0, 3.0])])
        .unwrap();
    assert_eq!(stars.iter().map(|h| h.id()).collect::<Vec<_>>(), vec![1, 2, 3]);
    session.commit().unwrap();

    let mass = session.get("particles", &stars, &["mass"]).unwrap();
    let mass = mass[0].as_quantity().unwrap();
    assert_eq!(mass.unit().symbol(), "MSun");
    assert_eq!(mass.magnitude().to_vec(), vec![1.0, 2.0, 3.0]);

    assert!(matches!(
        session.set_parameter("metallicity", 0.01),
        Err(SessionError::ParameterLocked { .. })
    ));

    session.edit().unwrap();
    let removed = stars[1];
    session.delete("particles", &[removed]).unwrap();
    assert_eq!(session.handles("particles").unwrap(), vec![stars[0], stars[2]]);
    assert_eq!(kernel.entity_count("particles"), 2);

    let invalid = |result: Result<_, SessionError>| {
        matches!(result, Err(SessionError::InvalidHandle { handle, .. }) if handle == removed)
    };
    assert!(invalid(session.get("particles", &[removed], &["mass"]).map(drop)));
    assert!(invalid(session.get_one("particles", removed, "mass").map(drop)));
    assert!(invalid(session.set(
        "particles",
        &[removed],
        &["wind_multiplier"],
        &[Value::from(vec![0.5])],
    )));
    assert!(invalid(session.delete("particles", &[removed])));
    assert_eq!(kernel.calls_to("delete_star"), 1);
}
