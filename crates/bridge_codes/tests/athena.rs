use std::sync::Arc;

use bridge_codes::athena::{self, Boundaries, Boundary, Mesh};
use bridge_session::{IndexRange, Session, SessionError};
use bridge_spec::{Scalar, Value};
use bridge_units::{UnitValue, generic};
use bridge_worker::{LoopbackTransport, MemoryKernel};
use glam::{DVec3, IVec3};
use tracing_subscriber::EnvFilter;

const MESH: Mesh = Mesh::new(IVec3::new(4, 4, 1), DVec3::ONE);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn session() -> (Session, MemoryKernel) {
    init_tracing();
    let definition = athena::definition().unwrap();
    let kernel = athena::memory_kernel(&MESH);
    let transport = LoopbackTransport::new(Arc::clone(&definition.functions), kernel.clone());
    let session = Session::new(&definition, Box::new(transport)).unwrap();
    (session, kernel)
}

fn running() -> (Session, MemoryKernel) {
    let (mut session, kernel) = session();
    session.initialize().unwrap();
    athena::setup_mesh(&mut session, &MESH).unwrap();
    athena::set_boundary(&mut session, &Boundaries::all(Boundary::Periodic)).unwrap();
    athena::set_gamma(&mut session, 5.0 / 3.0).unwrap();
    session.commit().unwrap();
    (session, kernel)
}

#[test]
fn test_mesh_parameters_reach_worker() {
    let (mut session, kernel) = running();
    assert_eq!(kernel.parameter("grid.Nx1"), Some(Scalar::Int32(4)));
    assert_eq!(kernel.parameter("grid.Nx3"), Some(Scalar::Int32(1)));
    assert_eq!(kernel.parameter("grid.x2max"), Some(Scalar::Float64(1.0)));
    assert_eq!(kernel.parameter("problem.gamma"), Some(Scalar::Float64(5.0 / 3.0)));
    assert_eq!(athena::get_int(&mut session, "grid", "Nx2").unwrap(), 4);
    assert_eq!(athena::get_float(&mut session, "grid", "x1min").unwrap(), 0.0);
}

#[test]
fn test_outer_z_boundary_uses_its_own_setting() {
    let (mut session, kernel) = session();
    session.initialize().unwrap();
    let boundaries = Boundaries {
        z: (Boundary::Reflective, Boundary::Outflow),
        ..Boundaries::all(Boundary::Periodic)
    };
    athena::set_boundary(&mut session, &boundaries).unwrap();
    assert_eq!(kernel.parameter("grid.ibc_x1"), Some(Scalar::Int32(4)));
    assert_eq!(kernel.parameter("grid.ibc_x3"), Some(Scalar::Int32(1)));
    assert_eq!(kernel.parameter("grid.obc_x3"), Some(Scalar::Int32(2)));
}

#[test]
fn test_grid_initialized_after_parameters() {
    let (_, kernel) = running();
    let log = kernel.call_log();
    let position = |name: &str| log.iter().position(|f| f == name).unwrap();
    assert!(position("par_seti") < position("commit_parameters"));
    assert!(position("commit_parameters") < position("initialize_grid"));
    assert_eq!(kernel.calls_to("set_timestep"), 1);
}

#[test]
fn test_potential_grid_has_ghost_layer() {
    let (mut session, _) = running();
    assert_eq!(session.grid_shape(athena::GRID).unwrap(), IVec3::new(4, 4, 1));
    assert_eq!(session.grid_shape(athena::POTENTIAL_GRID).unwrap(), IVec3::new(6, 6, 3));
    let range = session.grid_range(athena::POTENTIAL_GRID).unwrap();
    assert_eq!(range.min, IVec3::splat(-1));
    assert_eq!(range.max, IVec3::new(4, 4, 1));

    let positions = session
        .grid_positions(athena::POTENTIAL_GRID, &[IVec3::splat(-1)])
        .unwrap();
    let x = positions[0].as_quantity().unwrap();
    assert_eq!(x.unit().symbol(), "length");
    assert_eq!(x.magnitude().to_vec(), vec![-0.125]);
}

#[test]
fn test_state_written_while_running() {
    let (mut session, kernel) = running();
    let cells = [IVec3::new(0, 0, 0), IVec3::new(3, 3, 0)];
    let momentum = generic::momentum();
    let values = vec![
        Value::from(UnitValue::sequence(vec![1.0, 2.0], generic::density())),
        Value::from(UnitValue::sequence(vec![0.1, 0.2], momentum.clone())),
        Value::from(UnitValue::sequence(vec![0.0, 0.0], momentum.clone())),
        Value::from(UnitValue::sequence(vec![0.0, 0.0], momentum)),
        Value::from(UnitValue::sequence(vec![3.0, 4.0], generic::energy())),
    ];
    session
        .grid_set(athena::GRID, &cells, &athena::STATE_ATTRIBUTES, &values)
        .unwrap();
    assert_eq!(kernel.cell(athena::GRID, [3, 3, 0], "rho"), Some(Scalar::Float64(2.0)));
    assert_eq!(kernel.cell(athena::GRID, [0, 0, 0], "en"), Some(Scalar::Float64(3.0)));

    let read = session.grid_get(athena::GRID, &cells, &["rho", "energy"]).unwrap();
    let rho = read[0].as_quantity().unwrap();
    assert_eq!(rho.unit().symbol(), "density");
    assert_eq!(rho.magnitude().to_vec(), vec![1.0, 2.0]);
    assert_eq!(read[1].as_quantity().unwrap().magnitude().to_vec(), vec![3.0, 4.0]);

    assert!(matches!(
        session.grid_set(athena::GRID, &cells, &["rho"], &values[..1]),
        Err(SessionError::ArityMismatch(_))
    ));
}

#[test]
fn test_index_outside_mesh_rejected() {
    let (mut session, _) = running();
    let err = session
        .grid_get_one(athena::GRID, IVec3::new(4, 0, 0), "rho")
        .unwrap_err();
    assert!(matches!(err, SessionError::IndexOutOfRange { .. }));
    assert!(
        session
            .grid_get_one(athena::POTENTIAL_GRID, IVec3::new(4, 0, 0), "potential")
            .is_ok()
    );
}

#[test]
fn test_evolve_and_sync_ranges() {
    let (mut session, _) = running();
    session
        .evolve(UnitValue::scalar(0.5, generic::time()))
        .unwrap();
    assert_eq!(
        athena::model_time(&mut session).unwrap(),
        UnitValue::scalar(0.5, generic::time())
    );

    let range = athena::sync_grid_ranges(&mut session).unwrap();
    assert_eq!(range, IndexRange::new(IVec3::ZERO, IVec3::new(3, 3, 0)));
    assert_eq!(session.grid_range(athena::GRID).unwrap(), range);
}

#[test]
fn test_ghost_cells_read_only() {
    let (mut session, _) = running();
    assert_eq!(
        session.get_parameter("number_of_ghost_cells").unwrap(),
        Value::from(4)
    );
    assert!(matches!(
        session.set_parameter("number_of_ghost_cells", 2),
        Err(SessionError::ReadOnlyParameter(_))
    ));
}

#[test]
fn test_grid_range_frozen_after_cleanup() {
    let (mut session, _) = running();
    session.cleanup().unwrap();
    let mesh = IndexRange::new(IVec3::ZERO, IVec3::new(7, 7, 0));
    assert!(matches!(
        session.set_grid_range(athena::GRID, mesh),
        Err(SessionError::IllegalStateTransition { .. })
    ));
    assert!(athena::setup_mesh(&mut session, &MESH).is_err());
}
