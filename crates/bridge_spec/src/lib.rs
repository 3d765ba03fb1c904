//! # bridge_spec
//!
//! The declarative layer of the worker bridge: what a remote function looks
//! like, how entities held by a worker are named, and which values may cross
//! the process boundary.
//!
//! This crate provides:
//!
//! - [`RemoteFunctionSpec`]: An immutable, typed, directional function
//!   declaration, built with [`FunctionSpecBuilder`].
//! - [`FunctionTable`]: The static table of declarations a session uses.
//! - [`EntityHandle`] / [`HandleAllocator`]: Opaque integer entity names.
//! - [`Scalar`], [`Column`], [`Value`]: Wire and caller-facing values.

pub mod error;
pub mod function;
pub mod handle;
pub mod table;
pub mod value;

pub use error::SpecError;
pub use function::{
    ArrayMode, Direction, FunctionId, FunctionSpecBuilder, ParameterSpec, RemoteFunctionSpec,
    ResultKind, ScalarType,
};
pub use handle::{EntityHandle, HandleAllocator};
pub use table::FunctionTable;
pub use value::{Column, Scalar, Value};
