//! # bridge_codes
//!
//! Interface definitions of the bundled worker codes:
//!
//! - [`evtwin`]: stellar evolution, one star at a time.
//! - [`huayno`]: gravitational dynamics in generic units.
//! - [`athena`]: grid hydrodynamics configured through keyed parameters.
//!
//! Each module exposes a `definition` for building a
//! [`Session`](bridge_session::Session) and a `memory_kernel` that stands
//! in for the native worker.

pub mod athena;
pub mod error;
pub mod evtwin;
pub mod huayno;

use bridge_session::CodeDefinition;
use bridge_spec::FunctionTable;
use bridge_worker::MemoryKernel;
use glam::{DVec3, IVec3};

pub use error::CodeError;

/// Names accepted by [`definition`] and [`memory_kernel`].
pub const CODES: [&str; 3] = [evtwin::NAME, huayno::NAME, athena::NAME];

/// Mesh the in-memory Athena kernel lays its cell centres out for when no
/// mesh is given.
pub const DEFAULT_ATHENA_MESH: athena::Mesh =
    athena::Mesh::new(IVec3::splat(10), DVec3::ONE);

/// The definition of the code called `name`, with Huayno in its CPU build.
///
/// # Errors
///
/// [`CodeError::UnknownCode`] for a name not in [`CODES`].
pub fn definition(name: &str) -> Result<CodeDefinition, CodeError> {
    Ok(match name {
        evtwin::NAME => evtwin::definition()?,
        huayno::NAME => huayno::definition(huayno::Mode::default())?,
        athena::NAME => athena::definition()?,
        other => return Err(CodeError::UnknownCode(other.to_string())),
    })
}

/// The function table of the code called `name`.
///
/// # Errors
///
/// Same as [`definition`].
pub fn function_table(name: &str) -> Result<FunctionTable, CodeError> {
    Ok(match name {
        evtwin::NAME => evtwin::function_table()?,
        huayno::NAME => huayno::function_table()?,
        athena::NAME => athena::function_table()?,
        other => return Err(CodeError::UnknownCode(other.to_string())),
    })
}

/// An in-memory kernel for the code called `name`.
///
/// # Errors
///
/// [`CodeError::UnknownCode`] for a name not in [`CODES`].
pub fn memory_kernel(name: &str) -> Result<MemoryKernel, CodeError> {
    match name {
        evtwin::NAME => Ok(evtwin::memory_kernel()),
        huayno::NAME => Ok(huayno::memory_kernel()),
        athena::NAME => Ok(athena::memory_kernel(&DEFAULT_ATHENA_MESH)),
        other => Err(CodeError::UnknownCode(other.to_string())),
    }
}
