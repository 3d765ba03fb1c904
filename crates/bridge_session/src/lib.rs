//! # bridge_session
//!
//! The controller side of the worker bridge. A [`Session`] drives one remote
//! worker through its lifecycle and is composed of:
//!
//! - a [`Marshaller`] packing typed calls into frames over a transport,
//! - a [`StateMachine`] gating operations by [`LifecycleState`],
//! - a [`ParameterRegistry`] of named, defaulted configuration values,
//! - [`EntitySet`]s of worker-held entities addressed by handle,
//! - [`GridSet`]s addressed by inclusive 3-D index ranges.
//!
//! A session is built from a [`CodeDefinition`], the static description of
//! one worker's functions, parameters, sets and hooks.

pub mod accessor;
pub mod config;
pub mod definition;
pub mod entity_set;
pub mod error;
pub mod grid;
pub mod lifecycle;
pub mod marshaller;
pub mod parameters;
pub mod session;

pub use accessor::AccessorDefinition;
pub use config::SessionConfig;
pub use definition::{CodeDefinition, Hooks};
pub use entity_set::{EntitySet, EntitySetDefinition};
pub use error::SessionError;
pub use grid::{GridDefinition, GridSet, IndexRange, RangeSource};
pub use lifecycle::{LifecycleState, StateMachine, Transition};
pub use marshaller::{CallOutput, Marshaller};
pub use parameters::{ParameterDescriptor, ParameterKind, ParameterRegistry, ParameterSnapshot};
pub use session::Session;
