//! # bridge_net
//!
//! Everything between a typed call and the bytes that reach a worker.
//!
//! This crate provides:
//!
//! - [`messages`]: Call and result frames exchanged with a worker.
//! - [`codec`]: MessagePack serialisation of frames.
//! - [`values`]: The unit-tagged value codec mapping [`Value`]s to wire
//!   columns and back.
//! - [`transport`]: The byte-level [`Transport`] capability.
//! - [`connection`]: A NATS request/reply [`Transport`].
//! - [`subjects`]: NATS subject builders.
//! - [`error`]: Transport and codec error types.
//!
//! [`Value`]: bridge_spec::Value

pub mod codec;
pub mod connection;
pub mod error;
pub mod messages;
pub mod subjects;
pub mod transport;
pub mod values;

pub use codec::{decode, encode};
pub use connection::NatsTransport;
pub use error::{CodecError, NetError};
pub use messages::{CallFrame, Reply, Request, ResultFrame};
pub use transport::Transport;
pub use values::Cardinality;
