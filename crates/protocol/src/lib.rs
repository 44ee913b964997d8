//! Wire types for the molecular viewer command bridge.
//!
//! This crate defines the JSON message format exchanged between the bridge
//! server and a rendering session over the WebSocket transport:
//!
//! 1. Session connects and receives [`Lifecycle::Welcome`] with its role
//! 2. Server sends [`CommandEnvelope`] messages to the primary session
//! 3. Session answers each envelope with a [`ResponseEnvelope`] carrying the
//!    same correlation id, either `status: "ok"` with an encoded snapshot or
//!    `status: "error"` with a message
//!
//! # Main Types
//!
//! - [`Command`] - Closed set of render commands with typed payloads
//! - [`CommandEnvelope`] / [`ResponseEnvelope`] - Correlated request/response
//! - [`Lifecycle`] - Session lifecycle messages (role assignment)
//! - [`Role`] - Primary or observer session role

pub mod command;
pub mod envelope;

pub use command::{Command, Selection, StyleKind, StyleParams, Vec3};
pub use envelope::{
	CommandEnvelope, CorrelationId, Lifecycle, ResponseEnvelope, ResponseOutcome, Role,
	ServerMessage, decode_image, encode_image,
};
