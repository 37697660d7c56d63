//! Message schema and strict codec for the chat wire protocol (§6).
//!
//! This crate is pure: no I/O, no shared state. It only describes what a
//! valid frame looks like and how to turn bytes into typed messages and back.

pub mod codec;
pub mod messages;
pub mod validate;

pub use codec::{decode_client_message, decode_envelope, encode, Envelope, EnvelopeError, ProtocolError};
pub use messages::{ClientMessage, Operation, ResponseResult, ServerMessage, Status};
