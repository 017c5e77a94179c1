//! Frame-level view of the WebSocket protocol (RFC 6455).

pub mod frame;
pub mod opcode;

pub use frame::Frame;
pub use opcode::OpCode;
