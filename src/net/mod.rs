//! Networking: wire protocol, session state, command routing, transport.

pub mod commands;
pub mod protocol;
pub mod session;
pub mod transport;
