//! Long-running parts of the relay.

pub mod comms;
pub mod runtime;
