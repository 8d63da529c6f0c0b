//! agent-relay: bridges chat channels to a pluggable conversational agent.
//!
//! The [`adapter`] finds a way to call whatever [`agent`] is configured and
//! turns its output into display text; [`subsystems::comms`] carries the
//! conversation.

pub mod adapter;
pub mod agent;
pub mod config;
pub mod error;
pub mod logger;
pub mod subsystems;
