//! Agent backend implementations.
//!
//! `AgentBackend` is an enum over the concrete backends; it implements
//! [`Agent`] by delegating to the active variant. `build(config, api_key)`
//! is the factory, called at startup.
//! Adding a backend = new module + new variant + new arms below.

pub mod command;
pub mod echo;
pub mod openai_compatible;

use thiserror::Error;

use crate::agent::{Agent, Argument, CallFuture, Method};
use crate::config::AgentConfig;

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("unknown agent backend: {0}")]
    UnknownBackend(String),
    #[error("backend setup failed: {0}")]
    Setup(String),
}

// ── Backend enum ──────────────────────────────────────────────────────────────

/// All available agent backends.
#[derive(Debug, Clone)]
pub enum AgentBackend {
    Echo(echo::EchoAgent),
    OpenAiCompatible(openai_compatible::OpenAiCompatibleAgent),
    Command(command::CommandAgent),
}

impl Agent for AgentBackend {
    fn name(&self) -> &str {
        match self {
            AgentBackend::Echo(_) => "echo",
            AgentBackend::OpenAiCompatible(_) => "openai",
            AgentBackend::Command(_) => "command",
        }
    }

    fn methods(&self) -> Vec<Method> {
        match self {
            AgentBackend::Echo(a) => a.methods(),
            AgentBackend::OpenAiCompatible(a) => a.methods(),
            AgentBackend::Command(a) => a.methods(),
        }
    }

    fn call<'a>(&'a self, method: &'a Method, arg: Argument) -> CallFuture<'a> {
        match self {
            AgentBackend::Echo(a) => Box::pin(a.call(method, arg)),
            AgentBackend::OpenAiCompatible(a) => Box::pin(a.call(method, arg)),
            AgentBackend::Command(a) => Box::pin(a.call(method, arg)),
        }
    }
}

/// Construct the configured backend.
///
/// `api_key` is sourced from `LLM_API_KEY` env (never TOML) and is `None`
/// for keyless local models.
pub fn build(config: &AgentConfig, api_key: Option<String>) -> Result<AgentBackend, BackendError> {
    match config.backend.as_str() {
        "echo" | "dummy" => Ok(AgentBackend::Echo(echo::EchoAgent)),
        "openai" | "openai-compatible" => {
            let agent = openai_compatible::OpenAiCompatibleAgent::new(
                &config.openai,
                config.instruction.clone(),
                api_key,
            )?;
            Ok(AgentBackend::OpenAiCompatible(agent))
        }
        "command" => {
            if config.command.program.trim().is_empty() {
                return Err(BackendError::Setup(
                    "agent.command.program must be set for the command backend".into(),
                ));
            }
            Ok(AgentBackend::Command(command::CommandAgent::new(&config.command)))
        }
        other => Err(BackendError::UnknownBackend(other.to_string())),
    }
}
