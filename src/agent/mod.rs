//! Agent boundary.
//!
//! An [`Agent`] is the conversational backend the relay talks to. Agents do
//! not share a fixed request/response API: each one declares which of the
//! conventional methods ([`Method`]) it exposes and accepts a handful of
//! argument shapes ([`Argument`]). What comes back is an [`Outcome`]: a ready
//! [`Value`], a deferred one, or a stream of events.
//!
//! Concrete backends live in [`backends`] as a closed enum; tests and
//! embedders may implement the trait directly.

pub mod backends;
pub mod value;

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;
use tokio::sync::mpsc;

pub use value::{Object, Value};

// ── Method ────────────────────────────────────────────────────────────────────

/// A method an agent may expose.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    RunAsync,
    RunLive,
    Generate,
    Invoke,
    Respond,
    Answer,
    Chat,
    Ask,
    Predict,
    Complete,
    Run,
    /// The agent itself, invoked like a function.
    Direct,
    /// Any other public or private method, by name.
    Named(String),
}

impl Method {
    /// Methods that typically hand back an event stream.
    pub const STREAMING: [Method; 2] = [Method::RunAsync, Method::RunLive];

    /// Request/response methods, in the order they are preferred.
    pub const CONVENTIONAL: [Method; 9] = [
        Method::Generate,
        Method::Invoke,
        Method::Respond,
        Method::Answer,
        Method::Chat,
        Method::Ask,
        Method::Predict,
        Method::Complete,
        Method::Run,
    ];

    pub fn name(&self) -> &str {
        match self {
            Method::RunAsync => "run_async",
            Method::RunLive => "run_live",
            Method::Generate => "generate",
            Method::Invoke => "invoke",
            Method::Respond => "respond",
            Method::Answer => "answer",
            Method::Chat => "chat",
            Method::Ask => "ask",
            Method::Predict => "predict",
            Method::Complete => "complete",
            Method::Run => "run",
            Method::Direct => "__call__",
            Method::Named(name) => name,
        }
    }

    /// Map a method name onto a well-known variant where one exists.
    pub fn from_name(name: &str) -> Method {
        match name {
            "run_async" => Method::RunAsync,
            "run_live" => Method::RunLive,
            "generate" => Method::Generate,
            "invoke" => Method::Invoke,
            "respond" => Method::Respond,
            "answer" => Method::Answer,
            "chat" => Method::Chat,
            "ask" => Method::Ask,
            "predict" => Method::Predict,
            "complete" => Method::Complete,
            "run" => Method::Run,
            other => Method::Named(other.to_string()),
        }
    }

    /// Underscore-prefixed names are private and never probed.
    pub fn is_public(&self) -> bool {
        !matches!(self, Method::Direct) && !self.name().starts_with('_')
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Argument ──────────────────────────────────────────────────────────────────

/// The shape in which the user text is passed to a method.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    /// The bare string.
    Text(String),
    /// No argument at all.
    Empty,
    /// `{"input": text}`
    Input(String),
    /// `{"text": text}`
    TextField(String),
    /// A single-element sequence, `[text]`.
    Batch(Vec<String>),
}

impl Argument {
    /// The user text carried by this argument, whatever its shape.
    pub fn text(&self) -> Option<&str> {
        match self {
            Argument::Text(s) | Argument::Input(s) | Argument::TextField(s) => Some(s),
            Argument::Batch(items) => items.first().map(String::as_str),
            Argument::Empty => None,
        }
    }

    /// Short label used in logs.
    pub fn shape(&self) -> &'static str {
        match self {
            Argument::Text(_) => "text",
            Argument::Empty => "empty",
            Argument::Input(_) => "{input}",
            Argument::TextField(_) => "{text}",
            Argument::Batch(_) => "[text]",
        }
    }
}

// ── CallError ─────────────────────────────────────────────────────────────────

/// Why a single call attempt failed.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CallError {
    /// The method exists but does not take this argument shape.
    #[error("argument shape not accepted: {0}")]
    Shape(String),
    /// The agent does not expose the method.
    #[error("unsupported method: {0}")]
    Unsupported(String),
    /// The call ran and failed.
    #[error("call failed: {0}")]
    Failed(String),
}

impl CallError {
    pub fn is_shape(&self) -> bool {
        matches!(self, CallError::Shape(_))
    }
}

// ── Outcome ───────────────────────────────────────────────────────────────────

/// A boxed, owned future resolving to another [`Outcome`].
pub type DeferredOutcome = Pin<Box<dyn Future<Output = Result<Outcome, CallError>> + Send + 'static>>;

/// Receiving end of an event stream. An `Err` item ends the stream.
pub type EventStream = mpsc::Receiver<Result<Value, CallError>>;

/// What a call hands back before normalization.
pub enum Outcome {
    /// A value available immediately.
    Ready(Value),
    /// A value that still has to be awaited.
    Deferred(DeferredOutcome),
    /// An incrementally produced sequence of events.
    Events(EventStream),
}

impl Outcome {
    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Ready(_) => "ready",
            Outcome::Deferred(_) => "deferred",
            Outcome::Events(_) => "events",
        }
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Ready(v) => f.debug_tuple("Ready").field(v).finish(),
            Outcome::Deferred(_) => f.write_str("Deferred(..)"),
            Outcome::Events(_) => f.write_str("Events(..)"),
        }
    }
}

impl From<Value> for Outcome {
    fn from(v: Value) -> Self {
        Outcome::Ready(v)
    }
}

// ── Agent ─────────────────────────────────────────────────────────────────────

/// A boxed future returned by [`Agent::call`].
pub type CallFuture<'a> = Pin<Box<dyn Future<Output = Result<Outcome, CallError>> + Send + 'a>>;

/// A conversational backend.
///
/// Implementors declare what they expose up front; the adapter builds its
/// call plan from [`Agent::methods`] and [`Agent::callable`] once, then only
/// ever calls methods that were declared.
pub trait Agent: Send + Sync {
    /// Stable identifier used in log messages.
    fn name(&self) -> &str;

    /// Every method the agent exposes, public or not.
    fn methods(&self) -> Vec<Method>;

    /// Whether the agent itself can be invoked ([`Method::Direct`]).
    fn callable(&self) -> bool {
        false
    }

    /// Invoke `method` with `arg`.
    fn call<'a>(&'a self, method: &'a Method, arg: Argument) -> CallFuture<'a>;
}
