//! Agent adapter: "send text, get text back" over any [`Agent`].
//!
//! # Resolution
//!
//! [`AgentAdapter::new`] computes a [`CallPlan`] from the agent's declared
//! capabilities. [`AgentAdapter::respond`] walks that plan: every attempt
//! returns a typed `Result`, a failed attempt moves on to the next one, and
//! only exhausting the plan is reported to the caller.
//!
//! # Settling
//!
//! A successful attempt yields an [`Outcome`]. Deferred outcomes are awaited
//! as part of the attempt (so a deferred failure still counts as a failed
//! attempt); event streams are drained into one string; ready values go
//! through [`normalize::normalize`].
//!
//! The whole request runs under a bounded wait so a stalled agent cannot
//! hold a channel forever.

pub mod normalize;
pub mod plan;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::agent::{Agent, Argument, CallError, Method, Outcome};
use plan::{CallPlan, Step};

pub use normalize::{drain, normalize};

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq)]
pub enum AdapterError {
    /// Every planned calling convention failed (or none was planned).
    #[error("no supported call method found on agent '{0}'")]
    NoSupportedMethod(String),
    #[error("agent did not answer within {}s", .0.as_secs())]
    Timeout(Duration),
}

// ── AgentAdapter ──────────────────────────────────────────────────────────────

/// Wraps an agent and its precomputed call plan. Shared as `Arc<AgentAdapter>`.
pub struct AgentAdapter {
    agent: Arc<dyn Agent>,
    plan: CallPlan,
    timeout: Duration,
}

impl AgentAdapter {
    pub fn new(agent: Arc<dyn Agent>, timeout: Duration) -> Self {
        let plan = CallPlan::discover(agent.as_ref());
        debug!(
            agent = agent.name(),
            methods = ?agent.methods().iter().map(Method::name).collect::<Vec<_>>(),
            callable = agent.callable(),
            plan = %plan,
            "call plan discovered"
        );
        if plan.is_empty() {
            warn!(agent = agent.name(), "agent exposes no callable methods");
        }
        Self { agent, plan, timeout }
    }

    pub fn agent(&self) -> &dyn Agent {
        self.agent.as_ref()
    }

    pub fn plan(&self) -> &CallPlan {
        &self.plan
    }

    /// Send `text` to the agent and return its reply as display text.
    ///
    /// The returned string may be empty; substituting a placeholder is the
    /// channel's business.
    pub async fn respond(&self, text: &str) -> Result<String, AdapterError> {
        match tokio::time::timeout(self.timeout, self.resolve(text)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(agent = self.agent.name(), timeout_secs = self.timeout.as_secs(), "agent call timed out");
                Err(AdapterError::Timeout(self.timeout))
            }
        }
    }

    async fn resolve(&self, text: &str) -> Result<String, AdapterError> {
        for step in self.plan.steps() {
            if let Some(outcome) = self.try_step(step, text).await {
                info!(agent = self.agent.name(), method = %step.method(), kind = outcome.kind(), "agent call accepted");
                return Ok(finish(outcome).await);
            }
        }
        Err(AdapterError::NoSupportedMethod(self.agent.name().to_string()))
    }

    /// Run one plan step; `None` means every attempt in it failed.
    async fn try_step(&self, step: &Step, text: &str) -> Option<Outcome> {
        match step {
            Step::Shapes { method, shapes } => {
                for shape in shapes {
                    if let Ok(outcome) = self.attempt(method, shape.apply(text)).await {
                        return Some(outcome);
                    }
                }
                None
            }
            Step::TextOrBatch { method } => {
                match self.attempt(method, Argument::Text(text.to_string())).await {
                    Ok(outcome) => Some(outcome),
                    Err(e) if e.is_shape() => self
                        .attempt(method, Argument::Batch(vec![text.to_string()]))
                        .await
                        .ok(),
                    Err(_) => None,
                }
            }
            Step::Text { method } => self.attempt(method, Argument::Text(text.to_string())).await.ok(),
        }
    }

    /// Call and settle any deferred value. Event streams are returned as-is.
    async fn attempt(&self, method: &Method, arg: Argument) -> Result<Outcome, CallError> {
        let shape = arg.shape();
        let result = match self.agent.call(method, arg).await {
            Ok(outcome) => settle(outcome).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            debug!(agent = self.agent.name(), %method, shape, error = %e, "call attempt failed");
        }
        result
    }
}

/// Await deferred outcomes until something ready or streaming is left.
async fn settle(mut outcome: Outcome) -> Result<Outcome, CallError> {
    while let Outcome::Deferred(fut) = outcome {
        outcome = fut.await?;
    }
    Ok(outcome)
}

async fn finish(outcome: Outcome) -> String {
    match outcome {
        Outcome::Ready(value) => normalize(&value),
        Outcome::Events(events) => drain(events).await,
        // `settle` never hands back a deferred outcome.
        Outcome::Deferred(_) => String::new(),
    }
}

// ── Probe ─────────────────────────────────────────────────────────────────────

/// Result of calling one method during a probe.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub method: String,
    pub result: Result<String, String>,
}

/// Call every public method of `agent` (and the agent itself, if callable)
/// with `text`, recording what each one returns.
///
/// Diagnostic only: no fallbacks, no placeholders, one bounded wait per
/// method.
pub async fn probe(agent: &dyn Agent, text: &str, timeout: Duration) -> Vec<ProbeReport> {
    let mut methods: Vec<Method> = agent.methods().into_iter().filter(Method::is_public).collect();
    if agent.callable() {
        methods.push(Method::Direct);
    }

    let mut reports = Vec::with_capacity(methods.len());
    for method in methods {
        let call = async {
            let outcome = settle(agent.call(&method, Argument::Text(text.to_string())).await?).await?;
            Ok::<_, CallError>(finish(outcome).await)
        };
        let result = match tokio::time::timeout(timeout, call).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("timed out after {}s", timeout.as_secs())),
        };
        reports.push(ProbeReport { method: method.name().to_string(), result });
    }
    reports
}
