//! Shared state for the comms channels, the transport boundary.
//!
//! Channels receive an `Arc<CommsState>` and only ever call
//! [`CommsState::send_message`], which always produces a reply: the agent's
//! display text, a placeholder for empty output, or a visible error line.
//! Nothing that goes wrong while answering a message escapes to the channel.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::adapter::{AdapterError, AgentAdapter};

/// Sent instead of an empty reply.
pub const EMPTY_REPLY: &str =
    "⚠️ The agent returned an empty response. Check the agent configuration, the model, and the logs.";

/// Prefix of every error reply.
pub const ERROR_PREFIX: &str = "⚠️ Error processing message:";

// ── Events ────────────────────────────────────────────────────────────────────

/// Lifecycle events a channel reports back to the comms manager.
#[derive(Debug)]
pub enum CommsEvent {
    ChannelStarted { channel_id: String },
    ChannelShutdown { channel_id: String },
}

// ── State ─────────────────────────────────────────────────────────────────────

pub struct CommsState {
    adapter: Arc<AgentAdapter>,
    event_tx: mpsc::Sender<CommsEvent>,
}

impl CommsState {
    pub fn new(adapter: Arc<AgentAdapter>, event_tx: mpsc::Sender<CommsEvent>) -> Self {
        Self { adapter, event_tx }
    }

    /// Relay `content` from `channel_id` to the agent and return the text to
    /// send back. Never empty, never an error.
    ///
    /// The agent runs on its own task so a panicking backend becomes an
    /// error reply instead of taking the channel down.
    pub async fn send_message(&self, channel_id: &str, content: String) -> String {
        let request_id = Uuid::now_v7();
        let span = info_span!("message", %channel_id, %request_id);

        async {
            info!(len = content.len(), "message received");

            let adapter = self.adapter.clone();
            let task = tokio::spawn(async move { adapter.respond(&content).await });

            let reply = match task.await {
                Ok(result) => reply_text(result),
                Err(e) => {
                    error!(error = %e, "agent task panicked");
                    format!("{ERROR_PREFIX} agent task failed: {e}")
                }
            };

            info!(len = reply.len(), "reply ready");
            reply
        }
        .instrument(span)
        .await
    }

    /// Report an event to the comms manager. Drops (with a warning) if the
    /// manager is not keeping up or already gone.
    pub fn report_event(&self, event: CommsEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            warn!("comms event dropped: {e}");
        }
    }
}

/// Turn an adapter result into the outbound message.
pub fn reply_text(result: Result<String, AdapterError>) -> String {
    match result {
        Ok(text) if text.trim().is_empty() => EMPTY_REPLY.to_string(),
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "agent call failed");
            format!("{ERROR_PREFIX} {e}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::agent::{Agent, Argument, CallError, CallFuture, Method, Outcome, Value};

    struct Fixed(Option<&'static str>);

    impl Agent for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn methods(&self) -> Vec<Method> {
            vec![Method::Respond]
        }

        fn call<'a>(&'a self, _method: &'a Method, _arg: Argument) -> CallFuture<'a> {
            let reply = self.0;
            Box::pin(async move {
                match reply {
                    Some(text) => Ok(Outcome::Ready(Value::from(text))),
                    None => Err(CallError::Failed("offline".into())),
                }
            })
        }
    }

    struct Panics;

    impl Agent for Panics {
        fn name(&self) -> &str {
            "panics"
        }

        fn methods(&self) -> Vec<Method> {
            vec![Method::Ask]
        }

        fn call<'a>(&'a self, _method: &'a Method, _arg: Argument) -> CallFuture<'a> {
            Box::pin(async { panic!("backend bug") })
        }
    }

    fn state(agent: impl Agent + 'static) -> CommsState {
        let (tx, _rx) = mpsc::channel(4);
        let adapter = AgentAdapter::new(Arc::new(agent), Duration::from_secs(5));
        CommsState::new(Arc::new(adapter), tx)
    }

    #[test]
    fn blank_reply_becomes_placeholder() {
        assert_eq!(reply_text(Ok("   ".into())), EMPTY_REPLY);
        assert_eq!(reply_text(Ok("hi".into())), "hi");
    }

    #[test]
    fn errors_become_visible_replies() {
        let reply = reply_text(Err(AdapterError::NoSupportedMethod("x".into())));
        assert!(reply.starts_with(ERROR_PREFIX));
        assert!(reply.contains("no supported call method found"));
    }

    #[tokio::test]
    async fn relays_agent_text() {
        assert_eq!(state(Fixed(Some("hola"))).send_message("t0", "hi".into()).await, "hola");
    }

    #[tokio::test]
    async fn empty_agent_reply_is_never_sent() {
        assert_eq!(state(Fixed(Some(""))).send_message("t0", "hi".into()).await, EMPTY_REPLY);
    }

    #[tokio::test]
    async fn exhaustion_becomes_error_reply() {
        let reply = state(Fixed(None)).send_message("t0", "hi".into()).await;
        assert!(reply.starts_with(ERROR_PREFIX));
    }

    #[tokio::test]
    async fn panicking_agent_becomes_error_reply() {
        let reply = state(Panics).send_message("t0", "hi".into()).await;
        assert!(reply.starts_with(ERROR_PREFIX));
        assert!(reply.contains("agent task failed"));
    }
}
