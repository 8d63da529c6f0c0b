//! Console channel: reads lines from stdin, relays each to the agent and
//! prints the reply to stdout.
//!
//! Enabled with `-i` or `[comms.pty] enabled = true`. Runs until the
//! `shutdown` token is cancelled or stdin is closed.

use std::io::Write as _;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::state::{CommsEvent, CommsState};
use crate::error::AppError;
use crate::subsystems::runtime::{Component, ComponentFuture};

pub struct PtyChannel {
    channel_id: String,
    state: Arc<CommsState>,
}

impl PtyChannel {
    pub fn new(channel_id: impl Into<String>, state: Arc<CommsState>) -> Self {
        Self { channel_id: channel_id.into(), state }
    }
}

impl Component for PtyChannel {
    fn id(&self) -> &str {
        &self.channel_id
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(run_console(self.channel_id, self.state, shutdown))
    }
}

async fn run_console(
    channel_id: String,
    state: Arc<CommsState>,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    info!(%channel_id, "console channel started");
    state.report_event(CommsEvent::ChannelStarted { channel_id: channel_id.clone() });
    println!("agent-relay console (Ctrl-C to quit)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        let _ = std::io::stdout().flush();

        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                println!();
                info!(%channel_id, "console channel shutting down");
                break;
            }

            line = lines.next_line() => {
                let input = match line {
                    Ok(Some(input)) => input,
                    Ok(None) => {
                        info!(%channel_id, "stdin closed");
                        break;
                    }
                    Err(e) => {
                        warn!(%channel_id, "stdin read error: {e}");
                        break;
                    }
                };

                let input = input.trim();
                if input.is_empty() {
                    continue;
                }
                debug!(%channel_id, len = input.len(), "console line");

                let reply = state.send_message(&channel_id, input.to_string()).await;
                println!("{reply}");
            }
        }
    }

    state.report_event(CommsEvent::ChannelShutdown { channel_id });
    Ok(())
}
