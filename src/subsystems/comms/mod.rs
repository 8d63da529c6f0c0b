//! Comms subsystem: the chat channels that carry user messages to the agent.
//!
//! Each channel (console, Telegram) implements [`Component`] and captures an
//! [`Arc<CommsState>`] at construction. [`start`] spawns the configured ones
//! via [`spawn_components`] and returns immediately.
//!
//! Channels report lifecycle events over an internal [`mpsc`] channel that a
//! background task drains into the log. It ends once every channel (and so
//! every sender) has been dropped.

mod state;
#[cfg(feature = "channel-pty")]
pub mod pty;
#[cfg(feature = "channel-telegram")]
pub mod telegram;

pub use state::{CommsEvent, CommsState, EMPTY_REPLY, ERROR_PREFIX, reply_text};

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::adapter::AgentAdapter;
use crate::config::Config;
use crate::error::AppError;
use crate::subsystems::runtime::{Component, SubsystemHandle, spawn_components};

/// Spawn every enabled channel.
///
/// Fails up front when Telegram is enabled without a token.
pub fn start(
    config: &Config,
    adapter: Arc<AgentAdapter>,
    shutdown: CancellationToken,
) -> Result<SubsystemHandle, AppError> {
    let (event_tx, event_rx) = mpsc::channel::<CommsEvent>(32);
    let state = Arc::new(CommsState::new(adapter, event_tx));

    let mut components: Vec<Box<dyn Component>> = Vec::new();

    #[cfg(feature = "channel-pty")]
    {
        if config.comms_pty_should_load() {
            info!("loading console channel");
            components.push(Box::new(pty::PtyChannel::new("pty0", state.clone())));
        }
    }

    #[cfg(feature = "channel-telegram")]
    {
        if config.comms_telegram_should_load() {
            let token = config.require_telegram_token()?;
            info!("loading telegram channel");
            components.push(Box::new(telegram::TelegramChannel::new(
                "telegram0",
                token,
                state.clone(),
            )));
        }
    }

    if components.is_empty() {
        info!("no comms channels enabled; waiting for shutdown");
    }

    // Only the channels hold senders from here on.
    drop(state);

    tokio::spawn(async move {
        let mut rx = event_rx;
        while let Some(event) = rx.recv().await {
            match event {
                CommsEvent::ChannelStarted { channel_id } => debug!(%channel_id, "channel started"),
                CommsEvent::ChannelShutdown { channel_id } => debug!(%channel_id, "channel stopped"),
            }
        }
    });

    Ok(spawn_components(components, shutdown))
}
