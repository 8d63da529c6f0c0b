//! Telegram channel: long-polls the Bot API, relays each text message to the
//! agent and answers with a reply to the originating message.

use std::sync::Arc;

use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::ReplyParameters;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::state::{CommsEvent, CommsState};
use crate::error::AppError;
use crate::subsystems::runtime::{Component, ComponentFuture};

/// Telegram caps messages at 4096 characters.
const MAX_MESSAGE_LENGTH: usize = 4000;

pub struct TelegramChannel {
    channel_id: String,
    token: String,
    state: Arc<CommsState>,
}

impl TelegramChannel {
    pub fn new(channel_id: impl Into<String>, token: impl Into<String>, state: Arc<CommsState>) -> Self {
        Self { channel_id: channel_id.into(), token: token.into(), state }
    }
}

impl Component for TelegramChannel {
    fn id(&self) -> &str {
        &self.channel_id
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(run_telegram(self.channel_id, self.token, self.state, shutdown))
    }
}

/// Split `text` into pieces of at most `max` characters.
pub fn chunk_message(text: &str, max: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(max.max(1)).map(|c| c.iter().collect()).collect()
}

async fn run_telegram(
    channel_id: String,
    token: String,
    state: Arc<CommsState>,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    info!(%channel_id, "telegram channel starting");
    state.report_event(CommsEvent::ChannelStarted { channel_id: channel_id.clone() });

    let bot = Bot::new(token);

    let handler_state = state.clone();
    let handler_channel = channel_id.clone();
    let handler = Update::filter_message().endpoint(move |bot: Bot, msg: Message| {
        let state = handler_state.clone();
        let channel_id = handler_channel.clone();
        async move {
            // Stickers, photos and the like carry no text.
            let Some(text) = msg.text() else {
                return respond(());
            };
            let text = text.trim();
            if text.is_empty() {
                return respond(());
            }

            debug!(
                %channel_id,
                chat_id = %msg.chat.id,
                from = ?msg.from.as_ref().and_then(|u| u.username.as_ref()),
                "telegram message"
            );

            let reply = state.send_message(&channel_id, text.to_string()).await;

            for (i, chunk) in chunk_message(&reply, MAX_MESSAGE_LENGTH).into_iter().enumerate() {
                let request = bot.send_message(msg.chat.id, chunk);
                let sent = if i == 0 {
                    request.reply_parameters(ReplyParameters::new(msg.id)).await
                } else {
                    request.await
                };
                if let Err(e) = sent {
                    warn!(%channel_id, chat_id = %msg.chat.id, "failed to send telegram reply: {e}");
                    break;
                }
            }
            respond(())
        }
    });

    let mut dispatcher = Dispatcher::builder(bot, handler).build();

    tokio::select! {
        biased;

        _ = shutdown.cancelled() => {
            info!(%channel_id, "telegram channel shutting down");
        }
        _ = dispatcher.dispatch() => {
            warn!(%channel_id, "telegram dispatcher exited");
        }
    }

    state.report_event(CommsEvent::ChannelShutdown { channel_id });
    Ok(())
}
