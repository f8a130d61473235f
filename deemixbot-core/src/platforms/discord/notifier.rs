use std::sync::Arc;

use async_trait::async_trait;
use twilight_http::request::channel::message::CreateMessage;
use twilight_http::Client as HttpClient;
use twilight_model::id::marker::{ChannelMarker, MessageMarker};
use twilight_model::id::Id;

use deemixbot_common::error::Error;
use deemixbot_common::traits::Notifier;

/// Discord rejects message bodies longer than this many characters.
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// Posts plain text replies into guild text channels.
pub struct DiscordNotifier {
    http: Arc<HttpClient>,
}

impl DiscordNotifier {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }

    pub async fn send(&self, channel_id: Id<ChannelMarker>, text: &str) -> Result<(), Error> {
        self.message(channel_id, None, text)
            .await
            .map_err(|e| Error::Platform(format!("create_message error: {e}")))?;
        Ok(())
    }

    /// Answers a command message with a Discord reply pointing back at it.
    pub async fn reply(
        &self,
        channel_id: Id<ChannelMarker>,
        message_id: Id<MessageMarker>,
        text: &str,
    ) -> Result<(), Error> {
        self.message(channel_id, Some(message_id), text)
            .await
            .map_err(|e| Error::Platform(format!("create_message reply error: {e}")))?;
        Ok(())
    }

    fn message<'a>(
        &'a self,
        channel_id: Id<ChannelMarker>,
        reply_to: Option<Id<MessageMarker>>,
        text: &'a str,
    ) -> CreateMessage<'a> {
        let request = self.http.create_message(channel_id).content(truncate_message(text));
        match reply_to {
            // still post when the command message was deleted in the meantime
            Some(message_id) => request.reply(message_id).fail_if_not_exists(false),
            None => request,
        }
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn notify(&self, channel_id: Id<ChannelMarker>, text: &str) -> Result<(), Error> {
        self.send(channel_id, text).await
    }
}

/// Cuts `text` to at most `MAX_MESSAGE_CHARS` characters.
pub fn truncate_message(text: &str) -> &str {
    match text.char_indices().nth(MAX_MESSAGE_CHARS) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
