//! Resolves a decoded event to `(user_id, chat_id, content)`.
//!
//! Missing optional fields normalize to absent values; only an event without a
//! sender is an error. Unknown event kinds are ignored.

use tracing::{instrument, warn};

use crate::{
    base::types::{ChatId, UserId},
    service::chat::ChatClient,
};

use super::{
    error::NormalizationError,
    event::{CallbackEvent, InboundEvent, Location, MessageEvent},
};

/// The dispatchable part of an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    /// Text, including callback payloads.
    Text(String),
    /// A shared location. Decoded, but not dispatchable.
    Location(Location),
    /// A populated payload of a type the bot does not handle, by kind.
    Unsupported(String),
    /// The event carried nothing at all.
    Empty,
}

/// A normalized event.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEvent {
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub content: Content,
}

/// Converts decoded events into dispatch input.
#[derive(Clone)]
pub struct Normalizer {
    chat: ChatClient,
}

impl Normalizer {
    pub fn new(chat: ChatClient) -> Self {
        Self { chat }
    }

    /// Normalizes an event. Returns `Ok(None)` for event kinds the bot ignores.
    #[instrument(skip_all, fields(kind = event.kind()))]
    pub async fn normalize(&self, event: &InboundEvent) -> Result<Option<NormalizedEvent>, NormalizationError> {
        match event {
            InboundEvent::CallbackQuery(callback) => self.normalize_callback(callback).await.map(Some),
            InboundEvent::Message(message) => normalize_message(message).map(Some),
            InboundEvent::Other(_) => Ok(None),
        }
    }

    async fn normalize_callback(&self, callback: &CallbackEvent) -> Result<NormalizedEvent, NormalizationError> {
        // Acknowledge first so the button stops spinning whatever happens next.
        if let Some(id) = &callback.id
            && let Err(e) = self.chat.answer_callback(id).await
        {
            warn!("Failed to acknowledge callback `{}`: {}", id, e);
        }

        let user_id = callback.from.as_ref().map(|u| UserId(u.id));
        let origin_chat = callback.message.as_ref().and_then(|m| m.chat.as_ref()).map(|c| ChatId(c.id));

        // Without an originating message the button was pressed in the personal chat.
        let chat_id = origin_chat.or(user_id.map(ChatId::from));

        let content = match &callback.data {
            Some(data) => Content::Text(data.clone()),
            None => Content::Empty,
        };

        resolve(user_id, chat_id, content)
    }
}

fn normalize_message(message: &MessageEvent) -> Result<NormalizedEvent, NormalizationError> {
    let user_id = message.from.as_ref().map(|u| UserId(u.id));
    let chat_id = message.chat.as_ref().map(|c| ChatId(c.id)).or(user_id.map(ChatId::from));

    let content = if let Some(text) = &message.text {
        Content::Text(text.clone())
    } else if let Some(location) = &message.location {
        Content::Location(location.clone())
    } else if let Some(kind) = &message.unsupported {
        Content::Unsupported(kind.clone())
    } else {
        Content::Empty
    };

    resolve(user_id, chat_id, content)
}

fn resolve(user_id: Option<UserId>, chat_id: Option<ChatId>, content: Content) -> Result<NormalizedEvent, NormalizationError> {
    let Some(user_id) = user_id else {
        return Err(NormalizationError::MissingUserId { chat_id });
    };

    Ok(NormalizedEvent {
        user_id,
        // A sender always yields at least the personal chat.
        chat_id: chat_id.unwrap_or(ChatId::from(user_id)),
        content,
    })
}

// Tests.
