//! Outbound reply values produced by command handlers.
//!
//! A [`Reply`] is destined for exactly one chat and is handed to the chat client
//! for delivery. Everything about its shape is validated when it is built, so a
//! reply that exists is always deliverable.

use serde::Serialize;
use thiserror::Error;

use super::types::ChatId;

/// Errors raised while building a reply.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyboardError {
    #[error("keyboard has {labels} label rows but {data} callback data rows")]
    RowCountMismatch { labels: usize, data: usize },
    #[error("keyboard row {row} has {labels} labels but {data} callback data entries")]
    RowLengthMismatch { row: usize, labels: usize, data: usize },
}

/// Text formatting mode understood by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParseMode {
    #[serde(rename = "HTML")]
    Html,
    #[serde(rename = "MarkdownV2")]
    MarkdownV2,
}

impl ParseMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseMode::Html => "HTML",
            ParseMode::MarkdownV2 => "MarkdownV2",
        }
    }
}

/// A single inline keyboard button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

/// An inline keyboard attached to a reply.
///
/// Rows may differ in length from each other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineKeyboard {
    #[serde(rename = "inline_keyboard")]
    rows: Vec<Vec<InlineButton>>,
}

impl InlineKeyboard {
    /// Builds a keyboard from parallel rows of labels and callback data.
    ///
    /// Both arguments must have the same shape: the same number of rows, and
    /// each row the same number of entries.
    pub fn new<L, D>(labels: Vec<Vec<L>>, data: Vec<Vec<D>>) -> Result<Self, KeyboardError>
    where
        L: Into<String>,
        D: Into<String>,
    {
        if labels.len() != data.len() {
            return Err(KeyboardError::RowCountMismatch {
                labels: labels.len(),
                data: data.len(),
            });
        }

        let mut rows = Vec::with_capacity(labels.len());

        for (row, (labels, data)) in labels.into_iter().zip(data).enumerate() {
            if labels.len() != data.len() {
                return Err(KeyboardError::RowLengthMismatch {
                    row,
                    labels: labels.len(),
                    data: data.len(),
                });
            }

            rows.push(
                labels
                    .into_iter()
                    .zip(data)
                    .map(|(text, callback_data)| InlineButton {
                        text: text.into(),
                        callback_data: callback_data.into(),
                    })
                    .collect(),
            );
        }

        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[Vec<InlineButton>] {
        &self.rows
    }
}

/// The body of a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyPayload {
    Text(String),
    Photo { bytes: Vec<u8>, caption: Option<String> },
}

/// An outbound message destined for one chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub chat_id: ChatId,
    pub payload: ReplyPayload,
    pub parse_mode: Option<ParseMode>,
    pub keyboard: Option<InlineKeyboard>,
}

impl Reply {
    pub fn text(chat_id: ChatId, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            payload: ReplyPayload::Text(text.into()),
            parse_mode: None,
            keyboard: None,
        }
    }

    pub fn photo(chat_id: ChatId, bytes: Vec<u8>, caption: Option<String>) -> Self {
        Self {
            chat_id,
            payload: ReplyPayload::Photo { bytes, caption },
            parse_mode: None,
            keyboard: None,
        }
    }

    pub fn with_keyboard(mut self, keyboard: InlineKeyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }

    pub fn with_parse_mode(mut self, parse_mode: ParseMode) -> Self {
        self.parse_mode = Some(parse_mode);
        self
    }

    /// Returns the text body, if this is a text reply.
    pub fn as_text(&self) -> Option<&str> {
        match &self.payload {
            ReplyPayload::Text(text) => Some(text),
            ReplyPayload::Photo { .. } => None,
        }
    }
}

// Tests.
