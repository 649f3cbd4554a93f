//! Errors raised while turning an inbound event into replies.

use thiserror::Error;

use crate::base::types::ChatId;

/// Errors raised by the dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The command line could not be split into words (e.g. unbalanced quotes).
    #[error("Unable to parse `{0}`: check for unbalanced quotes")]
    MalformedInput(String),
    /// The first token matched no registered handler.
    #[error("Unknown command: {trigger}")]
    UnknownCommand { trigger: String },
    /// The text is neither a command, a follow-up, nor a greeting.
    #[error("Not Supported")]
    Unrecognized,
    /// The handler failed.
    ///
    /// `follow_up_trusted` is true when the conversation state was written after
    /// the dispatcher's reset, i.e. the stored state reflects the handler's intent.
    #[error("[{trigger}] {source}")]
    Handler {
        trigger: String,
        #[source]
        source: anyhow::Error,
        follow_up_trusted: bool,
    },
    /// Reading or writing conversation state failed.
    #[error("Conversation state unavailable: {0}")]
    Storage(#[source] anyhow::Error),
}

impl DispatchError {
    /// The text shown to the user for this error.
    pub fn user_message(&self) -> String {
        match self {
            DispatchError::MalformedInput(_) | DispatchError::UnknownCommand { .. } | DispatchError::Unrecognized => self.to_string(),
            DispatchError::Handler { trigger, source, .. } => format!("[{trigger}] Unexpected error has occured: {source}"),
            DispatchError::Storage(source) => format!("Unexpected error has occured: {source}"),
        }
    }
}

/// Errors raised while normalizing an inbound event.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizationError {
    /// No sender could be found in the event.
    ///
    /// Carries the chat id if one was still recoverable, so the caller can decide
    /// whether a reply has anywhere to go.
    #[error("Unable to find the sender of the event")]
    MissingUserId { chat_id: Option<ChatId> },
}

impl NormalizationError {
    /// Where an error reply could be sent, if anywhere.
    pub fn reply_chat_id(&self) -> Option<ChatId> {
        match self {
            NormalizationError::MissingUserId { chat_id } => *chat_id,
        }
    }
}

// Tests.
