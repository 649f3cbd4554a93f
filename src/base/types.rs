use std::fmt;

use serde::{Deserialize, Serialize};

pub type Err = anyhow::Error;
pub type Res<T> = Result<T, Err>;
pub type Void = Res<()>;

/// Platform identifier of the user who sent an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// Platform identifier of the chat an event was sent in.
///
/// In a personal chat this has the same numeric value as the [`UserId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl From<UserId> for ChatId {
    fn from(user_id: UserId) -> Self {
        ChatId(user_id.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a piece of inbound text was classified by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Text starting with the command prefix.
    Command,
    /// Free text continuing a command that asked a question.
    FollowUp,
    /// A bare greeting.
    Greeting,
    /// None of the above.
    Unrecognized,
}

/// A classified inbound command. Transient; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEvent {
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub kind: CommandKind,
    pub trigger: String,
    pub arguments: Vec<String>,
}
