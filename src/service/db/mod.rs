use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::base::types::{ChatId, Res, UserId, Void};

pub mod surreal;

// Types.

/// The persisted conversation state of one (user, chat) pair.
///
/// The default value is the state of a pair that has never dispatched a command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRecord {
    /// The full command line that most recently set the follow-up flag.
    pub last_command: String,
    /// Whether the next free-text message continues `last_command`.
    pub awaiting_follow_up: bool,
}

/// A saved shortcut: a display name and the command line it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortcut {
    pub name: String,
    pub command: String,
}

// Traits.

/// Generic database client trait that clients must implement.
///
/// The conversation methods are the narrow state repository used by the
/// dispatcher. The shortcut methods back the `/shortcuts` command.
#[async_trait]
pub trait GenericDbClient: Send + Sync + 'static {
    /// Gets the conversation state for the pair, or `None` if the pair has never
    /// dispatched a command.
    async fn get_conversation_state(&self, user_id: UserId, chat_id: ChatId) -> Res<Option<ConversationRecord>>;

    /// Inserts or overwrites the conversation state for the pair.
    async fn upsert_conversation_state(&self, user_id: UserId, chat_id: ChatId, record: &ConversationRecord) -> Void;

    /// Whether `upsert_conversation_state` writes both fields in one atomic step.
    ///
    /// Sessions serialize their writes per key when this returns `false`.
    fn atomic_upsert(&self) -> bool {
        true
    }

    /// Gets the saved shortcuts of a user, in display order.
    async fn get_shortcuts(&self, user_id: UserId) -> Res<Vec<Shortcut>>;

    /// Replaces the saved shortcuts of a user. An empty list removes the record.
    async fn put_shortcuts(&self, user_id: UserId, shortcuts: &[Shortcut]) -> Void;
}

// Structs.

/// Database client for dispatch-bot.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct DbClient {
    inner: Arc<dyn GenericDbClient>,
}

impl Deref for DbClient {
    type Target = dyn GenericDbClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl DbClient {
    pub fn new(inner: Arc<dyn GenericDbClient>) -> Self {
        Self { inner }
    }
}
