//! SurrealDB implementation for dispatch-bot data storage.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use surrealdb::{
    Surreal,
    engine::any::{self, Any},
    opt::auth::Root,
};
use tracing::{debug, info, instrument};

use crate::base::{
    config::Config,
    types::{ChatId, Res, UserId, Void},
};

use super::{ConversationRecord, DbClient, GenericDbClient, Shortcut};

// Extra methods on `DbClient` applied by the surreal implementation.

impl DbClient {
    /// Creates a new SurrealDB client from the configured endpoint.
    pub async fn surreal(config: &Config) -> Res<Self> {
        let client = SurrealDbClient::new(config).await?;
        Ok(Self { inner: Arc::new(client) })
    }

    /// Creates a new in-memory SurrealDB client.
    pub async fn surreal_memory() -> Res<Self> {
        let client = SurrealDbClient::connect("mem://", None, "dispatch", "bot").await?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Records.

/// Conversation row as stored in the `conversation` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SurrealConversation {
    user_id: i64,
    chat_id: i64,
    last_command: String,
    awaiting_follow_up: bool,
}

/// Shortcut list as stored in the `shortcuts` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SurrealShortcuts {
    user_id: i64,
    entries: Vec<Shortcut>,
}

fn conversation_key(user_id: UserId, chat_id: ChatId) -> String {
    format!("{}_{}", user_id.0, chat_id.0)
}

fn shortcuts_key(user_id: UserId) -> String {
    user_id.0.to_string()
}

// Client.

/// SurrealDB client implementation.
#[derive(Clone)]
struct SurrealDbClient {
    db: Surreal<Any>,
}

impl SurrealDbClient {
    #[instrument(name = "SurrealDbClient::new", skip_all)]
    async fn new(config: &Config) -> Res<Self> {
        let credentials = (!config.db_endpoint.starts_with("mem://")).then(|| (config.db_username.as_str(), config.db_password.as_str()));

        Self::connect(&config.db_endpoint, credentials, &config.db_namespace, &config.db_database).await
    }

    async fn connect(endpoint: &str, credentials: Option<(&str, &str)>, namespace: &str, database: &str) -> Res<Self> {
        let db = any::connect(endpoint).await?;

        if let Some((username, password)) = credentials {
            db.signin(Root { username, password }).await?;
        }

        db.use_ns(namespace).use_db(database).await?;

        // Define schemas.

        // One row per (user, chat) pair; the record id is the pair itself.
        db.query("DEFINE TABLE IF NOT EXISTS conversation SCHEMAFULL").await?;
        db.query(
            "DEFINE FIELD IF NOT EXISTS user_id ON conversation TYPE int;
             DEFINE FIELD IF NOT EXISTS chat_id ON conversation TYPE int;
             DEFINE FIELD IF NOT EXISTS last_command ON conversation TYPE string;
             DEFINE FIELD IF NOT EXISTS awaiting_follow_up ON conversation TYPE bool;",
        )
        .await?;

        db.query("DEFINE TABLE IF NOT EXISTS shortcuts SCHEMALESS").await?;

        info!("Database initialized successfully.");

        Ok(Self { db })
    }
}

#[async_trait]
impl GenericDbClient for SurrealDbClient {
    #[instrument(skip(self))]
    async fn get_conversation_state(&self, user_id: UserId, chat_id: ChatId) -> Res<Option<ConversationRecord>> {
        let row: Option<SurrealConversation> = self.db.select(("conversation", conversation_key(user_id, chat_id))).await?;

        Ok(row.map(|row| ConversationRecord {
            last_command: row.last_command,
            awaiting_follow_up: row.awaiting_follow_up,
        }))
    }

    #[instrument(skip(self))]
    async fn upsert_conversation_state(&self, user_id: UserId, chat_id: ChatId, record: &ConversationRecord) -> Void {
        let row = SurrealConversation {
            user_id: user_id.0,
            chat_id: chat_id.0,
            last_command: record.last_command.clone(),
            awaiting_follow_up: record.awaiting_follow_up,
        };

        let _: Option<SurrealConversation> = self.db.upsert(("conversation", conversation_key(user_id, chat_id))).content(row).await?;

        debug!("Conversation state stored.");

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_shortcuts(&self, user_id: UserId) -> Res<Vec<Shortcut>> {
        let row: Option<SurrealShortcuts> = self.db.select(("shortcuts", shortcuts_key(user_id))).await?;

        Ok(row.map(|row| row.entries).unwrap_or_default())
    }

    #[instrument(skip(self, shortcuts))]
    async fn put_shortcuts(&self, user_id: UserId, shortcuts: &[Shortcut]) -> Void {
        if shortcuts.is_empty() {
            let _: Option<SurrealShortcuts> = self.db.delete(("shortcuts", shortcuts_key(user_id))).await?;
            return Ok(());
        }

        let row = SurrealShortcuts {
            user_id: user_id.0,
            entries: shortcuts.to_vec(),
        };

        let _: Option<SurrealShortcuts> = self.db.upsert(("shortcuts", shortcuts_key(user_id))).content(row).await?;

        Ok(())
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use super::*;

    fn shortcut(name: &str, command: &str) -> Shortcut {
        Shortcut {
            name: name.to_string(),
            command: command.to_string(),
        }
    }

    #[tokio::test]
    async fn missing_conversation_is_none() {
        let db = DbClient::surreal_memory().await.unwrap();

        assert_eq!(db.get_conversation_state(UserId(1), ChatId(2)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn upsert_overwrites_single_row() {
        let db = DbClient::surreal_memory().await.unwrap();
        let first = ConversationRecord {
            last_command: "/shortcuts modify".to_string(),
            awaiting_follow_up: true,
        };
        let second = ConversationRecord {
            last_command: "/weather".to_string(),
            awaiting_follow_up: false,
        };

        db.upsert_conversation_state(UserId(1), ChatId(-100), &first).await.unwrap();
        db.upsert_conversation_state(UserId(1), ChatId(-100), &second).await.unwrap();

        assert_eq!(db.get_conversation_state(UserId(1), ChatId(-100)).await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn conversation_is_keyed_by_user_and_chat() {
        let db = DbClient::surreal_memory().await.unwrap();
        let record = ConversationRecord {
            last_command: "/shortcuts modify".to_string(),
            awaiting_follow_up: true,
        };

        db.upsert_conversation_state(UserId(1), ChatId(1), &record).await.unwrap();

        assert_eq!(db.get_conversation_state(UserId(1), ChatId(2)).await.unwrap(), None);
        assert_eq!(db.get_conversation_state(UserId(2), ChatId(1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn shortcuts_round_trip_and_clear() {
        let db = DbClient::surreal_memory().await.unwrap();
        let entries = vec![shortcut("rain", "/weather rainmap"), shortcut("north", "/weather forecast24 north")];

        assert!(db.get_shortcuts(UserId(7)).await.unwrap().is_empty());

        db.put_shortcuts(UserId(7), &entries).await.unwrap();
        assert_eq!(db.get_shortcuts(UserId(7)).await.unwrap(), entries);

        db.put_shortcuts(UserId(7), &[]).await.unwrap();
        assert!(db.get_shortcuts(UserId(7)).await.unwrap().is_empty());
    }
}
