//! Per-(user, chat) conversation state.
//!
//! A [`Session`] is created fresh for every inbound event. Its first read goes
//! to the repository and is cached for the lifetime of the instance, so an event
//! always observes the latest committed state and never a value cached by an
//! earlier event.

use std::{
    hash::Hash,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::{
    base::types::{ChatId, Res, UserId, Void},
    service::db::{ConversationRecord, DbClient},
};

/// The follow-up state machine of one (user, chat) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowUp {
    /// The next free-text message is not a continuation.
    Idle,
    /// The next free-text message is appended to this command line.
    AwaitingFollowUp(String),
}

impl From<&ConversationRecord> for FollowUp {
    fn from(record: &ConversationRecord) -> Self {
        if record.awaiting_follow_up {
            FollowUp::AwaitingFollowUp(record.last_command.clone())
        } else {
            FollowUp::Idle
        }
    }
}

/// A table of per-key async mutexes.
///
/// An entry lives only while some task holds or waits on its lock.
/// Cloning shares the same table.
pub struct KeyedLocks<K> {
    locks: Arc<DashMap<K, Arc<Mutex<()>>>>,
}

impl<K> Clone for KeyedLocks<K> {
    fn clone(&self) -> Self {
        Self { locks: self.locks.clone() }
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self { locks: Arc::new(DashMap::new()) }
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `work` while holding the lock for `key`.
    pub async fn run<T>(&self, key: K, work: impl Future<Output = T>) -> T {
        // The map guard must be released before awaiting the mutex.
        let lock = self.locks.entry(key.clone()).or_default().value().clone();

        let output = {
            let _guard = lock.lock().await;
            work.await
        };

        // Two references left means the table and this task: nobody else is waiting.
        self.locks.remove_if(&key, |_, entry| Arc::strong_count(entry) == 2);

        output
    }

    /// Number of keys currently locked or waited on.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Keyed write locks for repositories without atomic upserts.
pub type SessionLocks = KeyedLocks<(UserId, ChatId)>;

/// Conversation state of one (user, chat) pair, for one inbound event.
pub struct Session {
    user_id: UserId,
    chat_id: ChatId,
    db: DbClient,
    locks: SessionLocks,
    cached: Mutex<Option<ConversationRecord>>,
    writes: AtomicUsize,
}

impl Session {
    pub fn new(user_id: UserId, chat_id: ChatId, db: DbClient, locks: SessionLocks) -> Self {
        Self {
            user_id,
            chat_id,
            db,
            locks,
            cached: Mutex::new(None),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    async fn record(&self) -> Res<ConversationRecord> {
        let mut cached = self.cached.lock().await;

        if let Some(record) = cached.as_ref() {
            return Ok(record.clone());
        }

        let record = self.db.get_conversation_state(self.user_id, self.chat_id).await?.unwrap_or_default();
        *cached = Some(record.clone());

        Ok(record)
    }

    /// Whether the next free-text message continues the last command.
    ///
    /// A pair with no stored state is not awaiting anything.
    pub async fn is_awaiting_follow_up(&self) -> Res<bool> {
        Ok(self.record().await?.awaiting_follow_up)
    }

    /// The last stored command line, or an empty string.
    pub async fn last_command(&self) -> Res<String> {
        Ok(self.record().await?.last_command)
    }

    pub async fn follow_up(&self) -> Res<FollowUp> {
        Ok(FollowUp::from(&self.record().await?))
    }

    /// Stores `command_line` (trimmed) and the follow-up flag, overwriting any prior value.
    #[instrument(skip(self), fields(user_id = %self.user_id, chat_id = %self.chat_id))]
    pub async fn update(&self, command_line: &str, awaiting_follow_up: bool) -> Void {
        let record = ConversationRecord {
            last_command: command_line.trim().to_string(),
            awaiting_follow_up,
        };

        if self.db.atomic_upsert() {
            self.db.upsert_conversation_state(self.user_id, self.chat_id, &record).await?;
        } else {
            self.locks
                .run((self.user_id, self.chat_id), self.db.upsert_conversation_state(self.user_id, self.chat_id, &record))
                .await?;
        }

        debug!("Session updated.");

        *self.cached.lock().await = Some(record);
        self.writes.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }

    /// How many times [`Session::update`] has succeeded on this instance.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::*;
    use crate::service::db::{GenericDbClient, Shortcut};

    /// A repository that writes the two fields in separate steps.
    #[derive(Default)]
    struct SplitWriteDb {
        rows: std::sync::Mutex<HashMap<(UserId, ChatId), ConversationRecord>>,
    }

    #[async_trait]
    impl GenericDbClient for SplitWriteDb {
        async fn get_conversation_state(&self, user_id: UserId, chat_id: ChatId) -> Res<Option<ConversationRecord>> {
            Ok(self.rows.lock().unwrap().get(&(user_id, chat_id)).cloned())
        }

        async fn upsert_conversation_state(&self, user_id: UserId, chat_id: ChatId, record: &ConversationRecord) -> Void {
            self.rows.lock().unwrap().entry((user_id, chat_id)).or_default().last_command = record.last_command.clone();
            tokio::task::yield_now().await;
            self.rows.lock().unwrap().entry((user_id, chat_id)).or_default().awaiting_follow_up = record.awaiting_follow_up;

            Ok(())
        }

        fn atomic_upsert(&self) -> bool {
            false
        }

        async fn get_shortcuts(&self, _user_id: UserId) -> Res<Vec<Shortcut>> {
            Ok(vec![])
        }

        async fn put_shortcuts(&self, _user_id: UserId, _shortcuts: &[Shortcut]) -> Void {
            Ok(())
        }
    }

    fn memory_session(db: &DbClient) -> Session {
        Session::new(UserId(10), ChatId(20), db.clone(), SessionLocks::new())
    }

    #[tokio::test]
    async fn defaults_for_unknown_pair() {
        let db = DbClient::surreal_memory().await.unwrap();
        let session = memory_session(&db);

        assert!(!session.is_awaiting_follow_up().await.unwrap());
        assert_eq!(session.last_command().await.unwrap(), "");
        assert_eq!(session.follow_up().await.unwrap(), FollowUp::Idle);
    }

    #[tokio::test]
    async fn update_is_visible_to_a_fresh_session() {
        let db = DbClient::surreal_memory().await.unwrap();

        memory_session(&db).update("  /shortcuts modify ", true).await.unwrap();

        let session = memory_session(&db);
        assert!(session.is_awaiting_follow_up().await.unwrap());
        assert_eq!(session.follow_up().await.unwrap(), FollowUp::AwaitingFollowUp("/shortcuts modify".to_string()));
    }

    #[tokio::test]
    async fn reads_are_cached_per_instance() {
        let db = DbClient::surreal_memory().await.unwrap();
        let session = memory_session(&db);

        assert!(!session.is_awaiting_follow_up().await.unwrap());

        // A write from another event is not observed by an instance that already read.
        memory_session(&db).update("/weather", true).await.unwrap();

        assert!(!session.is_awaiting_follow_up().await.unwrap());
        assert!(memory_session(&db).is_awaiting_follow_up().await.unwrap());
    }

    #[tokio::test]
    async fn update_writes_through_and_counts() {
        let db = DbClient::surreal_memory().await.unwrap();
        let session = memory_session(&db);

        assert_eq!(session.write_count(), 0);

        session.update("/shortcuts modify", true).await.unwrap();
        session.update("/shortcuts modify", true).await.unwrap();

        assert_eq!(session.write_count(), 2);
        assert_eq!(session.last_command().await.unwrap(), "/shortcuts modify");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_updates_never_tear() {
        let db = DbClient::new(Arc::new(SplitWriteDb::default()));
        let locks = SessionLocks::new();

        let tasks: Vec<_> = (0..64)
            .map(|i| {
                let db = db.clone();
                let locks = locks.clone();

                tokio::spawn(async move {
                    let session = Session::new(UserId(1), ChatId(1), db, locks);
                    session.update(&format!("/cmd {i}"), i % 2 == 0).await.unwrap();
                })
            })
            .collect();

        for task in futures::future::join_all(tasks).await {
            task.unwrap();
        }

        let record = db.get_conversation_state(UserId(1), ChatId(1)).await.unwrap().unwrap();
        let i: usize = record.last_command.trim_start_matches("/cmd ").parse().unwrap();

        assert_eq!(record.awaiting_follow_up, i % 2 == 0);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn lock_entries_are_dropped_after_use() {
        let locks: KeyedLocks<u32> = KeyedLocks::new();

        let value = locks
            .run(1, async {
                assert_eq!(locks.len(), 1);
                7
            })
            .await;

        assert_eq!(value, 7);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn waiting_task_keeps_the_entry() {
        let locks: KeyedLocks<u32> = KeyedLocks::new();
        let (release, released) = tokio::sync::oneshot::channel::<()>();

        let holder = tokio::spawn({
            let locks = locks.clone();
            async move { locks.run(1, async { released.await.unwrap() }).await }
        });
        while locks.is_empty() {
            tokio::task::yield_now().await;
        }

        let waiter = tokio::spawn({
            let locks = locks.clone();
            async move { locks.run(1, async { 2 }).await }
        });
        tokio::task::yield_now().await;

        release.send(()).unwrap();
        holder.await.unwrap();
        assert_eq!(waiter.await.unwrap(), 2);

        assert!(locks.is_empty());
    }
}
