pub mod telegram;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;

use crate::base::{reply::Reply, types::Void};

// Types.

/// A command advertised to the platform's command menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDescriptor {
    /// The command word, without the prefix.
    pub command: String,
    pub description: String,
}

// Traits.

/// Generic "chat" trait that clients must implement.
///
/// This trait defines the outbound side of the bot: delivering replies and
/// talking to the platform's bot management endpoints. Implementing this trait
/// allows different chat services to be used with the dispatch-bot.
#[async_trait]
pub trait GenericChatClient: Send + Sync + 'static {
    /// Deliver a single reply.
    async fn send(&self, reply: &Reply) -> Void;

    /// Acknowledge an interactive callback so the sender's UI stops showing a
    /// loading state.
    async fn answer_callback(&self, callback_id: &str) -> Void;

    /// Advertise the command list.
    async fn set_commands(&self, commands: &[CommandDescriptor]) -> Void;

    /// Register the webhook URL, optionally uploading a self-signed certificate.
    async fn set_webhook(&self, url: &str, certificate: Option<Vec<u8>>) -> Void;
}

// Structs.

/// Chat client for the application.
///
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<dyn GenericChatClient>,
}

impl Deref for ChatClient {
    type Target = dyn GenericChatClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl ChatClient {
    pub fn new(inner: Arc<dyn GenericChatClient>) -> Self {
        Self { inner }
    }

    /// Deliver replies in order, stopping at the first failure.
    pub async fn send_all(&self, replies: &[Reply]) -> Void {
        for reply in replies {
            self.send(reply).await?;
        }

        Ok(())
    }
}

// Mocks.

#[cfg(test)]
mockall::mock! {
    pub Chat {}

    #[async_trait]
    impl GenericChatClient for Chat {
        async fn send(&self, reply: &Reply) -> Void;
        async fn answer_callback(&self, callback_id: &str) -> Void;
        async fn set_commands(&self, commands: &[CommandDescriptor]) -> Void;
        async fn set_webhook(&self, url: &str, certificate: Option<Vec<u8>>) -> Void;
    }
}
