//! Runtime services and shared state for the dispatch-bot.

use std::sync::Arc;

use anyhow::Context;
use axum::{Router, body::Bytes, extract::State, http::StatusCode, routing::post};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::{
    base::{
        config::Config,
        types::{Res, Void},
    },
    command::{
        CommandHandler,
        registry::Registry,
        shortcuts::{Shortcuts, ShortcutsAlias},
        weather::Weather,
    },
    interaction::{
        dispatch::Dispatcher,
        normalize::Normalizer,
        update::{UpdateContext, handle_update},
    },
    service::{chat::ChatClient, db::DbClient, weather::WeatherClient},
};

/// Runtime service context that can be shared across the application.
///
/// This struct holds the service clients, the handler registry, and configuration.
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct Runtime {
    /// The configuration for the application.
    pub config: Config,
    /// The database client instance.
    pub db: DbClient,
    /// The chat client instance.
    pub chat: ChatClient,
    /// The handler registry, built once at startup.
    pub registry: Arc<Registry>,
    /// The per-update processing context.
    pub context: UpdateContext,
}

impl Runtime {
    /// Create a new runtime instance.
    #[instrument(skip_all)]
    pub async fn new(config: Config) -> Res<Self> {
        // Initialize the database.
        let db = DbClient::surreal(&config).await?;

        // Initialize the outbound clients.
        let chat = ChatClient::telegram(&config)?;
        let weather = WeatherClient::datagov(&config)?;

        Self::with_clients(config, db, chat, weather)
    }

    /// Wire a runtime around existing service clients.
    pub fn with_clients(config: Config, db: DbClient, chat: ChatClient, weather: WeatherClient) -> Res<Self> {
        // Register the handlers.
        let prefix = config.command_prefix;
        let handlers: Vec<Arc<dyn CommandHandler>> = vec![
            Arc::new(Weather::new(prefix, weather)),
            Arc::new(Shortcuts::new(prefix)),
            Arc::new(ShortcutsAlias::new(prefix)),
        ];
        let registry = Arc::new(Registry::new(prefix, handlers)?);

        let context = UpdateContext {
            normalizer: Normalizer::new(chat.clone()),
            dispatcher: Dispatcher::new(registry.clone(), db.clone(), config.greeting_reply.as_str()),
            chat: chat.clone(),
        };

        Ok(Self {
            config,
            db,
            chat,
            registry,
            context,
        })
    }

    /// Registers with the platform, then serves the webhook until shutdown.
    pub async fn start(&self) -> Void {
        futures::future::try_join(self.register_commands(), self.register_webhook()).await?;

        let path = self.config.webhook_path.as_str();
        let app = Router::new().route(path, post(receive_update).get(health)).with_state(self.context.clone());

        let address = format!("{}:{}", self.config.bind_address, self.config.port);
        let listener = tokio::net::TcpListener::bind(&address).await.with_context(|| format!("Unable to bind `{address}`"))?;

        info!("Listening for updates on `{}{}` ...", address, path);

        axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

        info!("Shut down.");

        Ok(())
    }

    #[instrument(skip_all)]
    async fn register_commands(&self) -> Void {
        if !self.config.register_commands {
            return Ok(());
        }

        let commands = self.registry.descriptors();
        self.chat.set_commands(&commands).await?;

        info!("Advertised {} command(s).", commands.len());

        Ok(())
    }

    #[instrument(skip_all)]
    async fn register_webhook(&self) -> Void {
        let Some(public_url) = &self.config.public_url else {
            return Ok(());
        };

        let url = format!("{}{}", public_url.trim_end_matches('/'), self.config.webhook_path);

        let certificate = match &self.config.certificate_path {
            Some(path) => Some(tokio::fs::read(path).await.with_context(|| format!("Unable to read certificate `{path}`"))?),
            None => None,
        };

        self.chat.set_webhook(&url, certificate).await?;

        info!("Webhook registered at `{}`.", url);

        Ok(())
    }
}

/// Accepts one update: 400 if the body is not JSON, otherwise 200 with processing spawned.
async fn receive_update(State(context): State<UpdateContext>, body: Bytes) -> StatusCode {
    match serde_json::from_slice::<Value>(&body) {
        Ok(update) => {
            handle_update(update, context);
            StatusCode::OK
        }
        Err(e) => {
            warn!("Rejected undecodable update: {}", e);
            StatusCode::BAD_REQUEST
        }
    }
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Unable to listen for shutdown signal: {}", e);
        futures::future::pending::<()>().await;
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::service::chat::MockChat;

    async fn context() -> UpdateContext {
        let mut mock = MockChat::new();
        mock.expect_send().returning(|_| Ok(()));
        let chat = ChatClient::new(Arc::new(mock));
        let db = DbClient::surreal_memory().await.unwrap();
        let registry = Arc::new(Registry::new('/', vec![]).unwrap());

        UpdateContext {
            normalizer: Normalizer::new(chat.clone()),
            dispatcher: Dispatcher::new(registry, db, "Beep Boop"),
            chat,
        }
    }

    #[tokio::test]
    async fn undecodable_body_is_rejected() {
        let status = receive_update(State(context().await), Bytes::from_static(b"{not json")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn json_body_is_accepted() {
        let status = receive_update(State(context().await), Bytes::from_static(br#"{"update_id":1,"message":{"from":{"id":1},"chat":{"id":1},"text":"hi"}}"#)).await;

        assert_eq!(status, StatusCode::OK);
    }
}
