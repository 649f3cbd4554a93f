//! Library root for `dispatch-bot`.
//!
//! Dispatch-bot is a webhook-driven Telegram bot built around a small
//! conversational command dispatcher:
//! - Commands are routed by their first word to registered handlers
//! - A handler can ask a question; the user's next free-text message is
//!   appended to the stored command line and dispatched again
//! - Inline keyboard buttons send their callback data back as commands
//!
//! The bot integrates with Telegram for chat, SurrealDB for conversation state,
//! and data.gov.sg for weather. The architecture is built around extensible
//! traits that allow for different implementations of each service.

pub mod base;
pub mod command;
pub mod interaction;
pub mod runtime;
pub mod service;

use base::{config::Config, types::Void};
use tracing::info;

/// Public async entry for the binary crate.
///
/// Sets up the services and starts the dispatch-bot runtime:
/// - Creates the runtime context with database, chat, and weather clients
/// - Registers the commands and the webhook with the platform
/// - Serves inbound updates until shutdown
pub async fn start(config: Config) -> Void {
    info!("Starting dispatch-bot ...");

    // Initialize the runtime.
    let runtime = runtime::Runtime::new(config).await?;

    // Start the runtime.
    runtime.start().await?;

    Ok(())
}
