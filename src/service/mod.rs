//! Service integrations for external APIs and clients.
//!
//! This module contains implementations for various services used by the dispatch-bot:
//! - Chat services (e.g., the Telegram Bot API)
//! - Database services (e.g., SurrealDB)
//! - Weather data services (e.g., data.gov.sg)
//!
//! Each service module defines both generic traits and concrete implementations,
//! allowing for extensibility and easy testing.

pub mod chat;
pub mod db;
pub mod weather;
