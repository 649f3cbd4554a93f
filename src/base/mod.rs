//! Core components, types, and utilities for the dispatch-bot.
//!
//! This module contains fundamental building blocks used throughout the application:
//! - Configuration handling and environment variables.
//! - Identifiers and result aliases.
//! - Outbound reply values.

pub mod config;
pub mod reply;
pub mod types;
