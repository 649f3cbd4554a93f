//! Inbound event handling for dispatch-bot.
//!
//! This module turns platform updates into replies:
//! - Decoding and normalizing updates into `(user, chat, content)`
//! - Tracking per-(user, chat) conversation state
//! - Routing text to command handlers, with follow-up continuation

pub mod dispatch;
pub mod error;
pub mod event;
pub mod normalize;
pub mod session;
pub mod update;
