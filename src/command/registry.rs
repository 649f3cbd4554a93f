//! Lookup table from trigger to handler.
//!
//! The registry is built once at startup and never mutated afterwards, so it can
//! be shared behind an `Arc` and read concurrently without synchronization.

use std::{collections::HashMap, sync::Arc};

use thiserror::Error;
use tracing::info;

use crate::service::chat::CommandDescriptor;

use super::CommandHandler;

/// Errors raised while building the registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("trigger `{0}` is registered more than once")]
    DuplicateTrigger(String),
    #[error("trigger `{trigger}` must start with `{prefix}` followed by a command word")]
    InvalidTrigger { trigger: String, prefix: char },
    #[error("trigger `{0}` must be lower-case")]
    NotLowercase(String),
}

/// Immutable mapping from trigger to handler.
pub struct Registry {
    prefix: char,
    order: Vec<String>,
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl Registry {
    /// Builds the registry from an ordered handler list.
    ///
    /// Fails on the first duplicate or malformed trigger.
    pub fn new(prefix: char, handlers: Vec<Arc<dyn CommandHandler>>) -> Result<Self, RegistryError> {
        let mut order = Vec::with_capacity(handlers.len());
        let mut map = HashMap::with_capacity(handlers.len());

        for handler in handlers {
            let trigger = handler.trigger().to_string();
            let word = trigger.strip_prefix(prefix).unwrap_or_default();

            if word.is_empty() || word.chars().any(|c| c.is_whitespace() || c == prefix) {
                return Err(RegistryError::InvalidTrigger { trigger, prefix });
            }

            if trigger != trigger.to_lowercase() {
                return Err(RegistryError::NotLowercase(trigger));
            }

            if map.contains_key(&trigger) {
                return Err(RegistryError::DuplicateTrigger(trigger));
            }

            info!("Registered `{}`.", trigger);

            order.push(trigger.clone());
            map.insert(trigger, handler);
        }

        Ok(Self { prefix, order, handlers: map })
    }

    pub fn prefix(&self) -> char {
        self.prefix
    }

    /// Exact-match lookup of a trigger.
    pub fn get(&self, trigger: &str) -> Option<&Arc<dyn CommandHandler>> {
        self.handlers.get(trigger)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The command list in registration order, prefix stripped.
    pub fn descriptors(&self) -> Vec<CommandDescriptor> {
        self.order
            .iter()
            .filter_map(|trigger| self.handlers.get(trigger))
            .map(|handler| CommandDescriptor {
                command: handler.trigger().trim_start_matches(self.prefix).to_string(),
                description: handler.description().to_string(),
            })
            .collect()
    }
}

// Tests.
