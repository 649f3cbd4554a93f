//! The conversational command dispatcher.
//!
//! Routing of one piece of text, in order:
//! 1. Text starting with the command prefix is a fresh command.
//! 2. Otherwise, if the session is awaiting a follow-up, the text is appended to
//!    the stored command line and dispatched as that command.
//! 3. Otherwise a bare greeting gets a canned reply.
//! 4. Anything else is unrecognized.
//!
//! Before a handler runs, the session is reset to "not awaiting" with the command
//! line being dispatched. A handler that wants another answer re-arms it.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::{
    base::{
        reply::Reply,
        types::{ChatId, CommandEvent, CommandKind, UserId},
    },
    command::{FollowUpPolicy, HandlerContext, Invocation, registry::Registry},
    service::db::DbClient,
};

use super::{
    error::DispatchError,
    session::{FollowUp, Session, SessionLocks},
};

/// Words answered with the greeting reply. Matched case-insensitively.
const GREETINGS: &[&str] = &["hello", "hi"];

/// Splits a command line into shell-style words.
///
/// `#` is an ordinary character: `/cmd #1` is two words, not a command and a comment.
pub fn tokenize(line: &str) -> Result<Vec<String>, DispatchError> {
    shlex::split(&escape_comment_chars(line)).ok_or_else(|| DispatchError::MalformedInput(line.to_string()))
}

/// Backslash-escapes every unquoted `#` so the shell splitter keeps it literally.
fn escape_comment_chars(line: &str) -> String {
    #[derive(Clone, Copy, PartialEq)]
    enum Quote {
        None,
        Single,
        Double,
    }

    let mut escaped = String::with_capacity(line.len());
    let mut quote = Quote::None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Quote::None | Quote::Double, '\\') => {
                escaped.push(c);
                if let Some(next) = chars.next() {
                    escaped.push(next);
                }
                continue;
            }
            (Quote::None, '#') => escaped.push('\\'),
            (Quote::None, '\'') => quote = Quote::Single,
            (Quote::None, '"') => quote = Quote::Double,
            (Quote::Single, '\'') | (Quote::Double, '"') => quote = Quote::None,
            _ => {}
        }

        escaped.push(c);
    }

    escaped
}

/// Dispatches text to registered handlers.
///
/// This is trivially cloneable; clones share the registry and the session lock table.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    db: DbClient,
    locks: SessionLocks,
    greeting_reply: String,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, db: DbClient, greeting_reply: impl Into<String>) -> Self {
        Self {
            registry,
            db,
            locks: SessionLocks::new(),
            greeting_reply: greeting_reply.into(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Routes one piece of (lower-cased) text from a user in a chat.
    #[instrument(skip(self))]
    pub async fn route(&self, user_id: UserId, chat_id: ChatId, text: &str) -> Result<Vec<Reply>, DispatchError> {
        let text = text.trim();
        let session = Session::new(user_id, chat_id, self.db.clone(), self.locks.clone());

        if text.starts_with(self.registry.prefix()) {
            return self.dispatch(&session, text, CommandKind::Command).await;
        }

        if let FollowUp::AwaitingFollowUp(last_command) = session.follow_up().await.map_err(DispatchError::Storage)? {
            let line = format!("{last_command} {text}");
            return self.dispatch(&session, &line, CommandKind::FollowUp).await;
        }

        if GREETINGS.iter().any(|greeting| text.eq_ignore_ascii_case(greeting)) {
            info!(kind = ?CommandKind::Greeting, "Greeting from user `{}`.", user_id);
            return Ok(vec![Reply::text(chat_id, self.greeting_reply.as_str())]);
        }

        debug!(kind = ?CommandKind::Unrecognized, "Nothing to dispatch.");

        Err(DispatchError::Unrecognized)
    }

    async fn dispatch(&self, session: &Session, line: &str, kind: CommandKind) -> Result<Vec<Reply>, DispatchError> {
        let invocation = Invocation::new(tokenize(line)?).ok_or_else(|| DispatchError::MalformedInput(line.to_string()))?;
        let trigger = invocation.trigger().to_string();

        let handler = self.registry.get(&trigger).ok_or_else(|| DispatchError::UnknownCommand { trigger: trigger.clone() })?;

        let event = CommandEvent {
            user_id: session.user_id(),
            chat_id: session.chat_id(),
            kind,
            trigger: trigger.clone(),
            arguments: invocation.arguments().to_vec(),
        };
        info!(?event, "Dispatching command.");

        // Reset before invoking, so a failing handler never leaves a stale flag behind.
        session.update(line, false).await.map_err(DispatchError::Storage)?;
        let writes_before = session.write_count();

        let context = HandlerContext {
            user_id: session.user_id(),
            chat_id: session.chat_id(),
            session,
            db: &self.db,
        };

        match handler.handle(&invocation, &context).await {
            Ok(replies) => Ok(replies),
            Err(source) => {
                let mut follow_up_trusted = session.write_count() > writes_before;

                if !follow_up_trusted && let FollowUpPolicy::RearmOnError { depth } = handler.follow_up_policy() {
                    match session.update(&invocation.prefix_line(depth), true).await {
                        Ok(()) => follow_up_trusted = true,
                        Err(e) => warn!("Failed to re-arm follow-up for `{}`: {}", trigger, e),
                    }
                }

                warn!("Handler `{}` failed: {}", trigger, source);

                Err(DispatchError::Handler {
                    trigger,
                    source,
                    follow_up_trusted,
                })
            }
        }
    }
}

// Tests.
