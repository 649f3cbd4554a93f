//! Command handlers and the contract they implement.
//!
//! A handler is selected by its trigger (the first token of a command line) and
//! receives the full token list along with the (user, chat) context. Handlers
//! that ask the user a question arm the follow-up state through the session in
//! their context, so the user's next free-text message arrives as extra tokens.

pub mod registry;
pub mod shortcuts;
pub mod weather;

use async_trait::async_trait;

use crate::{
    base::{
        reply::Reply,
        types::{ChatId, Res, UserId},
    },
    interaction::session::Session,
    service::db::DbClient,
};

/// A tokenized command line. The first token is always the trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    tokens: Vec<String>,
}

impl Invocation {
    /// Creates an invocation from a non-empty token list.
    pub fn new(tokens: Vec<String>) -> Option<Self> {
        if tokens.is_empty() { None } else { Some(Self { tokens }) }
    }

    pub fn trigger(&self) -> &str {
        &self.tokens[0]
    }

    /// Every token after the trigger.
    pub fn arguments(&self) -> &[String] {
        &self.tokens[1..]
    }

    /// The full token list, trigger included.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// The first `count` tokens joined back into a command line.
    pub fn prefix_line(&self, count: usize) -> String {
        let head = self.tokens.iter().take(count).map(String::as_str);

        shlex::try_join(head.clone()).unwrap_or_else(|_| head.collect::<Vec<_>>().join(" "))
    }
}

/// Everything a handler may use while handling one invocation.
pub struct HandlerContext<'a> {
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub session: &'a Session,
    pub db: &'a DbClient,
}

/// Who re-arms the follow-up state when a handler fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FollowUpPolicy {
    /// The handler arms the follow-up itself, if it wants one.
    #[default]
    HandlerManaged,
    /// If the handler fails without writing session state, the dispatcher arms
    /// the follow-up with the first `depth` tokens of the invocation.
    RearmOnError { depth: usize },
}

/// A registered unit of command logic.
#[async_trait]
pub trait CommandHandler: Send + Sync + 'static {
    /// The command word, prefix included (e.g. `/weather`).
    fn trigger(&self) -> &str;

    /// One-line description advertised in the platform's command menu.
    fn description(&self) -> &str;

    fn follow_up_policy(&self) -> FollowUpPolicy {
        FollowUpPolicy::HandlerManaged
    }

    /// Produce the replies for an invocation.
    async fn handle(&self, invocation: &Invocation, context: &HandlerContext<'_>) -> Res<Vec<Reply>>;
}

// Tests.
