//! `/shortcuts`: per-user saved command lines, run from inline buttons.
//!
//! `/sc` is an alias for `/shortcuts show`.

use std::str::FromStr;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::{
    base::{
        reply::{InlineKeyboard, ParseMode, Reply},
        types::{ChatId, Res, UserId},
    },
    interaction::session::KeyedLocks,
    service::db::Shortcut,
};

use super::{CommandHandler, FollowUpPolicy, HandlerContext, Invocation};

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unexpected argument: '{0}'")]
pub struct UnexpectedArgument(String);

/// First-level sub-action of `/shortcuts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Modify,
    Show,
    Help,
}

impl FromStr for Action {
    type Err = UnexpectedArgument;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "modify" => Ok(Action::Modify),
            "show" => Ok(Action::Show),
            "help" => Ok(Action::Help),
            other => Err(UnexpectedArgument(other.to_string())),
        }
    }
}

/// A user mistake in a `modify` request.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Rejection {
    message: String,
    detail: Option<String>,
}

impl Rejection {
    fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), detail: None }
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// A change to the saved list, parsed from the tokens after `modify`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Change {
    Add { name: String, command: String },
    Delete(Vec<usize>),
    Edit { index: usize, name: String, command: String },
}

/// Telegram's limit on a button's callback data, which carries a shortcut's command.
const MAX_COMMAND_BYTES: usize = 64;

fn parse_index(token: &str) -> Result<usize, Rejection> {
    token.parse::<usize>().map_err(|e| Rejection::new("Illegal arguments type").with_detail(format!("'{token}': {e}")))
}

fn parse_command(token: &str) -> Result<String, Rejection> {
    if token.len() > MAX_COMMAND_BYTES {
        return Err(Rejection::new("Command too long").with_detail(format!("{} bytes, at most {MAX_COMMAND_BYTES} allowed", token.len())));
    }

    Ok(token.to_string())
}

impl Change {
    /// Parses `<action> <args>...`; `argc` counts the whole invocation.
    fn parse(args: &[String], argc: usize) -> Result<Self, Rejection> {
        let Some(action) = args.first().filter(|_| argc >= 4) else {
            return Err(Rejection::new(format!("Not enough arguments, expected > 3, got {argc}")));
        };

        match (action.as_str(), argc) {
            ("add", 5) => Ok(Change::Add {
                name: args[1].clone(),
                command: parse_command(&args[2])?,
            }),
            ("delete", 4..) => Ok(Change::Delete(args[1..].iter().map(String::as_str).map(parse_index).collect::<Result<_, _>>()?)),
            ("edit", 6) => Ok(Change::Edit {
                index: parse_index(&args[1])?,
                name: args[2].clone(),
                command: parse_command(&args[3])?,
            }),
            ("add" | "delete" | "edit", _) => {
                Err(Rejection::new("Too many/few args.").with_detail(format!("Expected 5 for \"add\", >= 4 for \"delete\", 6 for \"edit\". Got {argc}")))
            }
            (other, _) => Err(Rejection::new(UnexpectedArgument(other.to_string()).to_string())),
        }
    }

    /// Applies the change in place and returns the success message.
    fn apply(self, shortcuts: &mut Vec<Shortcut>) -> Result<&'static str, Rejection> {
        let out_of_range = |index: usize, len: usize| Rejection::new("Index given not in saved list").with_detail(format!("index {index}, {len} saved"));

        match self {
            Change::Add { name, command } => {
                shortcuts.push(Shortcut { name, command });
                Ok("Added!")
            }
            Change::Delete(indexes) => {
                if let Some(&index) = indexes.iter().find(|&&i| i >= shortcuts.len()) {
                    return Err(out_of_range(index, shortcuts.len()));
                }

                let mut position = 0;
                shortcuts.retain(|_| {
                    let keep = !indexes.contains(&position);
                    position += 1;
                    keep
                });

                Ok(if shortcuts.is_empty() { "Success: The list is now empty." } else { "Succeeded!" })
            }
            Change::Edit { index, name, command } => {
                if shortcuts.is_empty() {
                    return Ok("There are no commands to edit");
                }

                let len = shortcuts.len();
                let slot = shortcuts.get_mut(index).ok_or_else(|| out_of_range(index, len))?;
                *slot = Shortcut { name, command };

                Ok("Succeeded!")
            }
        }
    }
}

fn simple_reply(chat_id: ChatId, scope: &str, message: &str) -> Reply {
    Reply::text(chat_id, format!("[{scope}] {message}"))
}

fn failure_reply(chat_id: ChatId, scope: &str, message: &str, detail: Option<&str>) -> Reply {
    let mut text = format!("[{scope}] ERROR: {message}");

    if let Some(detail) = detail {
        text.push_str(&format!("\n\nMore Information: {detail}"));
    }

    Reply::text(chat_id, text)
}

fn help_text(trigger: &str) -> String {
    format!(
        "<b>Shortcuts</b>\n\
         Save command lines you use often and run them with one tap.\n\n\
         <b>Usage</b>\n\
         <code>{trigger} show</code>: list saved shortcuts\n\
         <code>{trigger} modify</code>: add, delete or edit shortcuts\n\
         <code>{trigger} help</code>: show this message"
    )
}

fn modify_help_text(trigger: &str) -> String {
    format!(
        "<b>Reply with one of</b>\n\
         <code>add &lt;name&gt; &lt;command&gt;</code>\n\
         <code>delete &lt;index&gt; [index]...</code>\n\
         <code>edit &lt;index&gt; &lt;name&gt; &lt;command&gt;</code>\n\n\
         Quote names or commands that contain spaces, e.g.\n\
         <code>add \"rain\" \"/weather rainmap\"</code>\n\n\
         Or send the full command: <code>{trigger} modify add ...</code>"
    )
}

/// Replies with the saved list as one button per shortcut.
async fn show(context: &HandlerContext<'_>, scope: &str, full: bool) -> Res<Vec<Reply>> {
    let shortcuts = context.db.get_shortcuts(context.user_id).await?;

    if shortcuts.is_empty() {
        return Ok(vec![simple_reply(context.chat_id, scope, "Your shortcuts list is empty")]);
    }

    let labels: Vec<Vec<String>> = shortcuts
        .iter()
        .enumerate()
        .map(|(i, s)| if full { vec![format!("{i}. {}  [{}]", s.name, s.command)] } else { vec![format!("{i}. {}", s.name)] })
        .collect();
    let data: Vec<Vec<String>> = shortcuts.iter().map(|s| vec![s.command.clone()]).collect();

    Ok(vec![simple_reply(context.chat_id, scope, "Saved shortcuts:").with_keyboard(InlineKeyboard::new(labels, data)?)])
}

/// The `/shortcuts` command.
pub struct Shortcuts {
    trigger: String,
    /// Serializes read-modify-write of each user's list.
    locks: KeyedLocks<UserId>,
}

impl Shortcuts {
    pub fn new(prefix: char) -> Self {
        Self {
            trigger: format!("{prefix}shortcuts"),
            locks: KeyedLocks::new(),
        }
    }

    fn hook_keyboard(&self) -> Res<InlineKeyboard> {
        Ok(InlineKeyboard::new(
            vec![vec!["Modify", "Show"]],
            vec![vec![format!("{} modify", self.trigger), format!("{} show", self.trigger)]],
        )?)
    }

    async fn modify(&self, invocation: &Invocation, context: &HandlerContext<'_>) -> Res<Vec<Reply>> {
        let argc = invocation.tokens().len();
        let scope = invocation.prefix_line(2);

        if argc == 2 {
            let mut replies = show(context, &scope, true).await?;
            replies.push(Reply::text(context.chat_id, modify_help_text(&self.trigger)).with_parse_mode(ParseMode::Html));

            context.session.update(&scope, true).await?;

            return Ok(replies);
        }

        let change = match Change::parse(&invocation.tokens()[2..], argc) {
            Ok(change) => change,
            Err(rejection) => return self.reject(context, &scope, rejection).await,
        };

        let applied = self
            .locks
            .run(context.user_id, async move {
                let mut shortcuts = context.db.get_shortcuts(context.user_id).await?;
                let applied = change.apply(&mut shortcuts);

                if applied.is_ok() {
                    context.db.put_shortcuts(context.user_id, &shortcuts).await?;
                }

                Res::Ok(applied.map(|message| (message, shortcuts.len())))
            })
            .await?;

        match applied {
            Ok((message, count)) => {
                context.session.update(&scope, false).await?;

                info!("User `{}` now has {} shortcut(s).", context.user_id, count);

                Ok(vec![simple_reply(context.chat_id, &scope, message).with_keyboard(self.hook_keyboard()?)])
            }
            Err(rejection) => self.reject(context, &scope, rejection).await,
        }
    }

    /// Reports a mistake and keeps listening for a corrected request.
    async fn reject(&self, context: &HandlerContext<'_>, scope: &str, rejection: Rejection) -> Res<Vec<Reply>> {
        context.session.update(scope, true).await?;

        Ok(vec![failure_reply(context.chat_id, scope, &rejection.message, rejection.detail.as_deref())])
    }
}

#[async_trait]
impl CommandHandler for Shortcuts {
    fn trigger(&self) -> &str {
        &self.trigger
    }

    fn description(&self) -> &str {
        "Set custom messages / commands"
    }

    /// Storage failures leave the user inside the sub-action they were using.
    fn follow_up_policy(&self) -> FollowUpPolicy {
        FollowUpPolicy::RearmOnError { depth: 2 }
    }

    async fn handle(&self, invocation: &Invocation, context: &HandlerContext<'_>) -> Res<Vec<Reply>> {
        let Some(action) = invocation.arguments().first() else {
            return Ok(vec![simple_reply(context.chat_id, &self.trigger, "Select an Option").with_keyboard(self.hook_keyboard()?)]);
        };

        match action.parse::<Action>() {
            Ok(Action::Show) => show(context, &invocation.prefix_line(2), false).await,
            Ok(Action::Modify) => self.modify(invocation, context).await,
            Ok(Action::Help) => Ok(vec![Reply::text(context.chat_id, help_text(&self.trigger)).with_parse_mode(ParseMode::Html)]),
            Err(e) => Ok(vec![failure_reply(context.chat_id, &self.trigger, &e.to_string(), None)]),
        }
    }
}

/// The `/sc` command: `/shortcuts show` in two keystrokes.
pub struct ShortcutsAlias {
    trigger: String,
    scope: String,
}

impl ShortcutsAlias {
    pub fn new(prefix: char) -> Self {
        Self {
            trigger: format!("{prefix}sc"),
            scope: format!("{prefix}shortcuts show"),
        }
    }
}

#[async_trait]
impl CommandHandler for ShortcutsAlias {
    fn trigger(&self) -> &str {
        &self.trigger
    }

    fn description(&self) -> &str {
        "Show saved shortcuts"
    }

    async fn handle(&self, _invocation: &Invocation, context: &HandlerContext<'_>) -> Res<Vec<Reply>> {
        show(context, &self.scope, false).await
    }
}

// Tests.
