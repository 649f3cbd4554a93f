//! The unit of work for one inbound update: decode, normalize, dispatch, deliver.

use serde_json::Value;
use tracing::{Instrument, error, info, instrument, warn};

use crate::{
    base::{reply::Reply, types::Void},
    service::chat::ChatClient,
};

use super::{
    dispatch::Dispatcher,
    event::InboundEvent,
    normalize::{Content, Normalizer},
};

const UNSUPPORTED_REPLY: &str = "Current type is not supported";
const EMPTY_REPLY: &str = "No data is sent";

/// Everything one unit of work needs.
///
/// This is trivially cloneable, so each spawned task owns its own copy.
#[derive(Clone)]
pub struct UpdateContext {
    pub normalizer: Normalizer,
    pub dispatcher: Dispatcher,
    pub chat: ChatClient,
}

/// Spawns the processing of one update; errors are logged.
#[instrument(skip_all)]
pub fn handle_update(update: Value, context: UpdateContext) {
    tokio::spawn(async move {
        let result = process_update(&update, &context).in_current_span().await;

        if let Err(err) = &result {
            error!("Error while handling update: {}", err);
        }
    });
}

/// Processes one update to completion, delivering any replies.
#[instrument(skip_all)]
pub async fn process_update(update: &Value, context: &UpdateContext) -> Void {
    let event = InboundEvent::from_update(update);

    let replies = match context.normalizer.normalize(&event).await {
        Ok(None) => {
            info!("Ignoring `{}` update.", event.kind());
            return Ok(());
        }
        Ok(Some(normalized)) => {
            let chat_id = normalized.chat_id;

            match normalized.content {
                Content::Text(text) => {
                    let text = text.to_lowercase();

                    match context.dispatcher.route(normalized.user_id, chat_id, text.trim()).await {
                        Ok(replies) => replies,
                        Err(e) => {
                            warn!("Dispatch failed: {}", e);
                            vec![Reply::text(chat_id, e.user_message())]
                        }
                    }
                }
                Content::Location(_) | Content::Unsupported(_) => vec![Reply::text(chat_id, UNSUPPORTED_REPLY)],
                Content::Empty => vec![Reply::text(chat_id, EMPTY_REPLY)],
            }
        }
        Err(e) => {
            warn!("Unable to normalize `{}` update: {}", event.kind(), e);

            match e.reply_chat_id() {
                Some(chat_id) => vec![Reply::text(chat_id, format!("Unexpected error has occured: {e}"))],
                None => return Ok(()),
            }
        }
    };

    context.chat.send_all(&replies).await
}

// Tests.

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;
    use crate::{
        base::types::ChatId,
        command::registry::Registry,
        service::{chat::MockChat, db::DbClient},
    };

    async fn context_with(mock: MockChat) -> UpdateContext {
        let chat = ChatClient::new(Arc::new(mock));
        let db = DbClient::surreal_memory().await.unwrap();
        let registry = Arc::new(Registry::new('/', vec![]).unwrap());

        UpdateContext {
            normalizer: Normalizer::new(chat.clone()),
            dispatcher: Dispatcher::new(registry, db, "Beep Boop"),
            chat,
        }
    }

    fn recording_chat() -> (MockChat, Arc<Mutex<Vec<Reply>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let recorded = sent.clone();

        let mut mock = MockChat::new();
        mock.expect_answer_callback().returning(|_| Ok(()));
        mock.expect_send().returning(move |reply| {
            recorded.lock().unwrap().push(reply.clone());
            Ok(())
        });

        (mock, sent)
    }

    #[tokio::test]
    async fn greeting_is_case_insensitive() {
        let (mock, sent) = recording_chat();
        let context = context_with(mock).await;

        process_update(&json!({ "update_id": 1, "message": { "from": { "id": 4 }, "chat": { "id": 4 }, "text": "  HeLLo " } }), &context)
            .await
            .unwrap();

        assert_eq!(*sent.lock().unwrap(), vec![Reply::text(ChatId(4), "Beep Boop")]);
    }

    #[tokio::test]
    async fn dispatch_errors_become_replies() {
        let (mock, sent) = recording_chat();
        let context = context_with(mock).await;

        process_update(&json!({ "update_id": 1, "message": { "from": { "id": 4 }, "chat": { "id": 8 }, "text": "/nope" } }), &context)
            .await
            .unwrap();
        process_update(&json!({ "update_id": 2, "message": { "from": { "id": 4 }, "chat": { "id": 8 }, "text": "what" } }), &context)
            .await
            .unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(sent[0].as_text(), Some("Unknown command: /nope"));
        assert_eq!(sent[1].as_text(), Some("Not Supported"));
    }

    #[tokio::test]
    async fn unsupported_and_empty_content_are_reported_differently() {
        let (mock, sent) = recording_chat();
        let context = context_with(mock).await;

        process_update(&json!({ "message": { "from": { "id": 4 }, "chat": { "id": 4 }, "location": { "longitude": 1.0, "latitude": 2.0 } } }), &context)
            .await
            .unwrap();
        process_update(&json!({ "message": { "from": { "id": 4 }, "chat": { "id": 4 } } }), &context).await.unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(sent[0].as_text(), Some(UNSUPPORTED_REPLY));
        assert_eq!(sent[1].as_text(), Some(EMPTY_REPLY));
    }

    #[tokio::test]
    async fn missing_sender_replies_only_when_chat_is_known() {
        let (mock, sent) = recording_chat();
        let context = context_with(mock).await;

        process_update(&json!({ "message": { "chat": { "id": 6 }, "text": "hi" } }), &context).await.unwrap();
        process_update(&json!({ "message": { "text": "hi" } }), &context).await.unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].chat_id, ChatId(6));
    }

    #[tokio::test]
    async fn ignored_updates_send_nothing() {
        let mut mock = MockChat::new();
        mock.expect_send().never();
        let context = context_with(mock).await;

        process_update(&json!({ "update_id": 1, "edited_message": { "text": "hi" } }), &context).await.unwrap();
    }

    #[tokio::test]
    async fn delivery_failure_is_returned() {
        let mut mock = MockChat::new();
        mock.expect_send().times(1).returning(|_| Err(anyhow::anyhow!("blocked by user")));
        let context = context_with(mock).await;

        let result = process_update(&json!({ "message": { "from": { "id": 4 }, "chat": { "id": 4 }, "text": "hi" } }), &context).await;

        assert!(result.is_err());
    }
}
