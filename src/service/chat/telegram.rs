//! Telegram Bot API integration for dispatch-bot.
//!
//! This module delivers replies through the Bot API over HTTPS:
//! - `sendMessage` for text replies (with optional inline keyboards)
//! - `sendPhoto` for attachments, as a multipart upload
//! - `answerCallbackQuery`, `setMyCommands`, and `setWebhook`

use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::base::{
    config::Config,
    reply::{Reply, ReplyPayload},
    types::{Res, Void},
};

use super::{ChatClient, CommandDescriptor, GenericChatClient};

// Extra methods on `ChatClient` applied by the telegram implementation.

impl ChatClient {
    /// Creates a new Telegram chat client.
    pub fn telegram(config: &Config) -> Res<Self> {
        let client = TelegramChatClient::new(config)?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Structs.

/// The envelope every Bot API response is wrapped in.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram client implementation.
#[derive(Clone)]
struct TelegramChatClient {
    http: reqwest::Client,
    base_url: String,
}

impl TelegramChatClient {
    fn new(config: &Config) -> Res<Self> {
        let http = reqwest::Client::builder().build()?;
        let base_url = format!("{}/bot{}", config.api_base_url.trim_end_matches('/'), config.bot_token);

        Ok(Self { http, base_url })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    async fn post_json(&self, method: &str, body: &Value) -> Void {
        let response = self.http.post(self.method_url(method)).json(body).send().await?;
        check_response(method, response).await
    }

    async fn post_form(&self, method: &str, form: Form) -> Void {
        let response = self.http.post(self.method_url(method)).multipart(form).send().await?;
        check_response(method, response).await
    }
}

/// Fails unless the Bot API reports success.
async fn check_response(method: &str, response: reqwest::Response) -> Void {
    let status = response.status();
    let body: ApiResponse = response.json().await.map_err(|e| anyhow!("Invalid `{method}` response ({status}): {e}"))?;

    if !body.ok {
        return Err(anyhow!("`{method}` failed ({status}): {}", body.description.unwrap_or_default()));
    }

    debug!("`{method}` succeeded.");

    Ok(())
}

/// Builds the `sendMessage` body for a text reply.
fn message_body(reply: &Reply, text: &str) -> Res<Value> {
    let mut body = json!({
        "chat_id": reply.chat_id.0,
        "text": text,
    });

    if let Some(parse_mode) = reply.parse_mode {
        body["parse_mode"] = json!(parse_mode.as_str());
    }

    if let Some(keyboard) = &reply.keyboard {
        body["reply_markup"] = serde_json::to_value(keyboard)?;
    }

    Ok(body)
}

/// Builds the `sendPhoto` multipart form for an attachment reply.
fn photo_form(reply: &Reply, bytes: &[u8], caption: Option<&str>) -> Res<Form> {
    let mut form = Form::new()
        .text("chat_id", reply.chat_id.0.to_string())
        .part("photo", Part::bytes(bytes.to_vec()).file_name("photo.png").mime_str("image/png")?);

    if let Some(caption) = caption {
        form = form.text("caption", caption.to_string());
    }

    if let Some(parse_mode) = reply.parse_mode {
        form = form.text("parse_mode", parse_mode.as_str());
    }

    if let Some(keyboard) = &reply.keyboard {
        form = form.text("reply_markup", serde_json::to_string(keyboard)?);
    }

    Ok(form)
}

#[async_trait]
impl GenericChatClient for TelegramChatClient {
    #[instrument(skip_all, fields(chat_id = %reply.chat_id))]
    async fn send(&self, reply: &Reply) -> Void {
        match &reply.payload {
            ReplyPayload::Text(text) => self.post_json("sendMessage", &message_body(reply, text)?).await,
            ReplyPayload::Photo { bytes, caption } => self.post_form("sendPhoto", photo_form(reply, bytes, caption.as_deref())?).await,
        }
    }

    #[instrument(skip(self))]
    async fn answer_callback(&self, callback_id: &str) -> Void {
        self.post_json("answerCallbackQuery", &json!({ "callback_query_id": callback_id })).await
    }

    #[instrument(skip_all)]
    async fn set_commands(&self, commands: &[CommandDescriptor]) -> Void {
        let commands: Vec<Value> = commands
            .iter()
            .map(|c| json!({ "command": c.command, "description": c.description }))
            .collect();

        self.post_json("setMyCommands", &json!({ "commands": commands })).await
    }

    #[instrument(skip(self, certificate))]
    async fn set_webhook(&self, url: &str, certificate: Option<Vec<u8>>) -> Void {
        match certificate {
            Some(certificate) => {
                let form = Form::new()
                    .text("url", url.to_string())
                    .part("certificate", Part::bytes(certificate).file_name("certificate.pem"));

                self.post_form("setWebhook", form).await
            }
            None => self.post_json("setWebhook", &json!({ "url": url })).await,
        }
    }
}

// Tests.
