use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use orderkato_core::config::TelegramConfig;

use crate::render::OutboundMessage;

/// One long-poll update. Exactly one of the payload fields is set per update
/// in practice; unknown update kinds deserialize with both `None` and are
/// skipped by the dispatcher.
#[derive(Clone, Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    /// Present when the photo arrived compressed. Compressed uploads lose
    /// their metadata, so the freshness gate rejects them up front.
    #[serde(default)]
    pub photo: Option<Vec<PhotoSize>>,
    #[serde(default)]
    pub document: Option<Document>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    pub first_name: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Document {
    pub file_id: String,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("telegram transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("telegram api rejected the call: {0}")]
    Rejected(String),
}

/// Every Bot API response wraps its payload in this envelope.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileInfo {
    file_path: String,
}

#[derive(Debug, Serialize)]
struct GetUpdatesCall {
    offset: i64,
    timeout: u64,
    allowed_updates: [&'static str; 2],
}

#[derive(Debug, Serialize)]
struct SendMessageCall<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<&'a crate::keyboard::InlineKeyboard>,
}

#[derive(Debug, Serialize)]
struct EditMessageTextCall<'a> {
    chat_id: i64,
    message_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<&'a crate::keyboard::InlineKeyboard>,
}

#[derive(Debug, Serialize)]
struct AnswerCallbackCall<'a> {
    callback_query_id: &'a str,
}

/// Thin Bot API client. The token never appears in logs or errors; it only
/// ever reaches the request URL.
pub struct BotApi {
    http: reqwest::Client,
    base_url: String,
    token: SecretString,
    poll_timeout_secs: u64,
}

impl BotApi {
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.api_base_url.trim_end_matches('/').to_owned(),
            token: config.bot_token.clone(),
            poll_timeout_secs: config.poll_timeout_secs,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token.expose_secret(), method)
    }

    async fn call<B, T>(&self, method: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let response = self
            .http
            .post(self.method_url(method))
            .json(body)
            .send()
            .await?
            .json::<ApiResponse<T>>()
            .await?;
        match response {
            ApiResponse { ok: true, result: Some(result), .. } => Ok(result),
            ApiResponse { description, .. } => Err(ApiError::Rejected(
                description.unwrap_or_else(|| format!("{method} returned no payload")),
            )),
        }
    }

    /// Long-polls for updates newer than `offset`. Blocks server-side up to
    /// the configured timeout, so an idle bot costs one request per timeout.
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, ApiError> {
        self.call(
            "getUpdates",
            &GetUpdatesCall {
                offset,
                timeout: self.poll_timeout_secs,
                allowed_updates: ["message", "callback_query"],
            },
        )
        .await
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        message: &OutboundMessage,
    ) -> Result<(), ApiError> {
        let call = SendMessageCall {
            chat_id,
            text: &message.text,
            reply_markup: message.keyboard.as_ref(),
        };
        self.call::<_, serde_json::Value>("sendMessage", &call).await?;
        Ok(())
    }

    pub async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        message: &OutboundMessage,
    ) -> Result<(), ApiError> {
        let call = EditMessageTextCall {
            chat_id,
            message_id,
            text: &message.text,
            reply_markup: message.keyboard.as_ref(),
        };
        self.call::<_, serde_json::Value>("editMessageText", &call).await?;
        Ok(())
    }

    /// Acknowledges a button press so the client stops showing a spinner.
    pub async fn answer_callback(&self, callback_query_id: &str) -> Result<(), ApiError> {
        self.call::<_, serde_json::Value>(
            "answerCallbackQuery",
            &AnswerCallbackCall { callback_query_id },
        )
        .await?;
        Ok(())
    }

    /// Resolves a `file_id` and downloads its bytes.
    pub async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, ApiError> {
        let info: FileInfo =
            self.call("getFile", &serde_json::json!({ "file_id": file_id })).await?;
        let url = format!(
            "{}/file/bot{}/{}",
            self.base_url,
            self.token.expose_secret(),
            info.file_path,
        );
        let bytes = self.http.get(url).send().await?.error_for_status()?.bytes().await?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::{ApiResponse, Update};

    #[test]
    fn updates_deserialize_from_the_wire_shape() {
        let raw = r#"{
            "ok": true,
            "result": [
                {
                    "update_id": 101,
                    "message": {
                        "message_id": 7,
                        "from": {"id": 55, "username": "nika", "first_name": "Nika"},
                        "chat": {"id": 55},
                        "text": "/order"
                    }
                },
                {
                    "update_id": 102,
                    "callback_query": {
                        "id": "cb-1",
                        "from": {"id": 55, "username": "nika", "first_name": "Nika"},
                        "data": "area:3"
                    }
                }
            ]
        }"#;
        let parsed: ApiResponse<Vec<Update>> = serde_json::from_str(raw).expect("parse");
        let updates = parsed.result.expect("result");
        assert_eq!(updates.len(), 2);
        assert_eq!(
            updates[0].message.as_ref().and_then(|m| m.text.as_deref()),
            Some("/order"),
        );
        assert_eq!(
            updates[1].callback_query.as_ref().and_then(|q| q.data.as_deref()),
            Some("area:3"),
        );
    }

    #[test]
    fn error_envelopes_surface_the_description() {
        let raw = r#"{"ok": false, "description": "Unauthorized"}"#;
        let parsed: ApiResponse<Vec<Update>> = serde_json::from_str(raw).expect("parse");
        assert!(!parsed.ok);
        assert_eq!(parsed.description.as_deref(), Some("Unauthorized"));
    }
}
