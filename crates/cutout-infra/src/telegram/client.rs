//! TelegramClient -- HTTPS client for the Telegram Bot API.
//!
//! The bot token is wrapped in [`secrecy::SecretString`]. It is part of
//! every request URL, so transport errors are stripped of their URL before
//! they leave this module and the token never reaches logs.

use std::fmt;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use super::types::{ApiResponse, File, InlineKeyboardMarkup, Message, Update};

/// Slack added to the long-poll timeout for the HTTP request itself.
const POLL_SLACK: Duration = Duration::from_secs(10);

/// Errors from Bot API calls.
#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    #[error("telegram transport error: {0}")]
    Http(reqwest::Error),

    #[error("telegram api error {code:?}: {description}")]
    Api {
        code: Option<i64>,
        description: String,
    },

    #[error("unexpected telegram response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("file of {size} bytes exceeds limit of {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("telegram returned no download path for the file")]
    MissingFilePath,
}

impl From<reqwest::Error> for TelegramError {
    fn from(e: reqwest::Error) -> Self {
        // The request URL embeds the bot token.
        TelegramError::Http(e.without_url())
    }
}

/// Telegram Bot API client.
pub struct TelegramClient {
    http: reqwest::Client,
    token: SecretString,
    api_base: String,
    poll_timeout: Duration,
}

impl TelegramClient {
    /// Create a client.
    ///
    /// * `token` - bot token from BotFather
    /// * `api_base` - API root, normally `https://api.telegram.org`
    /// * `poll_timeout` - long-poll wait passed to `getUpdates`
    pub fn new(
        token: SecretString,
        api_base: impl Into<String>,
        poll_timeout: Duration,
    ) -> Result<Self, TelegramError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            http,
            token,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            poll_timeout,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token.expose_secret(), method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!(
            "{}/file/bot{}/{}",
            self.api_base,
            self.token.expose_secret(),
            file_path
        )
    }

    async fn call<P, R>(&self, method: &str, params: &P) -> Result<R, TelegramError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .http
            .post(self.method_url(method))
            .json(params)
            .send()
            .await?;
        let body = response.bytes().await?;
        decode_response(&body)
    }

    async fn upload<R>(&self, method: &str, form: Form) -> Result<R, TelegramError>
    where
        R: DeserializeOwned,
    {
        let response = self
            .http
            .post(self.method_url(method))
            .multipart(form)
            .send()
            .await?;
        let body = response.bytes().await?;
        decode_response(&body)
    }

    /// Long-poll for updates after `offset`.
    pub async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>, TelegramError> {
        let params = json!({
            "offset": offset,
            "timeout": self.poll_timeout.as_secs(),
            "allowed_updates": ["message", "callback_query"],
        });
        let response = self
            .http
            .post(self.method_url("getUpdates"))
            .timeout(self.poll_timeout + POLL_SLACK)
            .json(&params)
            .send()
            .await?;
        let body = response.bytes().await?;
        decode_response(&body)
    }

    /// Send an HTML-formatted text message.
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<Message, TelegramError> {
        let mut params = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
        });
        if let Some(markup) = reply_markup {
            params["reply_markup"] = serde_json::to_value(markup)?;
        }
        self.call("sendMessage", &params).await
    }

    pub async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), TelegramError> {
        let params = json!({ "chat_id": chat_id, "message_id": message_id });
        let _: bool = self.call("deleteMessage", &params).await?;
        Ok(())
    }

    /// Acknowledge a button press, optionally with a toast.
    pub async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
    ) -> Result<(), TelegramError> {
        let params = json!({ "callback_query_id": callback_query_id, "text": text });
        let _: bool = self.call("answerCallbackQuery", &params).await?;
        Ok(())
    }

    pub async fn get_file(&self, file_id: &str) -> Result<File, TelegramError> {
        self.call("getFile", &json!({ "file_id": file_id })).await
    }

    /// Resolve and download a file, refusing anything over `max_bytes`.
    pub async fn download_file(&self, file_id: &str, max_bytes: u64) -> Result<Vec<u8>, TelegramError> {
        let file = self.get_file(file_id).await?;
        if let Some(size) = file.file_size {
            if size > max_bytes {
                return Err(TelegramError::FileTooLarge {
                    size,
                    limit: max_bytes,
                });
            }
        }
        let path = file.file_path.ok_or(TelegramError::MissingFilePath)?;

        let response = self
            .http
            .get(self.file_url(&path))
            .send()
            .await?
            .error_for_status()?;
        if let Some(len) = response.content_length() {
            if len > max_bytes {
                return Err(TelegramError::FileTooLarge {
                    size: len,
                    limit: max_bytes,
                });
            }
        }

        read_capped(response, max_bytes).await
    }

    /// Upload a PNG as a document; transparency survives.
    pub async fn send_document(
        &self,
        chat_id: i64,
        png: Vec<u8>,
        file_name: &str,
        caption: &str,
    ) -> Result<Message, TelegramError> {
        let form = png_form(chat_id, caption, "document", png, file_name)?;
        self.upload("sendDocument", form).await
    }

    /// Upload a PNG as a photo; Telegram recompresses it.
    pub async fn send_photo(
        &self,
        chat_id: i64,
        png: Vec<u8>,
        file_name: &str,
        caption: &str,
    ) -> Result<Message, TelegramError> {
        let form = png_form(chat_id, caption, "photo", png, file_name)?;
        self.upload("sendPhoto", form).await
    }
}

impl fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramClient")
            .field("api_base", &self.api_base)
            .field("poll_timeout", &self.poll_timeout)
            .finish_non_exhaustive()
    }
}

fn png_form(
    chat_id: i64,
    caption: &str,
    field: &'static str,
    png: Vec<u8>,
    file_name: &str,
) -> Result<Form, TelegramError> {
    let part = Part::bytes(png)
        .file_name(file_name.to_string())
        .mime_str("image/png")?;
    Ok(Form::new()
        .text("chat_id", chat_id.to_string())
        .text("caption", caption.to_string())
        .text("parse_mode", "HTML")
        .part(field, part))
}

/// Unwrap the Bot API envelope.
fn decode_response<R: DeserializeOwned>(body: &[u8]) -> Result<R, TelegramError> {
    let envelope: ApiResponse<R> = serde_json::from_slice(body)?;
    match (envelope.ok, envelope.result) {
        (true, Some(result)) => Ok(result),
        (true, None) => Err(TelegramError::Api {
            code: None,
            description: "ok response without result".to_string(),
        }),
        (false, _) => Err(TelegramError::Api {
            code: envelope.error_code,
            description: envelope
                .description
                .unwrap_or_else(|| "unknown error".to_string()),
        }),
    }
}

/// Read a response body, giving up as soon as it grows past `max_bytes`.
async fn read_capped(mut response: reqwest::Response, max_bytes: u64) -> Result<Vec<u8>, TelegramError> {
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let size = (body.len() + chunk.len()) as u64;
        if size > max_bytes {
            return Err(TelegramError::FileTooLarge {
                size,
                limit: max_bytes,
            });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> TelegramClient {
        TelegramClient::new(
            SecretString::from("123:secret-token"),
            "https://api.example.org/",
            Duration::from_secs(30),
        )
        .unwrap()
    }

    #[test]
    fn urls_embed_token_and_trim_base() {
        let c = client();
        assert_eq!(
            c.method_url("getMe"),
            "https://api.example.org/bot123:secret-token/getMe"
        );
        assert_eq!(
            c.file_url("photos/file_1.jpg"),
            "https://api.example.org/file/bot123:secret-token/photos/file_1.jpg"
        );
    }

    #[test]
    fn debug_output_hides_token() {
        let debug = format!("{:?}", client());
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("api.example.org"));
    }

    #[test]
    fn decode_ok_envelope() {
        let ok: bool = decode_response(br#"{"ok": true, "result": true}"#).unwrap();
        assert!(ok);
    }

    #[test]
    fn decode_error_envelope() {
        let err = decode_response::<bool>(
            br#"{"ok": false, "error_code": 400, "description": "Bad Request: message to delete not found"}"#,
        )
        .unwrap_err();
        match err {
            TelegramError::Api { code, description } => {
                assert_eq!(code, Some(400));
                assert!(description.contains("not found"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn decode_garbage_is_decode_error() {
        let err = decode_response::<bool>(b"<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, TelegramError::Decode(_)));
    }

    /// Serve one HTTP response with no `Content-Length`, closing the
    /// connection to end the body.
    async fn serve_unsized(body: Vec<u8>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 4096];
            let _ = socket.read(&mut request).await;
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n")
                .await;
            let _ = socket.write_all(&body).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}/file/photo.jpg")
    }

    async fn fetch(url: &str) -> reqwest::Response {
        let http = reqwest::Client::builder().no_proxy().build().unwrap();
        let response = http.get(url).send().await.unwrap();
        assert_eq!(response.content_length(), None);
        response
    }

    #[tokio::test]
    async fn unsized_body_over_limit_is_refused() {
        let url = serve_unsized(vec![7u8; 256 * 1024]).await;
        let err = read_capped(fetch(&url).await, 1024).await.unwrap_err();
        match err {
            TelegramError::FileTooLarge { size, limit } => {
                assert_eq!(limit, 1024);
                assert!(size > 1024);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unsized_body_within_limit_is_read_whole() {
        let url = serve_unsized(vec![3u8; 5000]).await;
        let body = read_capped(fetch(&url).await, 8192).await.unwrap();
        assert_eq!(body, vec![3u8; 5000]);
    }

    #[test]
    fn png_form_builds() {
        assert!(png_form(1, "caption", "document", vec![1, 2, 3], "x.png").is_ok());
    }
}
