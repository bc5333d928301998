//! Chat transport abstraction.
//!
//! The router talks to the chat network only through [`ChatTransport`], so
//! it can be driven by an in-memory transport in tests.

use std::future::Future;

use cutout_infra::telegram::types::{InlineKeyboardMarkup, Update};
use cutout_infra::telegram::{TelegramClient, TelegramError};

/// Outbound and inbound chat operations used by the bot.
pub trait ChatTransport: Send + Sync {
    /// Long-poll for updates after `offset`.
    fn get_updates(
        &self,
        offset: Option<i64>,
    ) -> impl Future<Output = Result<Vec<Update>, TelegramError>> + Send;

    /// Send a text message. Returns the new message id.
    fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboardMarkup>,
    ) -> impl Future<Output = Result<i64, TelegramError>> + Send;

    fn delete_message(
        &self,
        chat_id: i64,
        message_id: i64,
    ) -> impl Future<Output = Result<(), TelegramError>> + Send;

    fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> impl Future<Output = Result<(), TelegramError>> + Send;

    /// Fetch an uploaded file, refusing anything over `max_bytes`.
    fn download(
        &self,
        file_id: &str,
        max_bytes: u64,
    ) -> impl Future<Output = Result<Vec<u8>, TelegramError>> + Send;

    fn send_document(
        &self,
        chat_id: i64,
        png: Vec<u8>,
        file_name: &str,
        caption: &str,
    ) -> impl Future<Output = Result<(), TelegramError>> + Send;

    fn send_photo(
        &self,
        chat_id: i64,
        png: Vec<u8>,
        file_name: &str,
        caption: &str,
    ) -> impl Future<Output = Result<(), TelegramError>> + Send;
}

impl ChatTransport for TelegramClient {
    async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>, TelegramError> {
        TelegramClient::get_updates(self, offset).await
    }

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboardMarkup>,
    ) -> Result<i64, TelegramError> {
        TelegramClient::send_message(self, chat_id, text, keyboard)
            .await
            .map(|m| m.message_id)
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), TelegramError> {
        TelegramClient::delete_message(self, chat_id, message_id).await
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> Result<(), TelegramError> {
        self.answer_callback_query(callback_id, text).await
    }

    async fn download(&self, file_id: &str, max_bytes: u64) -> Result<Vec<u8>, TelegramError> {
        self.download_file(file_id, max_bytes).await
    }

    async fn send_document(
        &self,
        chat_id: i64,
        png: Vec<u8>,
        file_name: &str,
        caption: &str,
    ) -> Result<(), TelegramError> {
        TelegramClient::send_document(self, chat_id, png, file_name, caption)
            .await
            .map(|_| ())
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        png: Vec<u8>,
        file_name: &str,
        caption: &str,
    ) -> Result<(), TelegramError> {
        TelegramClient::send_photo(self, chat_id, png, file_name, caption)
            .await
            .map(|_| ())
    }
}
