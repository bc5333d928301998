//! Telegram Bot API client.
//!
//! A thin reqwest wrapper over the handful of Bot API methods the chat
//! front end needs: long polling, text messages with inline keyboards,
//! callback answers, file download, and multipart photo/document upload.

pub mod client;
pub mod types;

pub use client::{TelegramClient, TelegramError};
