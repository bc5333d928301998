//! Infrastructure layer for Cutout.
//!
//! Contains the concrete pieces the core crate abstracts over: the
//! `config.toml` loader, the segmentation backends behind the
//! [`cutout_core::segmenter::Segmenter`] trait, and the Telegram Bot API
//! client used by the chat front end.

pub mod config;
pub mod segmenter;
pub mod telegram;
