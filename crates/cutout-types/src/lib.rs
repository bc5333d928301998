//! Shared domain types for Cutout.
//!
//! This crate contains the types shared by every layer of the background
//! removal bot: the owner identifier used as the result cache key, the
//! error taxonomy, and the configuration schema.
//!
//! Zero infrastructure dependencies -- only serde and thiserror.

pub mod config;
pub mod error;
pub mod owner;
