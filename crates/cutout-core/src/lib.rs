//! Background removal core for Cutout.
//!
//! The ephemeral result store and everything that feeds it: the lazily
//! loaded segmentation model, the bounded blocking worker pool, the TTL
//! reaper, and the [`service::CutoutService`] facade the chat front end
//! talks to. Nothing here knows about the chat transport.

pub mod cutout;
pub mod offload;
pub mod reaper;
pub mod segmenter;
pub mod service;
pub mod store;
