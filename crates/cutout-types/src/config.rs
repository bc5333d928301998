//! Configuration types for Cutout.
//!
//! `CutoutConfig` represents the top-level `config.toml`. Every field has a
//! default so an empty file (or no file at all) yields a working setup.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CutoutConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub workers: WorkerConfig,
    #[serde(default)]
    pub segmenter: SegmenterConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
}

/// Result store retention settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Maximum age of an unclaimed result before eviction.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Period between reaper sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_ttl_secs() -> u64 {
    600
}

fn default_sweep_interval_secs() -> u64 {
    300
}

impl StoreConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        // A zero period would make tokio's interval panic.
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Blocking worker pool settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of segmentation jobs allowed to run at once.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Jobs allowed to wait for a free worker. `0` means unbounded.
    #[serde(default = "default_max_queue")]
    pub max_queue: usize,

    /// Per-job time budget. `0` disables the timeout.
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
}

fn default_workers() -> usize {
    2
}

fn default_max_queue() -> usize {
    32
}

fn default_job_timeout_secs() -> u64 {
    120
}

impl WorkerConfig {
    pub fn job_timeout(&self) -> Option<Duration> {
        (self.job_timeout_secs > 0).then(|| Duration::from_secs(self.job_timeout_secs))
    }

    pub fn queue_limit(&self) -> Option<usize> {
        (self.max_queue > 0).then_some(self.max_queue)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_queue: default_max_queue(),
            job_timeout_secs: default_job_timeout_secs(),
        }
    }
}

/// Which segmentation implementation backs the shared model handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SegmenterBackend {
    /// Pure-Rust border-color matting.
    #[default]
    Matte,
    /// U2-Net (or u2netp) ONNX model; requires the `onnx` feature.
    U2net,
}

impl std::fmt::Display for SegmenterBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SegmenterBackend::Matte => write!(f, "matte"),
            SegmenterBackend::U2net => write!(f, "u2net"),
        }
    }
}

/// Segmentation model settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmenterConfig {
    #[serde(default)]
    pub backend: SegmenterBackend,

    /// Path to the `.onnx` file for the U2-Net backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,

    /// ONNX intra-op threads (0 = runtime default).
    #[serde(default)]
    pub intra_threads: usize,

    /// Load the model at startup instead of on the first image.
    #[serde(default)]
    pub eager_load: bool,

    /// Color distance (0-255 scale) under which a pixel counts as background.
    #[serde(default = "default_matte_tolerance")]
    pub matte_tolerance: f32,

    /// Width of the soft alpha ramp above the tolerance.
    #[serde(default = "default_matte_softness")]
    pub matte_softness: f32,

    /// Gaussian blur sigma applied to the alpha mask edges (0 disables).
    #[serde(default = "default_matte_feather")]
    pub matte_feather: u32,
}

fn default_matte_tolerance() -> f32 {
    28.0
}

fn default_matte_softness() -> f32 {
    24.0
}

fn default_matte_feather() -> u32 {
    1
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            backend: SegmenterBackend::default(),
            model_path: None,
            intra_threads: 0,
            eager_load: false,
            matte_tolerance: default_matte_tolerance(),
            matte_softness: default_matte_softness(),
            matte_feather: default_matte_feather(),
        }
    }
}

/// Input admission limits enforced by the chat front end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_input_bytes")]
    pub max_input_bytes: u64,
}

fn default_max_input_bytes() -> u64 {
    10 * 1024 * 1024
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_input_bytes: default_max_input_bytes(),
        }
    }
}

/// Telegram Bot API connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Name of the environment variable holding the bot token.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Long-poll timeout passed to `getUpdates`.
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
}

fn default_token_env() -> String {
    "BOT_TOKEN".to_string()
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_timeout_secs() -> u64 {
    30
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token_env: default_token_env(),
            api_base: default_api_base(),
            poll_timeout_secs: default_poll_timeout_secs(),
        }
    }
}
