//! Segmentation backends.
//!
//! [`build_handle`] turns the `[segmenter]` config section into the shared
//! [`SegmenterHandle`]. Nothing is loaded here; the handle loads its backend
//! on first use (or at startup when `eager_load` is set).

pub mod matte;
#[cfg(feature = "onnx")]
pub mod u2net;

use std::sync::Arc;

use cutout_core::segmenter::{Segmenter, SegmenterHandle};
use cutout_types::config::{SegmenterBackend, SegmenterConfig};
use cutout_types::error::CutoutError;

pub use matte::MatteSegmenter;

/// Build the lazily loading model handle for the configured backend.
///
/// Configuration mistakes that would make every load fail (missing model
/// path, backend not compiled in) are reported here rather than on the
/// first image.
pub fn build_handle(config: &SegmenterConfig) -> Result<SegmenterHandle, CutoutError> {
    match config.backend {
        SegmenterBackend::Matte => {
            let matte = MatteSegmenter::from_config(config);
            Ok(SegmenterHandle::new(
                move || -> Result<Arc<dyn Segmenter>, CutoutError> { Ok(Arc::new(matte.clone())) },
            ))
        }
        SegmenterBackend::U2net => build_u2net(config),
    }
}

#[cfg(feature = "onnx")]
fn build_u2net(config: &SegmenterConfig) -> Result<SegmenterHandle, CutoutError> {
    let model_path = config.model_path.clone().ok_or_else(|| {
        CutoutError::ResourceInit("segmenter.model_path is required for the u2net backend".into())
    })?;
    let intra_threads = config.intra_threads;

    Ok(SegmenterHandle::new(
        move || -> Result<Arc<dyn Segmenter>, CutoutError> {
            let segmenter = u2net::U2NetSegmenter::load(&model_path, intra_threads)?;
            Ok(Arc::new(segmenter))
        },
    ))
}

#[cfg(not(feature = "onnx"))]
fn build_u2net(_config: &SegmenterConfig) -> Result<SegmenterHandle, CutoutError> {
    Err(CutoutError::ResourceInit(
        "the u2net backend requires building with the `onnx` feature".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matte_backend_loads_lazily() {
        let handle = build_handle(&SegmenterConfig::default()).unwrap();
        assert!(!handle.is_loaded());
        let segmenter = handle.acquire().unwrap();
        assert_eq!(segmenter.name(), "matte");
        assert!(handle.is_loaded());
    }

    #[cfg(not(feature = "onnx"))]
    #[test]
    fn u2net_without_feature_is_rejected() {
        let config = SegmenterConfig {
            backend: SegmenterBackend::U2net,
            model_path: Some("/models/u2netp.onnx".into()),
            ..SegmenterConfig::default()
        };
        let err = build_handle(&config).unwrap_err();
        assert!(matches!(err, CutoutError::ResourceInit(msg) if msg.contains("onnx")));
    }

    #[cfg(feature = "onnx")]
    #[test]
    fn u2net_requires_model_path() {
        let config = SegmenterConfig {
            backend: SegmenterBackend::U2net,
            ..SegmenterConfig::default()
        };
        let err = build_handle(&config).unwrap_err();
        assert!(matches!(err, CutoutError::ResourceInit(msg) if msg.contains("model_path")));
    }

    #[cfg(feature = "onnx")]
    #[test]
    fn u2net_missing_file_fails_on_acquire_and_stays_unloaded() {
        let config = SegmenterConfig {
            backend: SegmenterBackend::U2net,
            model_path: Some("/definitely/not/here.onnx".into()),
            ..SegmenterConfig::default()
        };
        let handle = build_handle(&config).unwrap();
        assert!(matches!(handle.acquire(), Err(CutoutError::ResourceInit(_))));
        assert!(!handle.is_loaded());
    }
}
