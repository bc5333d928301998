//! Configuration loader for Cutout.
//!
//! Reads `config.toml` from an explicit path or from the data directory
//! (`~/.cutout/` in production) and deserializes it into [`CutoutConfig`].
//! A missing or malformed file in the data directory falls back to the
//! defaults; a file the user named explicitly must exist and parse.

use std::path::{Path, PathBuf};

use cutout_types::config::CutoutConfig;
use secrecy::SecretString;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "CUTOUT_DATA_DIR";

/// Errors from loading configuration or resolving secrets.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("environment variable {0} is not set")]
    MissingToken(String),
}

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `CUTOUT_DATA_DIR` environment variable
/// 2. `~/.cutout`
/// 3. `.cutout` in the current directory
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".cutout");
    }

    PathBuf::from(".cutout")
}

/// Load configuration.
///
/// - With `explicit`, that file is read and parsed; any failure is an error.
/// - Otherwise `{data_dir}/config.toml` is tried. If it does not exist the
///   defaults are returned; if it cannot be read or parsed a warning is
///   logged and the defaults are returned.
pub async fn load_config(
    explicit: Option<&Path>,
    data_dir: &Path,
) -> Result<CutoutConfig, ConfigError> {
    if let Some(path) = explicit {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!("Loaded config from {}", path.display());
        return Ok(config);
    }

    Ok(load_data_dir_config(data_dir).await)
}

async fn load_data_dir_config(data_dir: &Path) -> CutoutConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return CutoutConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return CutoutConfig::default();
        }
    };

    match toml::from_str::<CutoutConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            CutoutConfig::default()
        }
    }
}

/// Read the bot token from the environment variable named `token_env`.
pub fn resolve_bot_token(token_env: &str) -> Result<SecretString, ConfigError> {
    match std::env::var(token_env) {
        Ok(token) if !token.trim().is_empty() => Ok(SecretString::from(token.trim().to_string())),
        _ => Err(ConfigError::MissingToken(token_env.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutout_types::config::SegmenterBackend;
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(None, tmp.path()).await.unwrap();
        assert_eq!(config, CutoutConfig::default());
    }

    #[tokio::test]
    async fn valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
[store]
ttl_secs = 120

[workers]
workers = 4
max_queue = 0

[segmenter]
backend = "u2net"
model_path = "/models/u2netp.onnx"
"#,
        )
        .await
        .unwrap();

        let config = load_config(None, tmp.path()).await.unwrap();
        assert_eq!(config.store.ttl_secs, 120);
        assert_eq!(config.store.sweep_interval_secs, 300);
        assert_eq!(config.workers.workers, 4);
        assert_eq!(config.workers.queue_limit(), None);
        assert_eq!(config.segmenter.backend, SegmenterBackend::U2net);
        assert_eq!(
            config.segmenter.model_path,
            Some(PathBuf::from("/models/u2netp.onnx"))
        );
    }

    #[tokio::test]
    async fn invalid_toml_in_data_dir_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_config(None, tmp.path()).await.unwrap();
        assert_eq!(config, CutoutConfig::default());
    }

    #[tokio::test]
    async fn explicit_path_wins_over_data_dir() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "[store]\nttl_secs = 1\n")
            .await
            .unwrap();
        let explicit = tmp.path().join("other.toml");
        tokio::fs::write(&explicit, "[store]\nttl_secs = 42\n")
            .await
            .unwrap();

        let config = load_config(Some(&explicit), tmp.path()).await.unwrap();
        assert_eq!(config.store.ttl_secs, 42);
    }

    #[tokio::test]
    async fn explicit_missing_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope.toml");
        let err = load_config(Some(&missing), tmp.path()).await.unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[tokio::test]
    async fn explicit_invalid_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let bad = tmp.path().join("bad.toml");
        tokio::fs::write(&bad, "[workers]\nworkers = \"many\"\n")
            .await
            .unwrap();
        let err = load_config(Some(&bad), tmp.path()).await.unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn resolve_data_dir_from_env() {
        // SAFETY: the variable is unique to this test and restored immediately.
        unsafe {
            std::env::set_var(DATA_DIR_ENV, "/tmp/test-cutout");
        }
        let dir = resolve_data_dir();
        assert_eq!(dir, PathBuf::from("/tmp/test-cutout"));
        unsafe {
            std::env::remove_var(DATA_DIR_ENV);
        }
    }

    #[test]
    fn bot_token_is_read_from_named_variable() {
        // SAFETY: variable names are unique to this test.
        unsafe {
            std::env::set_var("CUTOUT_TEST_TOKEN_PRESENT", " 123:abc \n");
            std::env::remove_var("CUTOUT_TEST_TOKEN_ABSENT");
        }
        let token = resolve_bot_token("CUTOUT_TEST_TOKEN_PRESENT").unwrap();
        assert_eq!(token.expose_secret(), "123:abc");

        let err = resolve_bot_token("CUTOUT_TEST_TOKEN_ABSENT").unwrap_err();
        assert!(matches!(err, ConfigError::MissingToken(name) if name == "CUTOUT_TEST_TOKEN_ABSENT"));
        unsafe {
            std::env::remove_var("CUTOUT_TEST_TOKEN_PRESENT");
        }
    }
}
