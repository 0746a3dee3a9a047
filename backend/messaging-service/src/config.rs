use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;

const DEFAULT_ATTACHMENT_STORE_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone)]
pub struct AttachmentConfig {
    /// Upper bound for a single blob write.
    pub store_timeout: Duration,
    /// When set, blobs are written below this directory instead of memory.
    pub dir: Option<PathBuf>,
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_millis(DEFAULT_ATTACHMENT_STORE_TIMEOUT_MS),
            dir: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub attachments: AttachmentConfig,
    /// JSON array of users loaded into the directory at startup.
    pub seed_users_file: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store_timeout_ms = match lookup("ATTACHMENT_STORE_TIMEOUT_MS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|e| {
                AppError::Config(format!("ATTACHMENT_STORE_TIMEOUT_MS invalid: {e}"))
            })?,
            None => DEFAULT_ATTACHMENT_STORE_TIMEOUT_MS,
        };
        if store_timeout_ms == 0 {
            return Err(AppError::Config(
                "ATTACHMENT_STORE_TIMEOUT_MS must be greater than zero".into(),
            ));
        }

        let non_empty_path = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        };

        Ok(Self {
            attachments: AttachmentConfig {
                store_timeout: Duration::from_millis(store_timeout_ms),
                dir: non_empty_path("ATTACHMENT_DIR"),
            },
            seed_users_file: non_empty_path("SEED_USERS_FILE"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.attachments.store_timeout, Duration::from_secs(30));
        assert!(config.attachments.dir.is_none());
        assert!(config.seed_users_file.is_none());
    }

    #[test]
    fn test_reads_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("ATTACHMENT_STORE_TIMEOUT_MS", "250"),
            ("ATTACHMENT_DIR", "/var/lib/messaging/blobs"),
            ("SEED_USERS_FILE", " "),
        ]))
        .unwrap();
        assert_eq!(config.attachments.store_timeout, Duration::from_millis(250));
        assert_eq!(
            config.attachments.dir,
            Some(PathBuf::from("/var/lib/messaging/blobs"))
        );
        assert!(config.seed_users_file.is_none());
    }

    #[test]
    fn test_rejects_bad_timeout() {
        let err = Config::from_lookup(lookup(&[("ATTACHMENT_STORE_TIMEOUT_MS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));

        let err =
            Config::from_lookup(lookup(&[("ATTACHMENT_STORE_TIMEOUT_MS", "0")])).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
