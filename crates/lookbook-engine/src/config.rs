use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MAX_SOURCE_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    Unconfigured,
    Local {
        root: PathBuf,
        public_base_url: Option<String>,
    },
    Http {
        endpoint: String,
        token: Option<String>,
        public_base_url: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub gemini_api_key: Option<String>,
    pub gemini_api_base: String,
    pub image_models: Vec<String>,
    pub model_timeout: Duration,
    pub transport_retries: usize,
    pub retry_backoff: Duration,
    pub fetch_timeout: Duration,
    pub max_source_bytes: u64,
    pub data_dir: PathBuf,
    pub storage: StorageConfig,
    pub background_removal_key: Option<String>,
    pub production: bool,
    pub dryrun: bool,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; values are trimmed and blanks ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let image_models = get("LOOKBOOK_IMAGE_MODELS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let public_base_url = get("LOOKBOOK_PUBLIC_BASE_URL")
            .map(|value| value.trim_end_matches('/').to_string());
        let storage = match (get("LOOKBOOK_STORAGE_ENDPOINT"), get("LOOKBOOK_STORAGE_DIR")) {
            (Some(endpoint), _) => match public_base_url.clone() {
                Some(public_base_url) => StorageConfig::Http {
                    endpoint: endpoint.trim_end_matches('/').to_string(),
                    token: get("LOOKBOOK_STORAGE_TOKEN"),
                    public_base_url,
                },
                None => StorageConfig::Unconfigured,
            },
            (None, Some(root)) => StorageConfig::Local {
                root: PathBuf::from(root),
                public_base_url,
            },
            (None, None) => StorageConfig::Unconfigured,
        };

        Self {
            gemini_api_key: get("GEMINI_API_KEY").or_else(|| get("GOOGLE_API_KEY")),
            gemini_api_base: get("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_GEMINI_API_BASE.to_string()),
            image_models,
            model_timeout: Duration::from_secs_f64(bounded_f64(
                get("LOOKBOOK_MODEL_TIMEOUT_S"),
                90.0,
                15.0,
                300.0,
            )),
            transport_retries: bounded_f64(get("LOOKBOOK_TRANSPORT_RETRIES"), 1.0, 0.0, 4.0)
                .round() as usize,
            retry_backoff: Duration::from_secs_f64(bounded_f64(
                get("LOOKBOOK_RETRY_BACKOFF_S"),
                1.2,
                0.1,
                10.0,
            )),
            fetch_timeout: Duration::from_secs_f64(bounded_f64(
                get("LOOKBOOK_FETCH_TIMEOUT_S"),
                20.0,
                1.0,
                120.0,
            )),
            max_source_bytes: get("LOOKBOOK_MAX_SOURCE_BYTES")
                .and_then(|raw| raw.parse::<u64>().ok())
                .filter(|value| *value > 0)
                .unwrap_or(DEFAULT_MAX_SOURCE_BYTES),
            data_dir: get("LOOKBOOK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("lookbook-data")),
            storage,
            background_removal_key: get("LOOKBOOK_BACKGROUND_REMOVAL_KEY"),
            production: get("LOOKBOOK_ENV")
                .map(|value| value.eq_ignore_ascii_case("production"))
                .unwrap_or(false),
            dryrun: get("LOOKBOOK_DRYRUN")
                .map(|value| {
                    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
                })
                .unwrap_or(false),
        }
    }

    pub fn model_configured(&self) -> bool {
        self.dryrun || self.gemini_api_key.is_some()
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("generations.jsonl")
    }

    pub fn gallery_path(&self) -> PathBuf {
        self.data_dir.join("galleries.json")
    }
}

fn bounded_f64(raw: Option<String>, default: f64, min: f64, max: f64) -> f64 {
    raw.and_then(|value| value.parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .unwrap_or(default)
        .clamp(min, max)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::time::Duration;

    use super::{EngineConfig, StorageConfig, DEFAULT_GEMINI_API_BASE, DEFAULT_MAX_SOURCE_BYTES};

    fn config(pairs: &[(&str, &str)]) -> EngineConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        EngineConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let config = config(&[]);
        assert_eq!(config.gemini_api_base, DEFAULT_GEMINI_API_BASE);
        assert_eq!(config.model_timeout, Duration::from_secs(90));
        assert_eq!(config.fetch_timeout, Duration::from_secs(20));
        assert_eq!(config.max_source_bytes, DEFAULT_MAX_SOURCE_BYTES);
        assert_eq!(config.storage, StorageConfig::Unconfigured);
        assert!(!config.model_configured());
        assert!(!config.production);
        assert!(!config.dryrun);
    }

    #[test]
    fn google_key_is_a_fallback_and_blanks_are_ignored() {
        let config = config(&[("GEMINI_API_KEY", "  "), ("GOOGLE_API_KEY", "g-key")]);
        assert_eq!(config.gemini_api_key.as_deref(), Some("g-key"));
        assert!(config.model_configured());
    }

    #[test]
    fn numeric_settings_are_clamped() {
        let config = config(&[
            ("LOOKBOOK_MODEL_TIMEOUT_S", "9999"),
            ("LOOKBOOK_TRANSPORT_RETRIES", "-3"),
            ("LOOKBOOK_FETCH_TIMEOUT_S", "abc"),
            ("LOOKBOOK_MAX_SOURCE_BYTES", "0"),
        ]);
        assert_eq!(config.model_timeout, Duration::from_secs(300));
        assert_eq!(config.transport_retries, 0);
        assert_eq!(config.fetch_timeout, Duration::from_secs(20));
        assert_eq!(config.max_source_bytes, DEFAULT_MAX_SOURCE_BYTES);
    }

    #[test]
    fn model_list_is_split_and_trimmed() {
        let config = config(&[("LOOKBOOK_IMAGE_MODELS", " a, ,b ,")]);
        assert_eq!(config.image_models, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn storage_selection() {
        let local = config(&[("LOOKBOOK_STORAGE_DIR", "/srv/objects")]);
        assert_eq!(
            local.storage,
            StorageConfig::Local {
                root: PathBuf::from("/srv/objects"),
                public_base_url: None,
            }
        );

        let http_without_base =
            config(&[("LOOKBOOK_STORAGE_ENDPOINT", "https://s3.example.com/bucket")]);
        assert_eq!(http_without_base.storage, StorageConfig::Unconfigured);

        let http = config(&[
            ("LOOKBOOK_STORAGE_ENDPOINT", "https://s3.example.com/bucket/"),
            ("LOOKBOOK_PUBLIC_BASE_URL", "https://cdn.example.com/"),
            ("LOOKBOOK_STORAGE_DIR", "/ignored"),
        ]);
        assert_eq!(
            http.storage,
            StorageConfig::Http {
                endpoint: "https://s3.example.com/bucket".to_string(),
                token: None,
                public_base_url: "https://cdn.example.com".to_string(),
            }
        );
    }

    #[test]
    fn production_and_dryrun_flags() {
        let config = config(&[("LOOKBOOK_ENV", "Production"), ("LOOKBOOK_DRYRUN", "true")]);
        assert!(config.production);
        assert!(config.dryrun);
        assert!(config.model_configured());
    }
}
