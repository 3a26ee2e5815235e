//! Settings for the arXiv client, the PDF fetcher and the completion
//! providers. Loaded once in `main` and shared read-only afterwards.

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use url::Url;

use crate::error::AppError;

pub const DEFAULT_CONFIG_FILE: &str = "garx.toml";
pub const EXAMPLE_CONFIG_FILE: &str = "garx.example.toml";
pub const ARXIV_API: &str = "http://export.arxiv.org/api/query";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub arxiv: ArxivSettings,
    pub download: DownloadSettings,
    pub completion: CompletionSettings,
    pub providers: BTreeMap<String, ProviderSettings>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArxivSettings {
    pub base_url: String,
    pub max_results: usize,
    pub max_attempts: u32,
    pub retry_delay_secs: u64,
    pub timeout_secs: u64,
    pub requests_per_second: u32,
}

impl Default for ArxivSettings {
    fn default() -> Self {
        Self {
            base_url: ARXIV_API.to_string(),
            max_results: 5,
            max_attempts: 3,
            retry_delay_secs: 2,
            timeout_secs: 30,
            requests_per_second: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DownloadSettings {
    pub dir: PathBuf,
    pub max_attempts: u32,
    pub retry_delay_secs: u64,
    pub timeout_secs: u64,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            max_attempts: 3,
            retry_delay_secs: 2,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompletionSettings {
    /// Key into `providers`.
    pub provider: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
    /// Upper bound for a whole background action (summarize, ask, translate).
    pub task_timeout_secs: u64,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            provider: "groq".to_string(),
            timeout_secs: 30,
            max_tokens: 500,
            task_timeout_secs: 60,
        }
    }
}

#[derive(Clone, Deserialize, Default)]
#[serde(default)]
pub struct ProviderSettings {
    pub api_key: String,
    pub api_base: String,
    pub model: String,
}

// Keeps the key out of logs.
impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("has_api_key", &!self.api_key.is_empty())
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

impl ArxivSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl DownloadSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl CompletionSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }
}

impl Settings {
    /// Reads settings from `path`, seeding it from the example file when it
    /// does not exist yet, then applies environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_seeded(path, Path::new(EXAMPLE_CONFIG_FILE))
    }

    /// `load`, with the example file to seed from given explicitly.
    pub fn load_seeded(path: &Path, example: &Path) -> Result<Self> {
        if !path.exists() && example.exists() {
            println!("Creating {} from {}...", path.display(), example.display());
            std::fs::copy(example, path)
                .with_context(|| format!("copying {} to {}", example.display(), path.display()))?;
        }

        let mut settings = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            Self::from_toml(&raw).with_context(|| format!("parsing {}", path.display()))?
        } else {
            tracing::warn!("No settings file at {}, using defaults", path.display());
            Self::default()
        };

        settings.apply_env();
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    fn apply_env(&mut self) {
        self.apply_overrides(|name| env::var(name).ok());
    }

    /// Applies `GARX_*` overrides read through `lookup`. Key, base and model
    /// go to the active provider, which is created if the file lacks it.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(max) = lookup("GARX_MAX_RESULTS").and_then(|v| v.parse().ok()) {
            self.arxiv.max_results = max;
        }
        if let Some(provider) = lookup("GARX_PROVIDER") {
            self.completion.provider = provider;
        }

        let key = lookup("GARX_API_KEY");
        let base = lookup("GARX_API_BASE");
        let model = lookup("GARX_MODEL");
        if key.is_none() && base.is_none() && model.is_none() {
            return;
        }
        let entry = self.providers.entry(self.completion.provider.clone()).or_default();
        if let Some(key) = key {
            entry.api_key = key;
        }
        if let Some(base) = base {
            entry.api_base = base;
        }
        if let Some(model) = model {
            entry.model = model;
        }
    }

    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.arxiv.base_url)
            .with_context(|| format!("invalid arxiv.base_url {:?}", self.arxiv.base_url))?;
        if self.arxiv.max_results == 0 {
            anyhow::bail!("arxiv.max_results must be at least 1");
        }
        if self.arxiv.max_attempts == 0 || self.download.max_attempts == 0 {
            anyhow::bail!("max_attempts must be at least 1");
        }
        for (name, provider) in &self.providers {
            if !provider.api_base.is_empty() {
                Url::parse(&provider.api_base)
                    .with_context(|| format!("invalid providers.{}.api_base", name))?;
            }
        }
        Ok(())
    }

    /// The provider named by `completion.provider`, checked for the fields a
    /// completion call needs. A missing key only matters once a completion
    /// is actually requested, so this is not part of `validate`.
    pub fn active_provider(&self) -> Result<&ProviderSettings, AppError> {
        let name = &self.completion.provider;
        let provider = self.providers.get(name).ok_or_else(|| {
            AppError::Config(format!("no [providers.{}] section configured", name))
        })?;
        if provider.api_key.is_empty() {
            return Err(AppError::Config(format!("providers.{}.api_key is empty", name)));
        }
        if provider.api_base.is_empty() || provider.model.is_empty() {
            return Err(AppError::Config(format!(
                "providers.{} needs both api_base and model",
                name
            )));
        }
        Ok(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const SAMPLE: &str = r#"
[arxiv]
max_results = 10

[download]
dir = "papers"

[completion]
provider = "groq"

[providers.groq]
api_key = "gsk-test"
api_base = "https://api.groq.com/openai/v1"
model = "llama3-8b-8192"
"#;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.arxiv.base_url, ARXIV_API);
        assert_eq!(settings.arxiv.max_results, 5);
        assert_eq!(settings.arxiv.max_attempts, 3);
        assert_eq!(settings.arxiv.retry_delay(), Duration::from_secs(2));
        assert_eq!(settings.completion.timeout(), Duration::from_secs(30));
        assert_eq!(settings.completion.max_tokens, 500);
        assert_eq!(settings.download.dir, PathBuf::from("."));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let settings = Settings::from_toml(SAMPLE).unwrap();
        assert_eq!(settings.arxiv.max_results, 10);
        assert_eq!(settings.arxiv.max_attempts, 3);
        assert_eq!(settings.download.dir, PathBuf::from("papers"));
        assert_eq!(settings.download.timeout_secs, 60);

        let provider = settings.active_provider().unwrap();
        assert_eq!(provider.model, "llama3-8b-8192");
    }

    #[test]
    fn test_missing_provider_is_config_error() {
        let settings = Settings::default();
        let err = settings.active_provider().unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_empty_key_is_config_error() {
        let raw = SAMPLE.replace("gsk-test", "");
        let settings = Settings::from_toml(&raw).unwrap();
        assert!(settings.active_provider().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_urls_and_zero_caps() {
        let mut settings = Settings::default();
        settings.arxiv.base_url = "not a url".into();
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.arxiv.max_results = 0;
        assert!(settings.validate().is_err());

        let raw = SAMPLE.replace("https://api.groq.com/openai/v1", "::nope");
        assert!(Settings::from_toml(&raw).unwrap().validate().is_err());
    }

    #[test]
    fn test_debug_hides_api_key() {
        let settings = Settings::from_toml(SAMPLE).unwrap();
        let debug = format!("{:?}", settings);
        assert!(!debug.contains("gsk-test"));
        assert!(debug.contains("has_api_key"));
    }

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |name: &str| vars.iter().find(|(k, _)| *k == name).map(|(_, v)| v.to_string())
    }

    #[test]
    fn test_overrides_win_over_file_values() {
        let mut settings = Settings::from_toml(SAMPLE).unwrap();
        settings.apply_overrides(lookup(&[
            ("GARX_MAX_RESULTS", "12"),
            ("GARX_API_KEY", "gsk-env"),
            ("GARX_MODEL", "mixtral-8x7b"),
        ]));

        assert_eq!(settings.arxiv.max_results, 12);
        let provider = settings.active_provider().unwrap();
        assert_eq!(provider.api_key, "gsk-env");
        assert_eq!(provider.model, "mixtral-8x7b");
        assert_eq!(provider.api_base, "https://api.groq.com/openai/v1");
    }

    #[test]
    fn test_overrides_create_missing_provider() {
        let mut settings = Settings::from_toml(SAMPLE).unwrap();
        settings.apply_overrides(lookup(&[
            ("GARX_PROVIDER", "local"),
            ("GARX_API_KEY", "sk-local"),
            ("GARX_API_BASE", "http://localhost:8080/v1"),
            ("GARX_MODEL", "qwen"),
        ]));

        assert_eq!(settings.completion.provider, "local");
        assert!(settings.providers.contains_key("groq"));
        let provider = settings.active_provider().unwrap();
        assert_eq!(provider.api_base, "http://localhost:8080/v1");
        assert_eq!(provider.model, "qwen");
    }

    #[test]
    fn test_unparsable_max_results_is_ignored() {
        let mut settings = Settings::default();
        settings.apply_overrides(lookup(&[("GARX_MAX_RESULTS", "lots")]));
        assert_eq!(settings.arxiv.max_results, 5);
        assert!(settings.providers.is_empty());
    }

    #[test]
    #[serial]
    fn test_load_applies_process_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garx.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        env::set_var("GARX_MAX_RESULTS", "3");
        env::set_var("GARX_API_KEY", "gsk-from-env");
        let loaded = Settings::load(&path);
        env::remove_var("GARX_MAX_RESULTS");
        env::remove_var("GARX_API_KEY");

        let settings = loaded.unwrap();
        assert_eq!(settings.arxiv.max_results, 3);
        assert_eq!(settings.active_provider().unwrap().api_key, "gsk-from-env");
    }

    #[test]
    #[serial]
    fn test_load_seeds_missing_file_from_example() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garx.toml");
        let example = dir.path().join("garx.example.toml");
        std::fs::write(&example, SAMPLE).unwrap();

        let settings = Settings::load_seeded(&path, &example).unwrap();
        assert!(path.exists());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), SAMPLE);
        assert_eq!(settings.download.dir, PathBuf::from("papers"));
    }

    #[test]
    #[serial]
    fn test_load_without_any_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garx.toml");
        let settings =
            Settings::load_seeded(&path, &dir.path().join("garx.example.toml")).unwrap();
        assert!(!path.exists());
        assert_eq!(settings.download.dir, PathBuf::from("."));
    }

    #[test]
    #[serial]
    fn test_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garx.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.download.dir, PathBuf::from("papers"));
    }
}
