//! Configuration types for balance-sheet generation and the web front end.
//!
//! Pipeline behaviour is controlled through [`GeneratorConfig`], built via
//! its [`GeneratorConfigBuilder`]. The web server adds its own knobs in
//! [`ServerConfig`] (directories, upload limits, session lifetime).
//!
//! API keys are never stored in a config struct. They are read from the
//! environment by the provider factory; [`load_api_key_file`] fills the
//! environment from `anthropic_api_key.txt` when the variable is unset.

use crate::error::BilancioError;
use crate::pipeline::llm::Stage;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Provider used when nothing else is configured.
pub const DEFAULT_PROVIDER: &str = "anthropic";
/// Model for the analysis, validation and formatting stages.
pub const DEFAULT_FAST_MODEL: &str = "claude-haiku-4-5";
/// Model for the extraction stage.
pub const DEFAULT_DEEP_MODEL: &str = "claude-sonnet-4-5";
/// Fallback file consulted when `ANTHROPIC_API_KEY` is unset.
pub const API_KEY_FILE: &str = "anthropic_api_key.txt";

/// Configuration for one balance-sheet generation run.
///
/// Built via [`GeneratorConfig::builder()`] or using
/// [`GeneratorConfig::default()`].
///
/// # Example
/// ```rust
/// use bilancio_agent::GeneratorConfig;
///
/// let config = GeneratorConfig::builder()
///     .deep_model("claude-sonnet-4-5")
///     .max_retries(1)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_files, 5);
/// ```
#[derive(Clone)]
pub struct GeneratorConfig {
    /// LLM provider name (e.g. "anthropic", "openai").
    /// If None, `BILANCIO_LLM_PROVIDER` is consulted, then [`DEFAULT_PROVIDER`].
    pub provider_name: Option<String>,

    /// Model used for analysis, validation and formatting. Default: `claude-haiku-4-5`.
    pub fast_model: String,

    /// Model used for the extraction stage. Default: `claude-sonnet-4-5`.
    ///
    /// Extraction reads every page image and fills the full schema, so it
    /// gets the stronger model.
    pub deep_model: String,

    /// Pre-constructed provider for the fast tier. Takes precedence over `provider_name`.
    pub fast_provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed provider for the deep tier. Takes precedence over `provider_name`.
    pub deep_provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for every stage. Default: 0.0.
    pub temperature: f32,

    /// Output token budget for the analysis stage. Default: 1500.
    pub analysis_max_tokens: usize,

    /// Output token budget for the extraction stage. Default: 7000.
    pub extraction_max_tokens: usize,

    /// Output token budget for the validation stage. Default: 6000.
    pub validation_max_tokens: usize,

    /// Output token budget for the formatting stage. Default: 6000.
    pub formatting_max_tokens: usize,

    /// Retry attempts per stage on a failed provider call. Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call timeout in seconds. Default: 180.
    ///
    /// Extraction over several statements with a 7000-token budget routinely
    /// takes over a minute.
    pub api_timeout_secs: u64,

    /// Maximum number of input documents. Default: 5.
    pub max_files: usize,

    /// Maximum total pages across all documents. Default: 100.
    pub max_document_pages: usize,

    /// Longest rendered page edge in pixels. Default: 1568.
    ///
    /// Anthropic downsizes anything larger before the model sees it.
    pub max_rendered_pixels: u32,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional per-stage progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            provider_name: None,
            fast_model: DEFAULT_FAST_MODEL.to_string(),
            deep_model: DEFAULT_DEEP_MODEL.to_string(),
            fast_provider: None,
            deep_provider: None,
            temperature: 0.0,
            analysis_max_tokens: 1500,
            extraction_max_tokens: 7000,
            validation_max_tokens: 6000,
            formatting_max_tokens: 6000,
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 180,
            max_files: 5,
            max_document_pages: 100,
            max_rendered_pixels: 1568,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for GeneratorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratorConfig")
            .field("provider_name", &self.provider_name)
            .field("fast_model", &self.fast_model)
            .field("deep_model", &self.deep_model)
            .field("fast_provider", &self.fast_provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("deep_provider", &self.deep_provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_files", &self.max_files)
            .field("max_document_pages", &self.max_document_pages)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("progress_callback", &self.progress_callback.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

impl GeneratorConfig {
    /// Create a new builder for `GeneratorConfig`.
    pub fn builder() -> GeneratorConfigBuilder {
        GeneratorConfigBuilder {
            config: Self::default(),
        }
    }

    /// Output token budget for the given stage.
    pub fn max_tokens_for(&self, stage: Stage) -> usize {
        match stage {
            Stage::Analysis => self.analysis_max_tokens,
            Stage::Extraction => self.extraction_max_tokens,
            Stage::Validation => self.validation_max_tokens,
            Stage::Formatting => self.formatting_max_tokens,
        }
    }
}

/// Builder for [`GeneratorConfig`].
#[derive(Debug)]
pub struct GeneratorConfigBuilder {
    config: GeneratorConfig,
}

impl GeneratorConfigBuilder {
    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn fast_model(mut self, model: impl Into<String>) -> Self {
        self.config.fast_model = model.into();
        self
    }

    pub fn deep_model(mut self, model: impl Into<String>) -> Self {
        self.config.deep_model = model.into();
        self
    }

    pub fn fast_provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.fast_provider = Some(provider);
        self
    }

    pub fn deep_provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.deep_provider = Some(provider);
        self
    }

    /// Use one provider for both tiers.
    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.fast_provider = Some(Arc::clone(&provider));
        self.config.deep_provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn stage_max_tokens(mut self, stage: Stage, n: usize) -> Self {
        match stage {
            Stage::Analysis => self.config.analysis_max_tokens = n,
            Stage::Extraction => self.config.extraction_max_tokens = n,
            Stage::Validation => self.config.validation_max_tokens = n,
            Stage::Formatting => self.config.formatting_max_tokens = n,
        }
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn max_files(mut self, n: usize) -> Self {
        self.config.max_files = n;
        self
    }

    pub fn max_document_pages(mut self, n: usize) -> Self {
        self.config.max_document_pages = n;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<GeneratorConfig, BilancioError> {
        let c = &self.config;
        if c.max_files == 0 {
            return Err(BilancioError::InvalidConfig(
                "max_files must be ≥ 1".into(),
            ));
        }
        if c.max_document_pages == 0 {
            return Err(BilancioError::InvalidConfig(
                "max_document_pages must be ≥ 1".into(),
            ));
        }
        if c.fast_model.trim().is_empty() || c.deep_model.trim().is_empty() {
            return Err(BilancioError::InvalidConfig(
                "model names must not be empty".into(),
            ));
        }
        for stage in Stage::ALL {
            if c.max_tokens_for(stage) == 0 {
                return Err(BilancioError::InvalidConfig(format!(
                    "{stage} max_tokens must be ≥ 1"
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Server ───────────────────────────────────────────────────────────────

/// Settings for the upload/download web front end.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address. Default: `0.0.0.0`.
    pub host: String,
    /// Bind port. Default: 5000.
    pub port: u16,
    /// Where uploaded statements are stored while processing.
    pub upload_dir: PathBuf,
    /// Where generated PDF and text files are kept.
    pub output_dir: PathBuf,
    /// Files accepted per upload. Default: 5.
    pub max_files: usize,
    /// Per-file size limit in bytes. Default: 10 MiB.
    pub max_file_size: u64,
    /// Idle session lifetime in seconds. Default: 3600.
    pub session_ttl_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            upload_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("outputs"),
            max_files: 5,
            max_file_size: 10 * 1024 * 1024,
            session_ttl_secs: 3600,
        }
    }
}

impl ServerConfig {
    /// Request body limit: every file at the size limit plus form overhead.
    pub fn body_limit(&self) -> usize {
        (self.max_file_size as usize)
            .saturating_mul(self.max_files)
            .saturating_add(1024 * 1024)
    }

    /// Per-file limit in megabytes, for user-facing messages.
    pub fn max_file_size_mb(&self) -> f64 {
        self.max_file_size as f64 / (1024.0 * 1024.0)
    }
}

// ── API key ──────────────────────────────────────────────────────────────

/// Where the Anthropic API key came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiKeySource {
    /// `ANTHROPIC_API_KEY` was already set.
    Environment,
    /// Read from a key file and exported into the environment.
    File(PathBuf),
    /// Neither the variable nor the file is available.
    Missing,
}

/// Export the key in `path` as `ANTHROPIC_API_KEY` unless the variable is already set.
///
/// Must run before any async runtime threads read the environment.
pub fn load_api_key_file(path: impl AsRef<Path>) -> ApiKeySource {
    if env_non_empty("ANTHROPIC_API_KEY") {
        return ApiKeySource::Environment;
    }

    let path = path.as_ref();
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let key = contents.trim();
            if key.is_empty() {
                warn!("API key file {} is empty", path.display());
                return ApiKeySource::Missing;
            }
            std::env::set_var("ANTHROPIC_API_KEY", key);
            info!("Loaded API key from {}", path.display());
            ApiKeySource::File(path.to_path_buf())
        }
        Err(_) => {
            warn!(
                "No API key found in environment or {}",
                path.display()
            );
            ApiKeySource::Missing
        }
    }
}

/// Environment variable that holds the key for a provider, if it uses one.
pub fn api_key_env_var(provider: &str) -> Option<&'static str> {
    match provider.to_ascii_lowercase().as_str() {
        "anthropic" => Some("ANTHROPIC_API_KEY"),
        "openai" => Some("OPENAI_API_KEY"),
        "gemini" => Some("GEMINI_API_KEY"),
        "mistral" => Some("MISTRAL_API_KEY"),
        "openrouter" => Some("OPENROUTER_API_KEY"),
        _ => None,
    }
}

/// True when the key variable for `provider` is set and non-blank.
///
/// Providers without a key variable (ollama, lmstudio) always report true.
pub fn api_key_configured(provider: &str) -> bool {
    match api_key_env_var(provider) {
        Some(var) => env_non_empty(var),
        None => true,
    }
}

/// Provider name in effect for `config`: explicit, then environment, then default.
pub fn effective_provider_name(config: &GeneratorConfig) -> String {
    if let Some(ref name) = config.provider_name {
        return name.clone();
    }
    match std::env::var("BILANCIO_LLM_PROVIDER") {
        Ok(p) if !p.trim().is_empty() => p.trim().to_string(),
        _ => DEFAULT_PROVIDER.to_string(),
    }
}

fn env_non_empty(var: &str) -> bool {
    std::env::var(var)
        .map(|v| !v.trim().is_empty())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_stage_budgets() {
        let c = GeneratorConfig::default();
        assert_eq!(c.max_tokens_for(Stage::Analysis), 1500);
        assert_eq!(c.max_tokens_for(Stage::Extraction), 7000);
        assert_eq!(c.max_tokens_for(Stage::Validation), 6000);
        assert_eq!(c.max_tokens_for(Stage::Formatting), 6000);
        assert_eq!(c.temperature, 0.0);
        assert_eq!(c.fast_model, "claude-haiku-4-5");
        assert_eq!(c.deep_model, "claude-sonnet-4-5");
    }

    #[test]
    fn builder_clamps_temperature() {
        let c = GeneratorConfig::builder().temperature(5.0).build().unwrap();
        assert_eq!(c.temperature, 2.0);
        let c = GeneratorConfig::builder().temperature(-1.0).build().unwrap();
        assert_eq!(c.temperature, 0.0);
    }

    #[test]
    fn builder_rejects_zero_files() {
        let err = GeneratorConfig::builder().max_files(0).build().unwrap_err();
        assert!(matches!(err, BilancioError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_zero_stage_budget() {
        let err = GeneratorConfig::builder()
            .stage_max_tokens(Stage::Validation, 0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("validation"), "got: {err}");
    }

    #[test]
    fn builder_rejects_empty_model() {
        assert!(GeneratorConfig::builder().fast_model("  ").build().is_err());
    }

    #[test]
    fn server_config_limits() {
        let c = ServerConfig::default();
        assert_eq!(c.max_file_size_mb(), 10.0);
        assert!(c.body_limit() > 50 * 1024 * 1024);
    }

    #[test]
    fn provider_key_variables() {
        assert_eq!(api_key_env_var("Anthropic"), Some("ANTHROPIC_API_KEY"));
        assert_eq!(api_key_env_var("ollama"), None);
        assert!(api_key_configured("ollama"));
    }

    #[test]
    fn explicit_provider_name_wins() {
        let c = GeneratorConfig::builder().provider_name("openai").build().unwrap();
        assert_eq!(effective_provider_name(&c), "openai");
    }
}
