//! Configuration module for spsync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for spsync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sharepoint: SharePointConfig,
    pub sync: SyncConfig,
    pub upload: UploadConfig,
    pub metadata: MetadataConfig,
    pub transport: TransportConfig,
    pub logging: LoggingConfig,
}

/// Tenant, application and target library settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SharePointConfig {
    /// Azure AD tenant (directory) ID.
    pub tenant_id: String,
    /// Application (client) ID of the app registration.
    pub client_id: String,
    /// Client secret of the app registration.
    pub client_secret: String,
    /// SharePoint host, e.g. `contoso.sharepoint.com`.
    pub host_name: String,
    /// Site name as it appears after `/sites/`.
    pub site_name: String,
    /// Library and folder to upload into, e.g. `Documents/Reports/2024`.
    pub upload_path: String,
    /// Identity platform host. Change for sovereign clouds.
    pub login_endpoint: String,
    /// Graph API host. Change for sovereign clouds.
    pub graph_endpoint: String,
}

/// Local file selection and per-file processing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Glob selecting the local files (or directories) to upload.
    pub file_path: String,
    /// Expand `**` and matched directories recursively.
    pub recursive: bool,
    /// Upload everything regardless of remote state.
    pub force_upload: bool,
    /// Convert Markdown files to HTML before uploading.
    pub convert_md_to_html: bool,
    /// Patterns excluded from discovery.
    pub exclude_patterns: Vec<String>,
    /// Delete remote files that no longer exist locally.
    pub sync_delete: bool,
    /// Width of the worker pool.
    pub max_workers: usize,
    /// Attempts per file (folder resolution + transfer).
    pub max_retry: u32,
    /// Fixed delay between per-file attempts, in seconds.
    pub retry_delay_secs: u64,
    /// Pause inserted between completions while utilization is high, in milliseconds.
    pub pacing_pause_ms: u64,
}

/// Transfer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Files at or above this size (in MiB) use a resumable upload session.
    pub chunk_threshold_mb: u64,
    /// Effective threshold (in MiB) for compound-name and installer files.
    pub special_threshold_mb: u64,
    /// Attempts per chunk before the upload is abandoned.
    pub max_chunk_retries: u32,
    /// Time budget (in seconds) spread evenly over the chunk attempts.
    pub chunk_timeout_secs: u64,
}

/// Fingerprint column and write-back settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Display name of the custom text column holding fingerprints.
    pub column_name: String,
    /// Queue fingerprints and write them through `$batch` after uploads.
    pub batched: bool,
    /// Sub-requests per `$batch` call in the first two rounds.
    pub batch_size: usize,
    /// Sub-requests per `$batch` call in the final round.
    pub final_batch_size: usize,
    /// Wait before round 2 when a markup file failed.
    pub markup_delay_secs: u64,
    /// Wait before round 2 when a document, PDF or office file failed.
    pub document_delay_secs: u64,
    /// Wait before round 2 otherwise.
    pub default_delay_secs: u64,
    /// Wait before the final round.
    pub final_delay_secs: u64,
    /// Wait after creating the column before verifying it.
    pub post_create_wait_secs: u64,
}

/// HTTP retry settings for Graph calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Attempts per request, including the first.
    pub max_attempts: u32,
    /// Wait used when a 429 carries no usable `Retry-After`.
    pub default_retry_after_secs: u64,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Emit JSON log lines instead of human-readable ones.
    pub json: bool,
}

// ---------------------------------------------------------------------------
// Loading and derived values
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/spsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("spsync")
            .join("config.yaml")
    }

    /// `https://{host}/sites/{site}`
    pub fn tenant_url(&self) -> String {
        format!(
            "https://{}/sites/{}",
            self.sharepoint.host_name, self.sharepoint.site_name
        )
    }

    /// Library named by the first segment of `upload_path`, or `Documents`
    /// when the path has a single segment.
    pub fn library_name(&self) -> String {
        let trimmed = self.sharepoint.upload_path.trim_matches('/');
        match trimmed.split_once('/') {
            Some((library, _)) if !library.is_empty() => library.to_string(),
            _ => "Documents".to_string(),
        }
    }

    /// Folder path inside the library that files are uploaded under.
    ///
    /// For a single-segment `upload_path` the whole path is a folder in the
    /// default library.
    pub fn library_subpath(&self) -> String {
        let trimmed = self.sharepoint.upload_path.trim_matches('/');
        match trimmed.split_once('/') {
            Some((_, rest)) => rest.trim_matches('/').to_string(),
            None if trimmed.eq_ignore_ascii_case("Documents")
                || trimmed.eq_ignore_ascii_case("Shared Documents") =>
            {
                String::new()
            }
            None => trimmed.to_string(),
        }
    }
}

impl UploadConfig {
    pub fn chunk_threshold_bytes(&self) -> u64 {
        self.chunk_threshold_mb * 1024 * 1024
    }

    pub fn special_threshold_bytes(&self) -> u64 {
        self.special_threshold_mb * 1024 * 1024
    }

    /// Fixed delay between attempts of one chunk: the timeout budget spread
    /// over the attempt count.
    pub fn chunk_retry_delay(&self) -> Duration {
        Duration::from_secs(self.chunk_timeout_secs) / self.max_chunk_retries.max(1)
    }
}

/// Environment variable enabling verbose metadata diagnostics.
pub const METADATA_DEBUG_ENV: &str = "DEBUG_METADATA";

/// Whether `DEBUG_METADATA` is set to `1`, `true` or `yes`.
///
/// Read once per process.
pub fn metadata_debug_enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| {
        std::env::var(METADATA_DEBUG_ENV)
            .map(|v| is_truthy(&v))
            .unwrap_or(false)
    })
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for SharePointConfig {
    fn default() -> Self {
        Self {
            tenant_id: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            host_name: String::new(),
            site_name: String::new(),
            upload_path: "Documents".to_string(),
            login_endpoint: "login.microsoftonline.com".to_string(),
            graph_endpoint: "graph.microsoft.com".to_string(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            file_path: "./**/*".to_string(),
            recursive: true,
            force_upload: false,
            convert_md_to_html: true,
            exclude_patterns: Vec::new(),
            sync_delete: false,
            max_workers: 4,
            max_retry: 3,
            retry_delay_secs: 2,
            pacing_pause_ms: 1000,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_threshold_mb: 4,
            special_threshold_mb: 250,
            max_chunk_retries: 3,
            chunk_timeout_secs: 30,
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            column_name: "FileHash".to_string(),
            batched: true,
            batch_size: 20,
            final_batch_size: 5,
            markup_delay_secs: 10,
            document_delay_secs: 8,
            default_delay_secs: 5,
            final_delay_secs: 20,
            post_create_wait_secs: 2,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            default_retry_after_secs: 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.max_workers"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn require_non_empty(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.push(ValidationError {
            field: field.into(),
            message: "must not be empty".into(),
        });
    }
}

fn require_positive(errors: &mut Vec<ValidationError>, field: &str, value: u64) {
    if value == 0 {
        errors.push(ValidationError {
            field: field.into(),
            message: "must be greater than 0".into(),
        });
    }
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- sharepoint ---
        let sp = &self.sharepoint;
        require_non_empty(&mut errors, "sharepoint.tenant_id", &sp.tenant_id);
        require_non_empty(&mut errors, "sharepoint.client_id", &sp.client_id);
        require_non_empty(&mut errors, "sharepoint.client_secret", &sp.client_secret);
        require_non_empty(&mut errors, "sharepoint.host_name", &sp.host_name);
        require_non_empty(&mut errors, "sharepoint.site_name", &sp.site_name);
        require_non_empty(&mut errors, "sharepoint.login_endpoint", &sp.login_endpoint);
        require_non_empty(&mut errors, "sharepoint.graph_endpoint", &sp.graph_endpoint);
        if sp.host_name.contains("://") {
            errors.push(ValidationError {
                field: "sharepoint.host_name".into(),
                message: "must be a bare host name without a scheme".into(),
            });
        }

        // --- sync ---
        require_non_empty(&mut errors, "sync.file_path", &self.sync.file_path);
        require_positive(&mut errors, "sync.max_workers", self.sync.max_workers as u64);
        require_positive(&mut errors, "sync.max_retry", u64::from(self.sync.max_retry));

        // --- upload ---
        require_positive(
            &mut errors,
            "upload.chunk_threshold_mb",
            self.upload.chunk_threshold_mb,
        );
        require_positive(
            &mut errors,
            "upload.max_chunk_retries",
            u64::from(self.upload.max_chunk_retries),
        );
        if self.upload.special_threshold_mb < self.upload.chunk_threshold_mb {
            errors.push(ValidationError {
                field: "upload.special_threshold_mb".into(),
                message: format!(
                    "special_threshold_mb ({}) must not be below chunk_threshold_mb ({})",
                    self.upload.special_threshold_mb, self.upload.chunk_threshold_mb
                ),
            });
        }

        // --- metadata ---
        require_non_empty(&mut errors, "metadata.column_name", &self.metadata.column_name);
        require_positive(
            &mut errors,
            "metadata.batch_size",
            self.metadata.batch_size as u64,
        );
        require_positive(
            &mut errors,
            "metadata.final_batch_size",
            self.metadata.final_batch_size as u64,
        );
        if self.metadata.batch_size > 20 {
            errors.push(ValidationError {
                field: "metadata.batch_size".into(),
                message: "Graph $batch accepts at most 20 requests".into(),
            });
        }

        // --- transport ---
        require_positive(
            &mut errors,
            "transport.max_attempts",
            u64::from(self.transport.max_attempts),
        );

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use spsync_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .site("contoso.sharepoint.com", "Engineering")
///     .upload_path("Documents/Reports")
///     .file_path("./docs/**/*")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Start from an already loaded configuration.
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    // --- sharepoint ---

    pub fn credentials(
        mut self,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.config.sharepoint.tenant_id = tenant_id.into();
        self.config.sharepoint.client_id = client_id.into();
        self.config.sharepoint.client_secret = client_secret.into();
        self
    }

    pub fn site(mut self, host_name: impl Into<String>, site_name: impl Into<String>) -> Self {
        self.config.sharepoint.host_name = host_name.into();
        self.config.sharepoint.site_name = site_name.into();
        self
    }

    pub fn upload_path(mut self, path: impl Into<String>) -> Self {
        self.config.sharepoint.upload_path = path.into();
        self
    }

    pub fn login_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.sharepoint.login_endpoint = endpoint.into();
        self
    }

    pub fn graph_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.sharepoint.graph_endpoint = endpoint.into();
        self
    }

    // --- sync ---

    pub fn file_path(mut self, pattern: impl Into<String>) -> Self {
        self.config.sync.file_path = pattern.into();
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.config.sync.recursive = recursive;
        self
    }

    pub fn force_upload(mut self, force: bool) -> Self {
        self.config.sync.force_upload = force;
        self
    }

    pub fn convert_md_to_html(mut self, convert: bool) -> Self {
        self.config.sync.convert_md_to_html = convert;
        self
    }

    /// Accepts a comma-separated list, as given on the command line.
    pub fn exclude_patterns(mut self, patterns: &str) -> Self {
        self.config.sync.exclude_patterns = patterns
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect();
        self
    }

    pub fn sync_delete(mut self, enabled: bool) -> Self {
        self.config.sync.sync_delete = enabled;
        self
    }

    pub fn max_workers(mut self, n: usize) -> Self {
        self.config.sync.max_workers = n;
        self
    }

    pub fn max_retry(mut self, n: u32) -> Self {
        self.config.sync.max_retry = n;
        self
    }

    // --- upload ---

    pub fn chunk_threshold_mb(mut self, mb: u64) -> Self {
        self.config.upload.chunk_threshold_mb = mb;
        self
    }

    pub fn max_chunk_retries(mut self, n: u32) -> Self {
        self.config.upload.max_chunk_retries = n;
        self
    }

    // --- metadata ---

    pub fn column_name(mut self, name: impl Into<String>) -> Self {
        self.config.metadata.column_name = name.into();
        self
    }

    pub fn batched_metadata(mut self, batched: bool) -> Self {
        self.config.metadata.batched = batched;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
