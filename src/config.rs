//! Configuration types for PDF-to-JSON extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. The config is passed by reference into
//! every call; nothing in the pipeline keeps mutable per-run state, so a
//! method can never observe a half-configured extractor.
//!
//! A single invocation is described by an [`ExtractionJob`], derived from the
//! config with [`ExtractionConfig::job`] (single file) or
//! [`ExtractionConfig::job_for`] (one file of a batch).

use crate::error::ExtractError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Default directory rendered pages are written to.
pub const DEFAULT_OUTPUT_DIR: &str = "temp_images";

/// Default chat model. Any vision-capable model served by the endpoint works.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Default completion token bound.
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

/// Default chat-completions API base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";

/// Configuration for a single-file or batch extraction.
///
/// Built via [`ExtractionConfig::builder()`].
///
/// # Example
/// ```rust
/// use edgequake_pdfvision::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .source_path("invoice.pdf")
///     .system_prompt("Return the invoice fields as JSON.")
///     .pages(2, 4)
///     .store_path("invoices.json")
///     .build()
///     .unwrap();
/// assert_eq!(config.page_range().unwrap().unwrap().len(), 3);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// PDF (or image) to process in single-file mode. Ignored by
    /// [`crate::extract::run_directory`], which sets it per file.
    pub source_path: Option<PathBuf>,

    /// System prompt. Required and non-empty.
    pub system_prompt: String,

    /// Text repeated before every page image in the user message. May be empty.
    pub user_prompt: String,

    /// First page to render (1-indexed, inclusive). Must be set together
    /// with `last_page`.
    pub first_page: Option<u32>,

    /// Last page to render (1-indexed, inclusive).
    pub last_page: Option<u32>,

    /// Directory rendered pages are written to. Default: `temp_images`.
    pub output_dir: PathBuf,

    /// JSON store extraction records are appended to.
    pub store_path: Option<PathBuf>,

    /// Chat model identifier. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// Maximum tokens the model may generate per request. Default: 1000.
    pub max_tokens: u32,

    /// Base URL of the chat-completions API. If None, `OPENAI_BASE_URL` or
    /// [`DEFAULT_API_BASE_URL`] is used.
    pub api_base_url: Option<String>,

    /// Per-request timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Longest edge of a rendered page in pixels. Default: 2000.
    ///
    /// Keeps a large-format page (posters, drawings) from producing an image
    /// the API would reject for size.
    pub max_rendered_pixels: u32,

    /// What a batch run does when one file fails. Default: [`FailurePolicy::Continue`].
    pub failure_policy: FailurePolicy,

    /// Receives status events (directory ready, page saved, file done).
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            source_path: None,
            system_prompt: String::new(),
            user_prompt: String::new(),
            first_page: None,
            last_page: None,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            store_path: None,
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            api_base_url: None,
            api_timeout_secs: 120,
            max_rendered_pixels: 2000,
            failure_policy: FailurePolicy::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("source_path", &self.source_path)
            .field("system_prompt_len", &self.system_prompt.len())
            .field("user_prompt_len", &self.user_prompt.len())
            .field("first_page", &self.first_page)
            .field("last_page", &self.last_page)
            .field("output_dir", &self.output_dir)
            .field("store_path", &self.store_path)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("api_base_url", &self.api_base_url)
            .field("failure_policy", &self.failure_policy)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ExtractionProgressCallback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Check the fields the pipeline depends on.
    ///
    /// Called by [`ExtractionConfigBuilder::build`] and again by every entry
    /// point, since the fields are public and may be edited after building.
    pub fn validate(&self) -> Result<(), ExtractError> {
        validate_system_prompt(&self.system_prompt)?;
        PageRange::from_bounds(self.first_page, self.last_page)?;
        if self.max_tokens == 0 {
            return Err(ExtractError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(ExtractError::InvalidConfig("model must not be empty".into()));
        }
        Ok(())
    }

    /// The validated page range, if any.
    pub fn page_range(&self) -> Result<Option<PageRange>, ExtractError> {
        PageRange::from_bounds(self.first_page, self.last_page)
    }

    /// Build the job for `source_path`.
    pub fn job(&self) -> Result<ExtractionJob, ExtractError> {
        let source = self.source_path.as_deref().ok_or_else(|| {
            ExtractError::InvalidConfig("a source path is required".into())
        })?;
        self.job_for(source)
    }

    /// Build the job for an explicit source, keeping every other field.
    pub fn job_for(&self, source: impl AsRef<Path>) -> Result<ExtractionJob, ExtractError> {
        ExtractionJob::new(
            source.as_ref(),
            self.page_range()?,
            &self.system_prompt,
            &self.user_prompt,
        )
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn source_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.source_path = Some(path.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    pub fn user_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.user_prompt = prompt.into();
        self
    }

    pub fn first_page(mut self, page: u32) -> Self {
        self.config.first_page = Some(page);
        self
    }

    pub fn last_page(mut self, page: u32) -> Self {
        self.config.last_page = Some(page);
        self
    }

    /// Set both page bounds at once (1-indexed, inclusive).
    pub fn pages(self, first: u32, last: u32) -> Self {
        self.first_page(first).last_page(last)
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.store_path = Some(path.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = Some(url.into());
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

fn validate_system_prompt(prompt: &str) -> Result<(), ExtractError> {
    if prompt.trim().is_empty() {
        return Err(ExtractError::InvalidConfig(
            "system prompt cannot be empty".into(),
        ));
    }
    Ok(())
}

// ── Page range ───────────────────────────────────────────────────────────

/// A contiguous, 1-indexed, inclusive range of PDF pages.
///
/// Only constructible through validation, so `1 <= first <= last` holds for
/// every value in circulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    first: u32,
    last: u32,
}

impl PageRange {
    pub fn new(first: u32, last: u32) -> Result<Self, ExtractError> {
        if first == 0 {
            return Err(ExtractError::InvalidConfig(
                "pages are 1-indexed, first page must be ≥ 1".into(),
            ));
        }
        if first > last {
            return Err(ExtractError::InvalidConfig(format!(
                "invalid page range {first}-{last}: first must be <= last"
            )));
        }
        Ok(Self { first, last })
    }

    /// Both bounds or neither. Exactly one bound is rejected rather than
    /// silently rendering every page.
    pub fn from_bounds(first: Option<u32>, last: Option<u32>) -> Result<Option<Self>, ExtractError> {
        match (first, last) {
            (None, None) => Ok(None),
            (Some(f), Some(l)) => Self::new(f, l).map(Some),
            (Some(f), None) => Err(ExtractError::InvalidConfig(format!(
                "first page {f} given without a last page; set both or neither"
            ))),
            (None, Some(l)) => Err(ExtractError::InvalidConfig(format!(
                "last page {l} given without a first page; set both or neither"
            ))),
        }
    }

    pub fn first(&self) -> u32 {
        self.first
    }

    pub fn last(&self) -> u32 {
        self.last
    }

    /// Number of pages in the range.
    pub fn len(&self) -> u32 {
        self.last - self.first + 1
    }

    /// Always false; a range holds at least one page.
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.first, self.last)
    }
}

// ── Batch policy ─────────────────────────────────────────────────────────

/// How [`crate::extract::run_directory`] reacts to a failing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Record the failure in the file's outcome and process the next file. (default)
    #[default]
    Continue,
    /// Return the first error and leave the remaining files untouched.
    FailFast,
}

// ── Job ──────────────────────────────────────────────────────────────────

/// One immutable unit of work: a source file plus the prompts to send with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionJob {
    source_path: PathBuf,
    page_range: Option<PageRange>,
    system_prompt: String,
    user_prompt: String,
}

impl ExtractionJob {
    pub fn new(
        source_path: impl Into<PathBuf>,
        page_range: Option<PageRange>,
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
    ) -> Result<Self, ExtractError> {
        let source_path = source_path.into();
        if source_path.as_os_str().is_empty() {
            return Err(ExtractError::InvalidConfig(
                "a source path is required".into(),
            ));
        }
        let system_prompt = system_prompt.into();
        validate_system_prompt(&system_prompt)?;
        Ok(Self {
            source_path,
            page_range,
            system_prompt,
            user_prompt: user_prompt.into(),
        })
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn page_range(&self) -> Option<PageRange> {
        self.page_range
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn user_prompt(&self) -> &str {
        &self.user_prompt
    }
}
