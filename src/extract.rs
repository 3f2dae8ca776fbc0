//! Extraction entry points: one file, or every PDF in a directory.
//!
//! [`Extractor`] wires the pipeline stages together around two injected
//! collaborators, a [`PageRasterizer`] and a [`CompletionClient`]. The free
//! functions ([`process_file`], [`run_directory`], …) build an extractor from
//! the environment and are what most callers want; tests and embedders that
//! need fakes construct an [`Extractor`] directly.
//!
//! Everything is sequential: one file at a time, one API call per file.

use crate::config::{ExtractionConfig, ExtractionJob, FailurePolicy};
use crate::error::{ExtractError, FileError};
use crate::output::{BatchReport, FileOutcome};
use crate::pipeline::aggregate::{append_record, extract_json_fence};
use crate::pipeline::input::{has_pdf_extension, resolve_source, Source};
use crate::pipeline::llm::CompletionClient;
use crate::pipeline::render::{render_pages, PageImage, PageRasterizer, PdfiumRasterizer};
use crate::pipeline::request::build_request;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// The extraction pipeline with its external collaborators.
#[derive(Clone)]
pub struct Extractor {
    rasterizer: Arc<dyn PageRasterizer>,
    client: CompletionClient,
}

impl Extractor {
    pub fn new(rasterizer: Arc<dyn PageRasterizer>, client: CompletionClient) -> Self {
        Self { rasterizer, client }
    }

    /// pdfium rasteriser + OpenAI-compatible client, both configured from
    /// `config` and the environment.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, ExtractError> {
        let rasterizer = PdfiumRasterizer::new(config.max_rendered_pixels)
            .with_progress(config.progress_callback.clone());
        let client = CompletionClient::from_config(config)?;
        Ok(Self::new(Arc::new(rasterizer), client))
    }

    pub fn client(&self) -> &CompletionClient {
        &self.client
    }

    /// Run one job and return the model reply exactly as received.
    pub async fn process_job(&self, job: &ExtractionJob, output_dir: &Path) -> Result<String, ExtractError> {
        self.run_job(job, output_dir).await.map(|(reply, _)| reply)
    }

    /// Single-file extraction described by `config.source_path`.
    pub async fn process_file(&self, config: &ExtractionConfig) -> Result<String, ExtractError> {
        config.validate()?;
        let job = config.job()?;
        info!("Processing {}", job.source_path().display());
        self.process_job(&job, &config.output_dir).await
    }

    /// [`Extractor::process_file`], then append the reply's JSON to
    /// `config.store_path`. Returns the raw reply.
    ///
    /// If storing fails the reply comes back inside
    /// [`ExtractError::ReplyNotStored`].
    pub async fn process_file_into_store(&self, config: &ExtractionConfig) -> Result<String, ExtractError> {
        let store = config.store_path.as_deref().ok_or_else(|| {
            ExtractError::InvalidConfig("a store path is required to save results".into())
        })?;
        let reply = self.process_file(config).await?;
        if let Err(e) = append_record(store, extract_json_fence(&reply)) {
            return Err(ExtractError::ReplyNotStored {
                reply,
                source: Box::new(e),
            });
        }
        info!("Result appended to {}", store.display());
        Ok(reply)
    }

    /// Process every PDF directly inside `dir`, appending each reply's JSON
    /// to `store_path`.
    ///
    /// Template errors (empty system prompt, half-specified range) fail
    /// before any file is touched. Per-file failures follow
    /// `template.failure_policy`.
    pub async fn run_directory(
        &self,
        dir: &Path,
        store_path: &Path,
        template: &ExtractionConfig,
    ) -> Result<BatchReport, ExtractError> {
        template.validate()?;
        let files = list_pdfs(dir)?;
        let total = files.len();
        let progress = template.progress_callback.as_ref();
        info!("Found {} PDF files in {}", total, dir.display());

        let batch_start = Instant::now();
        let mut report = BatchReport::default();

        for (i, path) in files.into_iter().enumerate() {
            let index = i + 1;
            if let Some(cb) = progress {
                cb.on_file_start(&path, index, total);
            }

            let start = Instant::now();
            let result = self.process_into_store(&path, store_path, template).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            match result {
                Ok((reply, pages)) => {
                    info!("{}: {} pages, {}ms", path.display(), pages, duration_ms);
                    if let Some(cb) = progress {
                        cb.on_file_complete(&path, index, total, reply.len());
                    }
                    report.files.push(FileOutcome {
                        path,
                        pages,
                        reply: Some(reply),
                        duration_ms,
                        error: None,
                    });
                }
                Err(e) => {
                    if let Some(cb) = progress {
                        cb.on_file_error(&path, index, total, &e.to_string());
                    }
                    if template.failure_policy == FailurePolicy::FailFast {
                        return Err(e);
                    }
                    warn!("{}: {}", path.display(), e);
                    let name = display_name(&path);
                    report.files.push(FileOutcome {
                        path,
                        pages: 0,
                        reply: None,
                        duration_ms,
                        error: Some(FileError::from_extract(name, &e)),
                    });
                }
            }
        }

        report.total_duration_ms = batch_start.elapsed().as_millis() as u64;
        info!(
            "Batch complete: {}/{} files, {}ms total",
            report.succeeded(),
            report.total(),
            report.total_duration_ms
        );
        if let Some(cb) = progress {
            cb.on_batch_complete(report.total(), report.succeeded());
        }
        Ok(report)
    }

    async fn process_into_store(
        &self,
        path: &Path,
        store_path: &Path,
        template: &ExtractionConfig,
    ) -> Result<(String, usize), ExtractError> {
        let job = template.job_for(path)?;
        let (reply, pages) = self.run_job(&job, &template.output_dir).await?;
        append_record(store_path, extract_json_fence(&reply))?;
        Ok((reply, pages))
    }

    async fn run_job(&self, job: &ExtractionJob, output_dir: &Path) -> Result<(String, usize), ExtractError> {
        let images = self.page_images(job, output_dir).await?;
        let messages = build_request(job.system_prompt(), job.user_prompt(), &images)?;
        debug!("Sending {} page images to {}", images.len(), self.client.model());
        let reply = self.client.complete_default(&messages).await?;
        Ok((reply, images.len()))
    }

    async fn page_images(&self, job: &ExtractionJob, output_dir: &Path) -> Result<Vec<PageImage>, ExtractError> {
        match resolve_source(job.source_path())? {
            Source::Pdf(path) => {
                render_pages(Arc::clone(&self.rasterizer), &path, output_dir, job.page_range()).await
            }
            Source::Image(path) => {
                if let Some(range) = job.page_range() {
                    warn!("Page range {} ignored for image source {}", range, path.display());
                }
                Ok(vec![PageImage::new(path, 1, 1)])
            }
        }
    }
}

/// PDFs directly inside `dir` (no recursion), sorted by file name.
pub fn list_pdfs(dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    if !dir.is_dir() {
        return Err(ExtractError::DirectoryNotFound {
            path: dir.to_path_buf(),
        });
    }

    let entries = std::fs::read_dir(dir).map_err(|e| {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            ExtractError::PermissionDenied {
                path: dir.to_path_buf(),
            }
        } else {
            ExtractError::DirectoryNotFound {
                path: dir.to_path_buf(),
            }
        }
    })?;

    let mut pdfs: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && has_pdf_extension(p))
        .collect();
    pdfs.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(pdfs)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ── Convenience entry points ─────────────────────────────────────────────

/// Extract from `config.source_path` and return the model reply unchanged.
///
/// # Errors
/// - [`ExtractError::InvalidConfig`] before any I/O if the system prompt is
///   empty, the page range is half-specified, or no source is set
/// - PDF decode errors from rendering
/// - [`ExtractError::AuthError`] / [`ExtractError::RateLimitExceeded`] /
///   [`ExtractError::LlmApiError`] from the API
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdfvision::{process_file, ExtractionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ExtractionConfig::builder()
///     .source_path("OpenAI-Blog.pdf")
///     .system_prompt("Summarize the content for a markdown document")
///     .build()?;
/// println!("{}", process_file(&config).await?);
/// # Ok(())
/// # }
/// ```
pub async fn process_file(config: &ExtractionConfig) -> Result<String, ExtractError> {
    config.validate()?;
    Extractor::from_config(config)?.process_file(config).await
}

/// [`process_file`], then append the reply's JSON to `config.store_path`.
pub async fn process_file_into_store(config: &ExtractionConfig) -> Result<String, ExtractError> {
    config.validate()?;
    Extractor::from_config(config)?
        .process_file_into_store(config)
        .await
}

/// Synchronous wrapper around [`process_file`].
///
/// Creates a temporary tokio runtime internally.
pub fn process_file_sync(config: &ExtractionConfig) -> Result<String, ExtractError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ExtractError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(process_file(config))
}

/// Process every PDF in `dir` into the store at `store_path`.
pub async fn run_directory(
    dir: impl AsRef<Path>,
    store_path: impl AsRef<Path>,
    template: &ExtractionConfig,
) -> Result<BatchReport, ExtractError> {
    template.validate()?;
    Extractor::from_config(template)?
        .run_directory(dir.as_ref(), store_path.as_ref(), template)
        .await
}
