//! CLI binary for edgequake-pdfvision.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExtractionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdfvision::{
    process_file, process_file_into_store, run_directory, ExtractionConfig,
    ExtractionProgressCallback, FailurePolicy, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: a spinner while pages render and the model answers,
/// switched to a files bar once a batch reports its size.
struct CliProgressCallback {
    bar: ProgressBar,
    file_started: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening input…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            file_started: Mutex::new(None),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self) -> f64 {
        self.file_started
            .lock()
            .ok()
            .and_then(|mut t| t.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_output_dir_ready(&self, dir: &Path, created: bool) {
        let state = if created { "created" } else { "already exists" };
        self.bar.println(format!(
            "  {} Directory '{}' {}.",
            dim("·"),
            dir.display(),
            state
        ));
    }

    fn on_render_start(&self, total_pages: u32, range: Option<(u32, u32)>) {
        let what = match range {
            Some((first, last)) => format!("Converting pages {first}-{last}…"),
            None => format!("Converting all {total_pages} pages…"),
        };
        self.bar.set_message(what.clone());
        self.bar.println(format!("{} {}", cyan("◆"), bold(&what)));
    }

    fn on_page_saved(&self, ordinal: u32, path: &Path) {
        self.bar.println(format!(
            "  {} Page {:>3} saved as {}",
            green("✓"),
            ordinal,
            dim(&path.display().to_string())
        ));
    }

    fn on_file_start(&self, path: &Path, index: usize, total: usize) {
        if index == 1 {
            self.activate_bar(total);
        }
        if let Ok(mut t) = self.file_started.lock() {
            *t = Some(Instant::now());
        }
        self.bar.set_message(path.display().to_string());
    }

    fn on_file_complete(&self, path: &Path, index: usize, total: usize, reply_len: usize) {
        self.bar.println(format!(
            "  {} File {:>3}/{:<3}  {}  {:<8}  {}",
            green("✓"),
            index,
            total,
            path.display(),
            dim(&format!("{reply_len:>5} chars")),
            dim(&format!("{:.1}s", self.elapsed_secs())),
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, path: &Path, index: usize, total: usize, error: &str) {
        let msg = if error.chars().count() > 80 {
            let cut: String = error.chars().take(79).collect();
            format!("{cut}\u{2026}")
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} File {:>3}/{:<3}  {}  {}  {}",
            red("✗"),
            index,
            total,
            path.display(),
            red(&msg),
            dim(&format!("{:.1}s", self.elapsed_secs())),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let failed = total.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} files extracted successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} files extracted  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Single PDF, reply printed to stdout
  pdfvision --system-prompt "Return the title and authors as JSON." paper.pdf

  # Pages 2-4 only, JSON appended to a store
  pdfvision --first-page 2 --last-page 4 --store results.json \
            --system-prompt-file prompt.txt invoice.pdf

  # Every PDF in a directory, one record each
  pdfvision --store results.json --system-prompt-file prompt.txt ./invoices/

  # A single image instead of a PDF
  pdfvision --system-prompt "Describe the chart as JSON." chart.png

  # Any OpenAI-compatible endpoint
  pdfvision --api-base-url http://localhost:11434/v1 --model llava ...

STORE FILE:
  A JSON array or object. Array stores get one element per document;
  object stores are merged key by key. A missing or empty file starts
  as an empty array.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY     API key (required)
  OPENAI_BASE_URL    Chat-completions base URL (default https://api.openai.com/v1)
  PDFIUM_LIB_PATH    Directory or file of the pdfium shared library
  RUST_LOG           Log filter, overrides -v / -q
"#;

/// Extract structured JSON from PDFs with a vision chat model.
#[derive(Parser, Debug)]
#[command(
    name = "pdfvision",
    version,
    about = "Extract structured JSON from PDFs with a vision chat model",
    long_about = "Render PDF pages to images, send them with your prompts to an \
OpenAI-compatible vision model, and append the JSON it returns to a store file. \
INPUT may be a single PDF, an image, or a directory of PDFs.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF file, image file, or directory of PDFs.
    input: PathBuf,

    /// System prompt text.
    #[arg(long, env = "PDFVISION_SYSTEM_PROMPT", conflicts_with = "system_prompt_file")]
    system_prompt: Option<String>,

    /// Read the system prompt from this file.
    #[arg(long, env = "PDFVISION_SYSTEM_PROMPT_FILE")]
    system_prompt_file: Option<PathBuf>,

    /// Text placed before every page image.
    #[arg(long, env = "PDFVISION_USER_PROMPT", default_value = "")]
    user_prompt: String,

    /// First page to render (1-indexed). Requires --last-page.
    #[arg(long, env = "PDFVISION_FIRST_PAGE", requires = "last_page")]
    first_page: Option<u32>,

    /// Last page to render (inclusive). Requires --first-page.
    #[arg(long, env = "PDFVISION_LAST_PAGE", requires = "first_page")]
    last_page: Option<u32>,

    /// Directory rendered pages are written to.
    #[arg(long, env = "PDFVISION_OUTPUT_DIR", default_value = "temp_images")]
    output_dir: PathBuf,

    /// JSON store to append results to. Required for a directory INPUT.
    #[arg(short, long, env = "PDFVISION_STORE")]
    store: Option<PathBuf>,

    /// Chat model ID.
    #[arg(long, env = "PDFVISION_MODEL", default_value = "gpt-4o")]
    model: String,

    /// Max tokens the model may generate.
    #[arg(long, env = "PDFVISION_MAX_TOKENS", default_value_t = 1000,
          value_parser = clap::value_parser!(u32).range(1..))]
    max_tokens: u32,

    /// Chat-completions base URL (overrides OPENAI_BASE_URL).
    #[arg(long, env = "PDFVISION_API_BASE_URL")]
    api_base_url: Option<String>,

    /// API call timeout in seconds.
    #[arg(long, env = "PDFVISION_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Directory mode: stop at the first failing file.
    #[arg(long, env = "PDFVISION_FAIL_FAST")]
    fail_fast: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDFVISION_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFVISION_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDFVISION_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress = if show_progress {
        Some(CliProgressCallback::new())
    } else {
        None
    };
    let progress_cb = progress
        .clone()
        .map(|cb| cb as Arc<dyn ExtractionProgressCallback>);

    let config = build_config(&cli, progress_cb).await?;

    if cli.input.is_dir() {
        let store = cli
            .store
            .as_deref()
            .context("--store is required when INPUT is a directory")?;

        let result = run_directory(&cli.input, store, &config).await;
        if let Some(cb) = &progress {
            cb.finish();
        }
        let report = result.context("Batch extraction failed")?;

        if !cli.quiet && !show_progress {
            eprintln!(
                "Extracted {}/{} files in {}ms",
                report.succeeded(),
                report.total(),
                report.total_duration_ms
            );
            for err in report.errors() {
                eprintln!("  {} {}", red("✗"), err);
            }
        }
        if !cli.quiet {
            eprintln!("   results  →  {}", bold(&store.display().to_string()));
        }
        if report.failed() > 0 && report.succeeded() == 0 {
            anyhow::bail!("all {} files failed", report.failed());
        }
        return Ok(());
    }

    let result = if cli.store.is_some() {
        process_file_into_store(&config).await
    } else {
        process_file(&config).await
    };
    if let Some(cb) = &progress {
        cb.finish();
    }
    let reply = match result {
        Ok(reply) => reply,
        Err(e) => {
            // The API call succeeded; show the reply even though it was not stored.
            if let Some(reply) = e.unstored_reply() {
                write_reply(reply)?;
            }
            return Err(e).context("Extraction failed");
        }
    };
    write_reply(&reply)?;

    if !cli.quiet {
        if let Some(store) = &cli.store {
            eprintln!(
                "{}  result appended  →  {}",
                green("✔"),
                bold(&store.display().to_string())
            );
        }
    }

    Ok(())
}

fn write_reply(reply: &str) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(reply.as_bytes())
        .context("Failed to write to stdout")?;
    if !reply.ends_with('\n') {
        handle.write_all(b"\n").ok();
    }
    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let system_prompt = match (&cli.system_prompt, &cli.system_prompt_file) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?,
        (None, None) => {
            anyhow::bail!("a system prompt is required (--system-prompt or --system-prompt-file)")
        }
    };

    let mut builder = ExtractionConfig::builder()
        .source_path(&cli.input)
        .system_prompt(system_prompt)
        .user_prompt(cli.user_prompt.clone())
        .output_dir(&cli.output_dir)
        .model(cli.model.clone())
        .max_tokens(cli.max_tokens)
        .api_timeout_secs(cli.api_timeout)
        .failure_policy(if cli.fail_fast {
            FailurePolicy::FailFast
        } else {
            FailurePolicy::Continue
        });

    if let (Some(first), Some(last)) = (cli.first_page, cli.last_page) {
        builder = builder.pages(first, last);
    }
    if let Some(store) = &cli.store {
        builder = builder.store_path(store);
    }
    if let Some(url) = &cli.api_base_url {
        builder = builder.api_base_url(url.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
