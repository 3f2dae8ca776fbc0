//! # edgequake-pdfvision
//!
//! Extract structured JSON from PDF documents with a vision chat model.
//!
//! Each selected page is rasterised to a PNG, every page image is attached to
//! a single chat-completion request together with a system and a user prompt,
//! and the JSON the model returns inside a fenced block is appended to a JSON
//! store file. A directory of PDFs can be processed in one call, producing one
//! record per document.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      check the path, classify PDF vs. image
//!  ├─ 2. Render     rasterise pages to temp_images/page_<n>.png (pdfium)
//!  ├─ 3. Request    [system, user(text, image, text, image, …)]
//!  ├─ 4. Complete   one chat-completion call per document
//!  └─ 5. Aggregate  pull the fenced JSON out and append it to the store
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdfvision::{process_file_into_store, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads OPENAI_API_KEY (and optionally OPENAI_BASE_URL)
//!     let config = ExtractionConfig::builder()
//!         .source_path("invoice.pdf")
//!         .system_prompt("Return the invoice number and total as a JSON object.")
//!         .user_prompt("Here is a page of the invoice.")
//!         .store_path("invoices.json")
//!         .build()?;
//!     let reply = process_file_into_store(&config).await?;
//!     println!("{reply}");
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfvision` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdfvision = { version = "0.1", default-features = false }
//! ```
//!
//! ## Runtime requirements
//!
//! Rendering needs a pdfium shared library. It is looked up at
//! `PDFIUM_LIB_PATH`, then next to the working directory, then on the system
//! library path. Image sources (`.png`, `.jpg`, …) skip rendering entirely.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ExtractionConfig, ExtractionConfigBuilder, ExtractionJob, FailurePolicy, PageRange,
};
pub use error::{ExtractError, FileError};
pub use extract::{
    list_pdfs, process_file, process_file_into_store, process_file_sync, run_directory, Extractor,
};
pub use output::{BatchReport, FileOutcome};
pub use pipeline::aggregate::{append_record, extract_json_fence, load_store, Record};
pub use pipeline::llm::{ChatApi, ChatRequest, ChatResponse, CompletionClient, OpenAiChatApi};
pub use pipeline::render::{PageImage, PageRasterizer, PdfiumRasterizer};
pub use pipeline::request::{build_request, ContentPart, Message, Role};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
