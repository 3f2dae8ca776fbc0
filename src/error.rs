//! Error types for the edgequake-pdfvision library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ExtractError`]: **Fatal** for the operation that returned it: bad
//!   configuration, an unreadable PDF, a rejected API call, a store that
//!   cannot be written. Returned as `Err(ExtractError)` from every public
//!   entry point.
//!
//! * [`FileError`]: **Non-fatal** in batch mode: one PDF in a directory
//!   failed, but the others may still be fine. Stored inside
//!   [`crate::output::FileOutcome`] so callers can inspect partial success
//!   rather than losing the whole batch to one bad file.
//!
//! The variants of [`ExtractError`] fall into a small taxonomy (config, PDF
//! decode, API, record/store). The `is_*` helpers let callers branch on the
//! family without matching every variant.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdfvision library.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or job validation failed (empty system prompt, half-specified
    /// page range, missing source path, …).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Source file was not found at the given path.
    #[error("Source file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// Batch input directory does not exist or is not a directory.
    #[error("Input directory not found: '{path}'")]
    DirectoryNotFound { path: PathBuf },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// The file has a `.pdf` extension but does not start with `%PDF`.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' could not be decoded: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// The requested page range exceeds the actual page count.
    #[error("Pages {first}-{last} are out of range (document has {total} pages)")]
    PageOutOfRange { first: u32, last: u32, total: u32 },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: u32, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install libpdfium on the system library path, or set\n\
PDFIUM_LIB_PATH=/path/to/libpdfium (file or containing directory).\n"
    )]
    PdfiumBindingFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// Missing API key, or the API answered 401/403.
    #[error("Authentication error from the completion API: {detail}")]
    AuthError { detail: String },

    /// The API answered 429; back off before retrying.
    ///
    /// Check `retry_after_secs` for a server-specified delay.
    #[error("Rate limit exceeded by the completion API")]
    RateLimitExceeded { retry_after_secs: Option<u64> },

    /// Any other non-2xx answer, transport failure, or unusable response body.
    #[error("Completion API error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    LlmApiError {
        status: Option<u16>,
        message: String,
    },

    // ── Record / store errors ─────────────────────────────────────────────
    /// A reply (or record) could not be parsed as JSON, or cannot be merged
    /// into the existing store.
    #[error("Malformed record: {detail}")]
    MalformedRecord { detail: String },

    /// The store file holds JSON that is neither an array nor an object.
    #[error("Store '{path}' holds a JSON {found}; expected an array or an object")]
    UnsupportedStoreShape { path: PathBuf, found: &'static str },

    /// The store file exists but is not valid JSON.
    #[error("Store '{path}' is not valid JSON: {detail}")]
    CorruptStore { path: PathBuf, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// A page image could not be read for encoding.
    #[error("Failed to read image '{path}': {source}")]
    ImageReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A rendered page could not be written to the output directory.
    #[error("Failed to write page image '{path}': {detail}")]
    ImageWriteFailed { path: PathBuf, detail: String },

    /// The store exists but could not be read (permissions, a directory, …).
    #[error("Failed to read store '{path}': {source}")]
    StoreReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The completion succeeded but its result could not be stored. The
    /// raw reply is kept so it is not lost.
    #[error("Reply received but not stored: {source}")]
    ReplyNotStored {
        reply: String,
        #[source]
        source: Box<ExtractError>,
    },

    /// Could not write the JSON store.
    #[error("Failed to write store '{path}': {source}")]
    StoreWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExtractError {
    /// Configuration or input-path problem; retrying unchanged will not help.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig(_)
                | Self::FileNotFound { .. }
                | Self::PermissionDenied { .. }
                | Self::DirectoryNotFound { .. }
        )
    }

    /// The PDF could not be opened or rendered.
    pub fn is_pdf_error(&self) -> bool {
        matches!(
            self,
            Self::NotAPdf { .. }
                | Self::CorruptPdf { .. }
                | Self::PageOutOfRange { .. }
                | Self::RasterisationFailed { .. }
                | Self::PdfiumBindingFailed(_)
        )
    }

    /// The model reply carried by [`ExtractError::ReplyNotStored`].
    pub fn unstored_reply(&self) -> Option<&str> {
        match self {
            Self::ReplyNotStored { reply, .. } => Some(reply),
            _ => None,
        }
    }

    /// The upstream completion API rejected or failed the call.
    pub fn is_api_error(&self) -> bool {
        matches!(
            self,
            Self::AuthError { .. } | Self::RateLimitExceeded { .. } | Self::LlmApiError { .. }
        )
    }
}

/// A non-fatal error for a single file of a batch run.
///
/// Stored in [`crate::output::FileOutcome`] when the batch runs with
/// [`crate::config::FailurePolicy::Continue`].
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum FileError {
    /// Opening or rasterising the PDF failed.
    #[error("{file}: rasterisation failed: {detail}")]
    RenderFailed { file: String, detail: String },

    /// The completion call failed.
    #[error("{file}: completion failed: {detail}")]
    CompletionFailed { file: String, detail: String },

    /// The reply could not be stored (bad JSON, store shape, I/O).
    #[error("{file}: could not store result: {detail}")]
    StoreFailed { file: String, detail: String },
}

impl FileError {
    /// Classify a fatal error raised while processing `file`.
    pub fn from_extract(file: impl Into<String>, err: &ExtractError) -> Self {
        let file = file.into();
        let detail = err.to_string();
        if err.is_api_error() {
            FileError::CompletionFailed { file, detail }
        } else if matches!(
            err,
            ExtractError::MalformedRecord { .. }
                | ExtractError::UnsupportedStoreShape { .. }
                | ExtractError::CorruptStore { .. }
                | ExtractError::StoreReadFailed { .. }
                | ExtractError::StoreWriteFailed { .. }
                | ExtractError::ReplyNotStored { .. }
        ) {
            FileError::StoreFailed { file, detail }
        } else {
            FileError::RenderFailed { file, detail }
        }
    }
}
