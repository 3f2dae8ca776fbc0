//! Source resolution: classify a user-supplied path as a PDF or an image.
//!
//! PDFs go through the rasteriser; anything else is assumed to be an image
//! that can be sent to the model as-is. We validate the PDF magic bytes
//! (`%PDF`) up front so callers get a meaningful error rather than a pdfium
//! failure deep inside rendering.

use crate::error::ExtractError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A validated source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// A PDF to rasterise.
    Pdf(PathBuf),
    /// An image file sent directly, without rendering.
    Image(PathBuf),
}

impl Source {
    pub fn path(&self) -> &Path {
        match self {
            Source::Pdf(p) | Source::Image(p) => p,
        }
    }
}

/// True when the file name ends in `.pdf`, ignoring case.
pub fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

/// Validate that `path` exists and is readable, and classify it.
pub fn resolve_source(path: &Path) -> Result<Source, ExtractError> {
    if path.as_os_str().is_empty() {
        return Err(ExtractError::InvalidConfig(
            "you must provide a path to an image file or a PDF".into(),
        ));
    }

    if !path.is_file() {
        return Err(ExtractError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let mut file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ExtractError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(ExtractError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    };

    if !has_pdf_extension(path) {
        debug!("Resolved image source: {}", path.display());
        return Ok(Source::Image(path.to_path_buf()));
    }

    let mut magic = [0u8; 4];
    if file.read_exact(&mut magic).is_err() || &magic != b"%PDF" {
        return Err(ExtractError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }

    debug!("Resolved PDF source: {}", path.display());
    Ok(Source::Pdf(path.to_path_buf()))
}
