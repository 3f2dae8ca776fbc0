//! PDF rasterisation: render selected pages to PNG files via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which is CPU-bound
//! and not async-aware. [`render_pages`] moves the work onto Tokio's blocking
//! pool so the runtime's worker threads never stall during rendering.
//!
//! ## Naming
//!
//! Pages are written as `page_<ordinal>.png` where the ordinal always starts
//! at 1, whatever the first rendered page is. Rendering pages 5–7 therefore
//! produces `page_1.png`, `page_2.png`, `page_3.png`; the true page number is
//! kept on [`PageImage::page_number`].

use crate::config::PageRange;
use crate::error::ExtractError;
use crate::progress::ProgressCallback;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Environment variable pointing at a pdfium library file or its directory.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// One rendered page on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    /// Where the image was written.
    pub path: PathBuf,
    /// 1-based position among the rendered pages.
    pub ordinal: u32,
    /// 1-based page number in the source PDF.
    pub page_number: u32,
}

impl PageImage {
    pub fn new(path: impl Into<PathBuf>, ordinal: u32, page_number: u32) -> Self {
        Self {
            path: path.into(),
            ordinal,
            page_number,
        }
    }
}

/// Turns a PDF into an ordered sequence of page images.
///
/// Implementations block; call through [`render_pages`] from async code.
pub trait PageRasterizer: Send + Sync {
    /// Render `range` (or every page) of `pdf_path` into `output_dir`.
    fn rasterize(
        &self,
        pdf_path: &Path,
        output_dir: &Path,
        range: Option<PageRange>,
    ) -> Result<Vec<PageImage>, ExtractError>;
}

/// Run a rasteriser on the blocking thread pool.
pub async fn render_pages(
    rasterizer: Arc<dyn PageRasterizer>,
    pdf_path: &Path,
    output_dir: &Path,
    range: Option<PageRange>,
) -> Result<Vec<PageImage>, ExtractError> {
    let pdf = pdf_path.to_path_buf();
    let out = output_dir.to_path_buf();

    tokio::task::spawn_blocking(move || rasterizer.rasterize(&pdf, &out, range))
        .await
        .map_err(|e| ExtractError::Internal(format!("Render task panicked: {}", e)))?
}

/// Create `dir` if it is missing. Returns true when it was created.
pub fn ensure_output_dir(dir: &Path, progress: Option<&ProgressCallback>) -> Result<bool, ExtractError> {
    let created = if dir.is_dir() {
        info!("Directory '{}' already exists.", dir.display());
        false
    } else {
        std::fs::create_dir_all(dir).map_err(|e| ExtractError::ImageWriteFailed {
            path: dir.to_path_buf(),
            detail: format!("could not create output directory: {e}"),
        })?;
        info!("Directory '{}' created.", dir.display());
        true
    };

    if let Some(cb) = progress {
        cb.on_output_dir_ready(dir, created);
    }
    Ok(created)
}

/// Path of the `ordinal`-th rendered page inside `dir`.
pub fn page_image_path(dir: &Path, ordinal: u32) -> PathBuf {
    dir.join(format!("page_{ordinal}.png"))
}

/// Expand an optional range into the 1-indexed page numbers to render.
pub fn page_numbers_for(range: Option<PageRange>, total_pages: u32) -> Result<Vec<u32>, ExtractError> {
    match range {
        None => Ok((1..=total_pages).collect()),
        Some(r) if r.last() > total_pages => Err(ExtractError::PageOutOfRange {
            first: r.first(),
            last: r.last(),
            total: total_pages,
        }),
        Some(r) => Ok((r.first()..=r.last()).collect()),
    }
}

/// Bind pdfium: `PDFIUM_LIB_PATH` if set, else the working directory, else
/// the system library search path.
pub fn bind_pdfium() -> Result<Pdfium, ExtractError> {
    if let Ok(custom) = std::env::var(PDFIUM_LIB_PATH_ENV) {
        let custom = PathBuf::from(custom);
        let lib = if custom.is_dir() {
            Pdfium::pdfium_platform_library_name_at_path(&custom)
        } else {
            custom
        };
        debug!("Binding pdfium from {}", lib.display());
        return Pdfium::bind_to_library(&lib)
            .map(Pdfium::new)
            .map_err(|e| ExtractError::PdfiumBindingFailed(format!("{}: {:?}", lib.display(), e)));
    }

    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map(Pdfium::new)
        .map_err(|e| ExtractError::PdfiumBindingFailed(format!("{:?}", e)))
}

/// [`PageRasterizer`] backed by pdfium.
pub struct PdfiumRasterizer {
    max_rendered_pixels: u32,
    progress: Option<ProgressCallback>,
}

impl PdfiumRasterizer {
    pub fn new(max_rendered_pixels: u32) -> Self {
        Self {
            max_rendered_pixels,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }
}

impl PageRasterizer for PdfiumRasterizer {
    fn rasterize(
        &self,
        pdf_path: &Path,
        output_dir: &Path,
        range: Option<PageRange>,
    ) -> Result<Vec<PageImage>, ExtractError> {
        ensure_output_dir(output_dir, self.progress.as_ref())?;

        let pdfium = bind_pdfium()?;
        let document = pdfium
            .load_pdf_from_file(pdf_path, None)
            .map_err(|e| ExtractError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: format!("{:?}", e),
            })?;

        let pages = document.pages();
        let total_pages = pages.len() as u32;
        if total_pages == 0 {
            return Err(ExtractError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: "document has no pages".into(),
            });
        }

        let numbers = page_numbers_for(range, total_pages)?;
        match range {
            None => info!("Converting all {} pages to images", total_pages),
            Some(r) => info!("Converting pages {} to {} to images", r.first(), r.last()),
        }
        if let Some(cb) = &self.progress {
            cb.on_render_start(numbers.len() as u32, range.map(|r| (r.first(), r.last())));
        }

        let render_config = PdfRenderConfig::new()
            .set_target_width(self.max_rendered_pixels as i32)
            .set_maximum_height(self.max_rendered_pixels as i32);

        let mut images = Vec::with_capacity(numbers.len());

        for (i, &page_number) in numbers.iter().enumerate() {
            let ordinal = i as u32 + 1;

            let page = pages
                .get((page_number - 1) as u16)
                .map_err(|e| ExtractError::RasterisationFailed {
                    page: page_number,
                    detail: format!("{:?}", e),
                })?;

            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                ExtractError::RasterisationFailed {
                    page: page_number,
                    detail: format!("{:?}", e),
                }
            })?;

            let image = bitmap.as_image();
            let path = page_image_path(output_dir, ordinal);
            image
                .save_with_format(&path, image::ImageFormat::Png)
                .map_err(|e| ExtractError::ImageWriteFailed {
                    path: path.clone(),
                    detail: e.to_string(),
                })?;

            debug!(
                "Rendered page {} → {}x{} px",
                page_number,
                image.width(),
                image.height()
            );
            info!("Page {} saved as {}", ordinal, path.display());
            if let Some(cb) = &self.progress {
                cb.on_page_saved(ordinal, &path);
            }

            images.push(PageImage::new(path, ordinal, page_number));
        }

        Ok(images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ExtractionProgressCallback;
    use std::sync::Mutex;

    #[test]
    fn all_pages_when_no_range() {
        assert_eq!(page_numbers_for(None, 4).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn inclusive_range() {
        let r = PageRange::new(2, 4).unwrap();
        assert_eq!(page_numbers_for(Some(r), 10).unwrap(), vec![2, 3, 4]);

        let single = PageRange::new(3, 3).unwrap();
        assert_eq!(page_numbers_for(Some(single), 3).unwrap(), vec![3]);
    }

    #[test]
    fn range_past_end_is_out_of_range() {
        let r = PageRange::new(3, 9).unwrap();
        let err = page_numbers_for(Some(r), 4).unwrap_err();
        assert!(matches!(
            err,
            ExtractError::PageOutOfRange {
                first: 3,
                last: 9,
                total: 4
            }
        ));
    }

    #[test]
    fn page_paths_use_ordinals() {
        assert_eq!(
            page_image_path(Path::new("temp_images"), 3),
            PathBuf::from("temp_images/page_3.png")
        );
    }

    #[derive(Default)]
    struct DirEvents(Mutex<Vec<bool>>);

    impl ExtractionProgressCallback for DirEvents {
        fn on_output_dir_ready(&self, _dir: &Path, created: bool) {
            self.0.lock().unwrap().push(created);
        }
    }

    #[test]
    fn ensure_output_dir_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested/temp_images");
        let events = Arc::new(DirEvents::default());
        let cb: ProgressCallback = events.clone();

        assert!(ensure_output_dir(&dir, Some(&cb)).unwrap());
        assert!(dir.is_dir());
        assert!(!ensure_output_dir(&dir, Some(&cb)).unwrap());
        assert_eq!(*events.0.lock().unwrap(), vec![true, false]);
    }
}
