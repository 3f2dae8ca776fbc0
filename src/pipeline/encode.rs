//! Image encoding: page image file → base64 payload + MIME type.
//!
//! Chat-completion APIs accept images as base64 data-URIs embedded in the
//! JSON request body. The bytes are sent exactly as they sit on disk; the
//! rasteriser already wrote lossless PNGs.

use crate::error::ExtractError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::Path;
use tracing::debug;

/// A base64-encoded image ready to embed in a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub data: String,
    pub mime_type: String,
}

impl EncodedImage {
    /// `data:<mime>;base64,<data>` form used by the wire format.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// Guess the MIME type from the file extension. Unknown extensions are
/// treated as PNG, the format the rasteriser produces.
pub fn mime_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/png",
    }
}

/// Read an image file and base64-encode it.
pub fn encode_image_file(path: &Path) -> Result<EncodedImage, ExtractError> {
    let bytes = std::fs::read(path).map_err(|e| ExtractError::ImageReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    let data = STANDARD.encode(&bytes);
    debug!(
        "Encoded {} → {} bytes base64",
        path.display(),
        data.len()
    );

    Ok(EncodedImage {
        data,
        mime_type: mime_type_for(path).to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};

    #[test]
    fn encode_small_png() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("page_1.png");
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        img.save_with_format(&p, image::ImageFormat::Png).unwrap();

        let encoded = encode_image_file(&p).expect("encode should succeed");
        assert_eq!(encoded.mime_type, "image/png");
        let decoded = STANDARD.decode(&encoded.data).expect("valid base64");
        assert_eq!(decoded, std::fs::read(&p).unwrap());
        assert!(encoded.to_data_url().starts_with("data:image/png;base64,"));
    }

    #[test]
    fn mime_types() {
        assert_eq!(mime_type_for(Path::new("a.JPG")), "image/jpeg");
        assert_eq!(mime_type_for(Path::new("a.jpeg")), "image/jpeg");
        assert_eq!(mime_type_for(Path::new("a.webp")), "image/webp");
        assert_eq!(mime_type_for(Path::new("a.gif")), "image/gif");
        assert_eq!(mime_type_for(Path::new("a.png")), "image/png");
        assert_eq!(mime_type_for(Path::new("noext")), "image/png");
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = encode_image_file(Path::new("/no/such/page_1.png")).unwrap_err();
        assert!(matches!(err, ExtractError::ImageReadFailed { .. }));
    }
}
