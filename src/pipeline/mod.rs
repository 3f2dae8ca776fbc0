//! Pipeline stages for PDF-to-JSON extraction.
//!
//! Each submodule implements exactly one transformation step, so each is
//! testable on its own and the rendering backend or the API client can be
//! swapped without touching the other stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode/request ──▶ llm ──▶ aggregate
//! (path)    (pdfium)   (base64 + prompts)  (API)   (fence → JSON store)
//! ```
//!
//! 1. [`input`]:     validate the source path and classify PDF vs. image
//! 2. [`render`]:    rasterise pages to `page_<n>.png`; runs in
//!    `spawn_blocking` because pdfium is blocking
//! 3. [`encode`]:    read an image file and base64-wrap it
//! 4. [`request`]:   build the `[system, user]` message pair
//! 5. [`llm`]:       the only stage with network I/O
//! 6. [`aggregate`]: extract the fenced JSON and append it to the store

pub mod aggregate;
pub mod encode;
pub mod input;
pub mod llm;
pub mod render;
pub mod request;
