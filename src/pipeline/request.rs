//! Request building: prompts + page images → the two-message chat payload.
//!
//! The payload is always `[system, user]`. The user message interleaves the
//! user prompt with the images: for `k` images it carries `2k` parts,
//! `text, image, text, image, …`, with the same prompt text repeated before
//! every image so the model sees an instruction next to each page.

use crate::error::ExtractError;
use crate::pipeline::encode::{encode_image_file, EncodedImage};
use crate::pipeline::render::PageImage;
use serde::{Deserialize, Serialize};

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// One fragment of a message's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text { text: String },
    InlineImage { data: String, mime_type: String },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, ContentPart::Text { .. })
    }

    pub fn is_image(&self) -> bool {
        matches!(self, ContentPart::InlineImage { .. })
    }
}

impl From<EncodedImage> for ContentPart {
    fn from(img: EncodedImage) -> Self {
        ContentPart::InlineImage {
            data: img.data,
            mime_type: img.mime_type,
        }
    }
}

/// A chat message with ordered content parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentPart>,
}

/// Build the system message. Fails if `system_prompt` is blank.
pub fn build_system_message(system_prompt: &str) -> Result<Message, ExtractError> {
    if system_prompt.trim().is_empty() {
        return Err(ExtractError::InvalidConfig(
            "system prompt cannot be empty".into(),
        ));
    }
    Ok(Message {
        role: Role::System,
        content: vec![ContentPart::text(system_prompt)],
    })
}

/// Build the user message: `user_prompt` then the image, once per image.
pub fn build_user_message(user_prompt: &str, images: &[PageImage]) -> Result<Message, ExtractError> {
    let mut content = Vec::with_capacity(images.len() * 2);
    for page in images {
        let encoded = encode_image_file(&page.path)?;
        content.push(ContentPart::text(user_prompt));
        content.push(encoded.into());
    }
    Ok(Message {
        role: Role::User,
        content,
    })
}

/// Build the full `[system, user]` request.
///
/// The system prompt is checked before any image is read.
pub fn build_request(
    system_prompt: &str,
    user_prompt: &str,
    images: &[PageImage],
) -> Result<Vec<Message>, ExtractError> {
    let system = build_system_message(system_prompt)?;
    let user = build_user_message(user_prompt, images)?;
    Ok(vec![system, user])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn write_pages(dir: &Path, n: u32) -> Vec<PageImage> {
        (1..=n)
            .map(|i| {
                let p = dir.join(format!("page_{i}.png"));
                std::fs::write(&p, format!("png-bytes-{i}")).unwrap();
                PageImage::new(p, i, i)
            })
            .collect()
    }

    #[test]
    fn system_message_requires_prompt() {
        assert!(build_system_message("").is_err());
        assert!(build_system_message("  ").is_err());

        let m = build_system_message("Summarise").unwrap();
        assert_eq!(m.role, Role::System);
        assert_eq!(m.content, vec![ContentPart::text("Summarise")]);
    }

    #[test]
    fn user_message_alternates_text_and_images() {
        let dir = tempfile::tempdir().unwrap();
        let pages = write_pages(dir.path(), 3);

        let m = build_user_message("What is on this page?", &pages).unwrap();
        assert_eq!(m.role, Role::User);
        assert_eq!(m.content.len(), 6);
        for (i, part) in m.content.iter().enumerate() {
            if i % 2 == 0 {
                assert_eq!(part, &ContentPart::text("What is on this page?"));
            } else {
                assert!(part.is_image(), "part {i} should be an image");
            }
        }
    }

    #[test]
    fn images_keep_page_order() {
        use base64::{engine::general_purpose::STANDARD, Engine as _};

        let dir = tempfile::tempdir().unwrap();
        let pages = write_pages(dir.path(), 2);
        let m = build_user_message("", &pages).unwrap();

        let decoded: Vec<String> = m
            .content
            .iter()
            .filter_map(|p| match p {
                ContentPart::InlineImage { data, .. } => {
                    Some(String::from_utf8(STANDARD.decode(data).unwrap()).unwrap())
                }
                _ => None,
            })
            .collect();
        assert_eq!(decoded, vec!["png-bytes-1", "png-bytes-2"]);
    }

    #[test]
    fn no_images_means_empty_user_content() {
        let m = build_user_message("prompt", &[]).unwrap();
        assert!(m.content.is_empty());
    }

    #[test]
    fn request_is_system_then_user() {
        let dir = tempfile::tempdir().unwrap();
        let pages = write_pages(dir.path(), 1);
        let req = build_request("sys", "usr", &pages).unwrap();
        assert_eq!(req.len(), 2);
        assert_eq!(req[0].role, Role::System);
        assert_eq!(req[1].role, Role::User);
        assert_eq!(req[1].content.len(), 2);
    }

    #[test]
    fn empty_system_prompt_fails_before_reading_images() {
        let missing = vec![PageImage::new("/no/such/page_1.png", 1, 1)];
        let err = build_request("", "usr", &missing).unwrap_err();
        assert!(matches!(err, ExtractError::InvalidConfig(_)));
    }
}
