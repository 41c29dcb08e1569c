mod dryrun;
mod gemini;

pub use dryrun::DryrunModel;
pub use gemini::{normalize_part, parse_error_body, parse_response_parts, GeminiClient};

use lookbook_contracts::error::UpstreamFailure;
use lookbook_contracts::generation::ImageBlob;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// A response part after wire-shape normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponsePart {
    Image(InlineImage),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModelOutput {
    pub parts: Vec<ResponsePart>,
}

impl ModelOutput {
    pub fn into_first_image(self) -> (Option<InlineImage>, Option<String>) {
        let mut image = None;
        let mut notes = Vec::new();
        for part in self.parts {
            match part {
                ResponsePart::Image(inline) if image.is_none() => image = Some(inline),
                ResponsePart::Image(_) => {}
                ResponsePart::Text(text) => {
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        notes.push(trimmed.to_string());
                    }
                }
            }
        }
        let notes = (!notes.is_empty()).then(|| notes.join("\n"));
        (image, notes)
    }
}

/// Text instruction plus reference images, sent identically to every candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPayload {
    pub text: String,
    pub images: Vec<ImageBlob>,
}

pub trait ImageModel: Send + Sync {
    fn provider(&self) -> &str;
    fn generate(
        &self,
        model: &str,
        payload: &PromptPayload,
    ) -> Result<ModelOutput, UpstreamFailure>;
}
