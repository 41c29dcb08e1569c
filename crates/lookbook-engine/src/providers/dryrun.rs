use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use lookbook_contracts::error::UpstreamFailure;
use sha2::{Digest, Sha256};

use super::{ImageModel, InlineImage, ModelOutput, PromptPayload, ResponsePart};

/// Offline provider: renders a flat swatch whose color is derived from the prompt.
pub struct DryrunModel {
    size: u32,
}

impl Default for DryrunModel {
    fn default() -> Self {
        Self { size: 512 }
    }
}

impl DryrunModel {
    pub fn new(size: u32) -> Self {
        Self { size: size.max(1) }
    }
}

impl ImageModel for DryrunModel {
    fn provider(&self) -> &str {
        "dryrun"
    }

    fn generate(
        &self,
        model: &str,
        payload: &PromptPayload,
    ) -> Result<ModelOutput, UpstreamFailure> {
        let (r, g, b) = color_from_prompt(&payload.text, payload.images.len() as u64);
        let mut image = RgbImage::new(self.size, self.size);
        for pixel in image.pixels_mut() {
            *pixel = Rgb([r, g, b]);
        }
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(image)
            .write_to(&mut cursor, ImageFormat::Png)
            .map_err(|err| {
                UpstreamFailure::new(
                    Some(500),
                    Some("DRYRUN_ENCODE"),
                    format!("dryrun encode failed: {err}"),
                )
            })?;
        Ok(ModelOutput {
            parts: vec![
                ResponsePart::Image(InlineImage {
                    bytes: cursor.into_inner(),
                    mime_type: "image/png".to_string(),
                }),
                ResponsePart::Text(format!("dryrun render from {model}")),
            ],
        })
    }
}

fn color_from_prompt(prompt: &str, seed: u64) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(seed.to_be_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}
