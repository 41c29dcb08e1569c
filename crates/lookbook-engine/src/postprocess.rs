use std::io::Cursor;

use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader};
use lookbook_contracts::api::CropSpec;
use lookbook_contracts::crop::{plan_resize, resolve_extract_rect, ExtractRect, ResizePlan};
use lookbook_contracts::error::StudioError;
use tracing::debug;

const SHARPEN_SIGMA: f32 = 0.8;
const SHARPEN_THRESHOLD: i32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CropOutput {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    pub extract: ExtractRect,
}

/// Decodes `bytes` and bakes any EXIF orientation into the pixels.
pub fn decode_oriented(bytes: &[u8]) -> Result<DynamicImage, StudioError> {
    let unreadable =
        |err: image::ImageError| StudioError::Image(format!("unreadable image: {err}"));
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|err| StudioError::Image(format!("unreadable image: {err}")))?;
    let mut decoder = reader.into_decoder().map_err(unreadable)?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let mut image = DynamicImage::from_decoder(decoder).map_err(unreadable)?;
    image.apply_orientation(orientation);
    if image.width() == 0 || image.height() == 0 {
        return Err(StudioError::Image("image has no pixels".to_string()));
    }
    Ok(image)
}

/// Orient, extract, resize, sharpen, encode PNG.
pub fn process_crop(bytes: &[u8], spec: &CropSpec) -> Result<CropOutput, StudioError> {
    let source = decode_oriented(bytes)?;
    let (source_width, source_height) = (source.width(), source.height());
    let extract = resolve_extract_rect(&spec.rect, source_width, source_height);
    let cropped = source.crop_imm(extract.left, extract.top, extract.width, extract.height);

    let plan = plan_resize(spec.aspect, spec.target_long_edge);
    let (target_width, target_height) = plan.target_dimensions(cropped.width(), cropped.height());
    let resized = match plan {
        ResizePlan::Cover { .. } => {
            cropped.resize_to_fill(target_width, target_height, FilterType::Lanczos3)
        }
        ResizePlan::Fit { .. }
            if (target_width, target_height) != (cropped.width(), cropped.height()) =>
        {
            cropped.resize_exact(target_width, target_height, FilterType::Lanczos3)
        }
        ResizePlan::Fit { .. } => cropped,
    };
    let sharpened = resized.unsharpen(SHARPEN_SIGMA, SHARPEN_THRESHOLD);
    let encodable = match sharpened {
        DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_) => {
            DynamicImage::ImageRgba8(sharpened.to_rgba8())
        }
        other => other,
    };

    let mut cursor = Cursor::new(Vec::new());
    encodable
        .write_to(&mut cursor, ImageFormat::Png)
        .map_err(|err| StudioError::Image(format!("png encode failed: {err}")))?;
    let output = CropOutput {
        bytes: cursor.into_inner(),
        mime_type: "image/png".to_string(),
        width: encodable.width(),
        height: encodable.height(),
        extract,
    };
    debug!(
        source = format!("{source_width}x{source_height}"),
        extract = format!(
            "{}x{}+{}+{}",
            extract.width, extract.height, extract.left, extract.top
        ),
        output = format!("{}x{}", output.width, output.height),
        aspect = %spec.aspect,
        "crop processed"
    );
    Ok(output)
}
