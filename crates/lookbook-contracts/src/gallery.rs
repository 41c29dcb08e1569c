use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryState {
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_image: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOptions {
    pub place_first: bool,
    pub max_images: Option<usize>,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            place_first: true,
            max_images: None,
        }
    }
}

impl GalleryState {
    pub fn new(images: Vec<String>, reference_image: Option<String>) -> Self {
        Self {
            images,
            reference_image,
        }
    }

    /// Recomputes the gallery after a batch; the receiver is left untouched.
    pub fn merge_generated(&self, generated: &[String], options: MergeOptions) -> GalleryState {
        GalleryState {
            images: merge_gallery(
                &self.images,
                generated,
                self.reference_image.as_deref(),
                options,
            ),
            reference_image: self.reference_image.clone(),
        }
    }
}

/// Order-preserving merge: generated URLs go before or after what remains of
/// `existing`, first occurrence of any URL wins, the reference URL is never
/// kept, and the result is cut to `max_images`.
pub fn merge_gallery(
    existing: &[String],
    generated: &[String],
    reference: Option<&str>,
    options: MergeOptions,
) -> Vec<String> {
    let reference = reference.map(str::trim).filter(|value| !value.is_empty());
    let fresh = dedupe(generated.iter(), &[]);
    let remainder = dedupe(existing.iter(), &fresh);

    let ordered = if options.place_first {
        fresh.into_iter().chain(remainder)
    } else {
        remainder.into_iter().chain(fresh)
    };

    let mut merged: Vec<String> = ordered
        .filter(|url| Some(url.as_str()) != reference)
        .collect();
    if let Some(max) = options.max_images {
        merged.truncate(max);
    }
    merged
}

fn dedupe<'a>(urls: impl Iterator<Item = &'a String>, exclude: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for url in urls {
        let trimmed = url.trim();
        if trimmed.is_empty() {
            continue;
        }
        if exclude.iter().any(|row| row == trimmed) || out.iter().any(|row| row == trimmed) {
            continue;
        }
        out.push(trimmed.to_string());
    }
    out
}
