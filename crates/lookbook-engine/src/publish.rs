use lookbook_contracts::error::StudioError;
use lookbook_contracts::gallery::{GalleryState, MergeOptions};
use lookbook_contracts::generation::{BatchOutcome, GeneratedAngle};
use lookbook_contracts::runs::gallery_store::GalleryStore;
use lookbook_contracts::runs::ledger::{GenerationRecord, LedgerWriter};
use tracing::info;

use crate::orchestrator::{PersistedImage, ResultSink};
use crate::storage::{extension_for_mime, ObjectStore};

/// Uploads each generated angle and appends its ledger record.
pub struct LedgerSink<'a> {
    pub objects: &'a dyn ObjectStore,
    pub ledger: &'a LedgerWriter,
    pub product_id: &'a str,
    pub requested_by: Option<&'a str>,
    pub source_hashes: Vec<String>,
    pub color_reference_hash: Option<String>,
}

impl ResultSink for LedgerSink<'_> {
    fn persist(&mut self, generated: &GeneratedAngle) -> Result<PersistedImage, StudioError> {
        let record_id = GenerationRecord::new_id();
        let key = generated_object_key(
            self.product_id,
            generated.angle.token(),
            &record_id,
            extension_for_mime(&generated.image.mime_type),
        );
        let stored = self
            .objects
            .put(&key, &generated.image.bytes, &generated.image.mime_type)
            .map_err(StudioError::storage)?;

        let reference_hashes = self
            .color_reference_hash
            .iter()
            .chain(generated.anchor_hash.iter())
            .cloned()
            .collect();
        let record = GenerationRecord {
            record_id: record_id.clone(),
            product_id: self.product_id.to_string(),
            angle: generated.angle,
            image_url: stored.url.clone(),
            object_key: stored.key,
            content_hash: generated.image.content_hash.clone(),
            mime_type: generated.image.mime_type.clone(),
            source_hashes: self.source_hashes.clone(),
            reference_hashes,
            anchor_url: generated.anchor_url.clone(),
            profile_id: generated.profile.id.clone(),
            model_used: generated.model_used.clone(),
            prompt: generated.prompt.clone(),
            revised_prompt: generated.revised_prompt.clone(),
            requested_by: self.requested_by.map(str::to_string),
            created_at: GenerationRecord::now(),
        };
        self.ledger.append(&record).map_err(StudioError::storage)?;
        info!(
            product_id = self.product_id,
            angle = generated.angle.token(),
            record_id = record_id.as_str(),
            "generation recorded"
        );
        Ok(PersistedImage {
            url: stored.url,
            record_id,
        })
    }
}

pub fn generated_object_key(
    product_id: &str,
    angle: &str,
    record_id: &str,
    extension: &str,
) -> String {
    format!(
        "products/{}/generated/{angle}-{record_id}.{extension}",
        key_segment(product_id)
    )
}

pub fn crop_object_key(content_hash: &str) -> String {
    format!("crops/{content_hash}.png")
}

/// Single write of the recomputed gallery for one product.
pub fn apply_to_gallery(
    galleries: &GalleryStore,
    product_id: &str,
    outcome: &BatchOutcome,
    options: MergeOptions,
) -> Result<GalleryState, StudioError> {
    let existing = galleries.get(product_id).map_err(StudioError::storage)?;
    let next = existing.merge_generated(&outcome.generated_urls(), options);
    galleries
        .set(product_id, &next)
        .map_err(StudioError::storage)?;
    info!(
        product_id,
        before = existing.images.len(),
        after = next.images.len(),
        "gallery updated"
    );
    Ok(next)
}

fn key_segment(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.trim_matches('.') {
        "" => "_".to_string(),
        trimmed => trimmed.to_string(),
    }
}
