use sha2::{Digest, Sha256};

use crate::angles::Angle;
use crate::error::AngleFailure;
use crate::profiles::StyleProfile;

/// Validated form of one generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub source_image_urls: Vec<String>,
    pub color_reference_image_url: Option<String>,
    pub custom_prompt: Option<String>,
    pub target_color: Option<String>,
    pub angles: Vec<Angle>,
    pub preferred_profile_id: Option<String>,
    pub place_first: bool,
    pub max_images: Option<usize>,
}

/// Image bytes plus the sha256 hex digest of exactly those bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBlob {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub content_hash: String,
}

impl ImageBlob {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        let content_hash = sha256_hex(&bytes);
        Self {
            bytes,
            mime_type: mime_type.into(),
            content_hash,
        }
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// First successful image in a batch, reused as a visual reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyAnchor {
    pub angle: Angle,
    pub url: String,
    pub image: ImageBlob,
}

impl ConsistencyAnchor {
    pub fn content_hash(&self) -> &str {
        &self.image.content_hash
    }
}

/// Output of one angle's cascade walk, before it has been persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedAngle {
    pub angle: Angle,
    pub image: ImageBlob,
    pub model_used: String,
    pub profile: StyleProfile,
    pub prompt: String,
    pub revised_prompt: Option<String>,
    pub anchor_url: Option<String>,
    pub anchor_hash: Option<String>,
}

/// A generated angle after the result sink stored it.
#[derive(Debug, Clone, PartialEq)]
pub struct AngleSuccess {
    pub generated: GeneratedAngle,
    pub url: String,
    pub record_id: String,
}

impl AngleSuccess {
    pub fn angle(&self) -> Angle {
        self.generated.angle
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AngleResult {
    Success(Box<AngleSuccess>),
    Failure(AngleFailure),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub successes: Vec<AngleSuccess>,
    pub failures: Vec<AngleFailure>,
    pub profile: StyleProfile,
}

impl BatchOutcome {
    pub fn from_results(results: Vec<AngleResult>, profile: StyleProfile) -> Self {
        let mut successes = Vec::new();
        let mut failures = Vec::new();
        for result in results {
            match result {
                AngleResult::Success(success) => successes.push(*success),
                AngleResult::Failure(failure) => failures.push(failure),
            }
        }
        Self {
            successes,
            failures,
            profile,
        }
    }

    pub fn partial_success(&self) -> bool {
        !self.successes.is_empty() && !self.failures.is_empty()
    }

    pub fn generated_urls(&self) -> Vec<String> {
        self.successes
            .iter()
            .map(|success| success.url.clone())
            .collect()
    }

    pub fn generated_angles(&self) -> Vec<Angle> {
        self.successes.iter().map(AngleSuccess::angle).collect()
    }
}
