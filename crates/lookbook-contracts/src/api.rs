use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use url::Url;

use crate::angles::{normalize_angle_inputs, Angle};
use crate::crop::{clamp_long_edge, AspectToken, CropRect, ExtractRect};
use crate::error::{AngleFailure, StudioError};
use crate::gallery::MergeOptions;
use crate::generation::{BatchOutcome, GenerationRequest};
use crate::profiles::StyleProfile;

const MAX_SOURCE_IMAGES: usize = 4;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequestBody {
    #[serde(default)]
    pub source_image_url: Option<String>,
    #[serde(default)]
    pub source_image_urls: Vec<String>,
    #[serde(default)]
    pub color_reference_image_url: Option<String>,
    #[serde(default)]
    pub preferred_profile_id: Option<String>,
    #[serde(default)]
    pub custom_prompt: Option<String>,
    #[serde(default)]
    pub target_color: Option<String>,
    #[serde(default)]
    pub target_angle: Option<String>,
    #[serde(default, deserialize_with = "string_entries")]
    pub angles: Option<Vec<String>>,
    #[serde(default)]
    pub place_first: Option<bool>,
    #[serde(default)]
    pub max_images: Option<u32>,
}

impl GenerateRequestBody {
    pub fn into_request(self) -> Result<GenerationRequest, StudioError> {
        let mut sources: Vec<String> = Vec::new();
        let listed = self.source_image_url.into_iter().chain(self.source_image_urls);
        for raw in listed {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                continue;
            }
            let url = parse_image_url(trimmed, "sourceImageUrl")?;
            if !sources.contains(&url) {
                sources.push(url);
            }
        }
        if sources.is_empty() {
            return Err(StudioError::validation(
                "at least one source image URL is required",
            ));
        }
        sources.truncate(MAX_SOURCE_IMAGES);

        let color_reference_image_url = match non_blank(self.color_reference_image_url) {
            Some(raw) => Some(parse_image_url(&raw, "colorReferenceImageUrl")?),
            None => None,
        };

        Ok(GenerationRequest {
            source_image_urls: sources,
            color_reference_image_url,
            custom_prompt: non_blank(self.custom_prompt),
            target_color: non_blank(self.target_color),
            angles: normalize_angle_inputs(self.target_angle.as_deref(), self.angles.as_deref()),
            preferred_profile_id: non_blank(self.preferred_profile_id),
            place_first: self.place_first.unwrap_or(true),
            max_images: self
                .max_images
                .filter(|value| *value > 0)
                .map(|value| value as usize),
        })
    }
}

impl GenerationRequest {
    pub fn merge_options(&self) -> MergeOptions {
        MergeOptions {
            place_first: self.place_first,
            max_images: self.max_images,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponseBody {
    pub generated_image_url: String,
    pub generated_image_urls: Vec<String>,
    pub generated_angles: Vec<Angle>,
    pub failed_angles: Vec<AngleFailure>,
    pub profile: StyleProfile,
    pub model_used: String,
    pub images: Vec<String>,
    pub partial_success: bool,
}

impl GenerateResponseBody {
    /// `images` is the recomputed gallery for the product.
    pub fn from_outcome(outcome: &BatchOutcome, images: Vec<String>) -> Self {
        let urls = outcome.generated_urls();
        Self {
            generated_image_url: urls.first().cloned().unwrap_or_default(),
            generated_image_urls: urls,
            generated_angles: outcome.generated_angles(),
            failed_angles: outcome.failures.clone(),
            profile: outcome.profile.clone(),
            model_used: outcome
                .successes
                .first()
                .map(|success| success.generated.model_used.clone())
                .unwrap_or_default(),
            images,
            partial_success: outcome.partial_success(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropRequestBody {
    pub image_url: String,
    pub crop: CropRect,
    #[serde(default)]
    pub aspect: Option<String>,
    #[serde(default)]
    pub target_long_edge: Option<f64>,
}

/// Validated crop request.
#[derive(Debug, Clone, PartialEq)]
pub struct CropSpec {
    pub image_url: String,
    pub rect: CropRect,
    pub aspect: AspectToken,
    pub target_long_edge: u32,
}

impl CropRequestBody {
    pub fn into_spec(self) -> Result<CropSpec, StudioError> {
        let image_url = parse_image_url(self.image_url.trim(), "imageUrl")?;
        self.crop.validate()?;
        Ok(CropSpec {
            image_url,
            rect: self.crop,
            aspect: AspectToken::parse(self.aspect.as_deref())?,
            target_long_edge: clamp_long_edge(self.target_long_edge),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropResponseBody {
    pub cropped_image_url: String,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    pub crop: ExtractRect,
    pub aspect: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AngleOption {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitiesBody {
    pub profiles: Vec<StyleProfile>,
    pub angles: Vec<AngleOption>,
    pub default_angle: String,
    pub model_configured: bool,
    pub background_removal_configured: bool,
    pub models: Vec<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Keeps the string entries of a list; `null` and other values are dropped.
fn string_entries<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?;
    Ok(raw.map(|entries| {
        entries
            .into_iter()
            .filter_map(|entry| match entry {
                Value::String(token) => Some(token),
                _ => None,
            })
            .collect()
    }))
}

/// Accepts absolute `http`, `https` and `file` URLs.
pub fn parse_image_url(raw: &str, field: &str) -> Result<String, StudioError> {
    let parsed = Url::parse(raw)
        .map_err(|err| StudioError::validation(format!("{field} is not a valid URL: {err}")))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(parsed.to_string()),
        "file" => Ok(parsed.to_string()),
        scheme => Err(StudioError::validation(format!(
            "{field} has unsupported scheme '{scheme}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{CropRequestBody, GenerateRequestBody};
    use crate::angles::Angle;
    use crate::crop::{AspectToken, DEFAULT_LONG_EDGE};
    use crate::error::StudioError;

    #[test]
    fn generate_body_normalizes_sources_angles_and_defaults() -> anyhow::Result<()> {
        let body: GenerateRequestBody = serde_json::from_value(json!({
            "sourceImageUrl": "https://cdn.example.com/a.jpg",
            "sourceImageUrls": [
                "https://cdn.example.com/a.jpg",
                " ",
                "https://cdn.example.com/b.jpg"
            ],
            "angles": ["back", "nope", "front", "back"],
            "customPrompt": "   ",
            "maxImages": 0
        }))?;
        let request = body.into_request()?;
        assert_eq!(request.source_image_urls.len(), 2);
        assert_eq!(request.angles, vec![Angle::Back, Angle::Front]);
        assert!(request.custom_prompt.is_none());
        assert!(request.place_first);
        assert!(request.max_images.is_none());
        Ok(())
    }

    #[test]
    fn null_and_non_string_angle_entries_are_dropped() -> anyhow::Result<()> {
        let body: GenerateRequestBody = serde_json::from_value(json!({
            "sourceImageUrl": "https://cdn.example.com/a.jpg",
            "angles": ["side", null, 3, "front"]
        }))?;
        assert_eq!(body.into_request()?.angles, vec![Angle::Side, Angle::Front]);

        let only_null: GenerateRequestBody = serde_json::from_value(json!({
            "sourceImageUrl": "https://cdn.example.com/a.jpg",
            "targetAngle": "back",
            "angles": [null]
        }))?;
        assert_eq!(only_null.into_request()?.angles, vec![Angle::Back]);

        let absent: GenerateRequestBody = serde_json::from_value(json!({
            "sourceImageUrl": "https://cdn.example.com/a.jpg",
            "angles": null
        }))?;
        assert_eq!(absent.into_request()?.angles, vec![Angle::Front]);
        Ok(())
    }

    #[test]
    fn generate_body_without_sources_is_rejected() {
        let body = GenerateRequestBody {
            source_image_urls: vec!["".to_string()],
            ..GenerateRequestBody::default()
        };
        assert!(matches!(body.into_request(), Err(StudioError::Validation(_))));
    }

    #[test]
    fn malformed_urls_are_validation_errors() {
        for raw in ["not a url", "ftp://host/file.png", "https://"] {
            let body = GenerateRequestBody {
                source_image_url: Some(raw.to_string()),
                ..GenerateRequestBody::default()
            };
            let err = body.into_request().err();
            assert_eq!(err.map(|err| err.status()), Some(400), "{raw}");
        }
    }

    #[test]
    fn crop_body_resolves_defaults() -> anyhow::Result<()> {
        let body: CropRequestBody = serde_json::from_value(json!({
            "imageUrl": "https://cdn.example.com/a.png",
            "crop": {"x": -4, "y": 2.5, "width": 100, "height": 0}
        }))?;
        let spec = body.into_spec()?;
        assert_eq!(spec.aspect, AspectToken::Original);
        assert_eq!(spec.target_long_edge, DEFAULT_LONG_EDGE);
        Ok(())
    }

    #[test]
    fn crop_body_rejects_bad_aspect() -> anyhow::Result<()> {
        let body: CropRequestBody = serde_json::from_value(json!({
            "imageUrl": "https://cdn.example.com/a.png",
            "crop": {"x": 0, "y": 0, "width": 10, "height": 10},
            "aspect": "wide"
        }))?;
        assert!(matches!(body.into_spec(), Err(StudioError::Validation(_))));
        Ok(())
    }
}
