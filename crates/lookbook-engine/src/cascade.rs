use lookbook_contracts::error::{ModelAttempt, RetryCause, StudioError, UpstreamFailure};
use lookbook_contracts::models::CandidateList;
use tracing::{debug, warn};

use crate::providers::{ImageModel, InlineImage, PromptPayload};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeSuccess {
    pub image: InlineImage,
    pub model_used: String,
    pub revised_prompt: Option<String>,
    /// Retryable failures absorbed before the winning candidate.
    pub attempts: Vec<ModelAttempt>,
}

/// `None` means the failure is fatal and no further candidate should be tried.
pub fn classify(failure: &UpstreamFailure) -> Option<RetryCause> {
    let status = failure.status;
    let code = failure.code.as_deref().unwrap_or_default().to_ascii_uppercase();
    let message = failure.message.to_ascii_lowercase();

    if status == Some(429)
        || code == "RESOURCE_EXHAUSTED"
        || message.contains("quota")
        || message.contains("resource exhausted")
        || message.contains("resource_exhausted")
        || message.contains("rate limit")
    {
        return Some(RetryCause::Quota);
    }
    if code == "NO_IMAGE_DATA" || message.contains("no image data") {
        return Some(RetryCause::NoImageData);
    }
    if status == Some(404)
        || code == "NOT_FOUND"
        || (message.contains("model") && message.contains("not found"))
        || message.contains("is not supported for generatecontent")
        || message.contains("unsupported model")
        || message.contains("model is not available")
    {
        return Some(RetryCause::ModelUnavailable);
    }
    if status == Some(400) && mentions_unsupported_modality(&message) {
        return Some(RetryCause::UnsupportedModality);
    }
    match status {
        Some(408 | 409 | 425) | Some(500..=599) => Some(RetryCause::Transient),
        _ => None,
    }
}

fn mentions_unsupported_modality(message: &str) -> bool {
    let names_modality = message.contains("modalit") || message.contains("image output");
    let says_unsupported = message.contains("not supported")
        || message.contains("does not support")
        || message.contains("unsupported")
        || message.contains("only supports text");
    names_modality && says_unsupported
}

/// Walks `candidates` in order until one produces an image.
pub fn run_cascade(
    model: &dyn ImageModel,
    candidates: &CandidateList,
    payload: &PromptPayload,
) -> Result<CascadeSuccess, StudioError> {
    if candidates.is_empty() {
        return Err(StudioError::configuration(format!(
            "no image model candidates configured for provider '{}'",
            model.provider()
        )));
    }

    let mut attempts = Vec::new();
    let mut last_cause = None;
    for candidate in candidates.iter() {
        debug!(model = candidate, attempt = attempts.len() + 1, "dispatching generation");
        let failure = match model.generate(candidate, payload) {
            Ok(output) => match output.into_first_image() {
                (Some(image), revised_prompt) => {
                    return Ok(CascadeSuccess {
                        image,
                        model_used: candidate.to_string(),
                        revised_prompt,
                        attempts,
                    });
                }
                (None, _) => UpstreamFailure::no_image_data(candidate),
            },
            Err(failure) => failure,
        };

        let Some(cause) = classify(&failure) else {
            warn!(
                model = candidate,
                status = failure.status,
                code = failure.code.as_deref(),
                "fatal upstream failure; stopping cascade"
            );
            return Err(StudioError::Upstream {
                failure,
                attempts,
                last_cause,
            });
        };
        warn!(
            model = candidate,
            status = failure.status,
            cause = cause.as_str(),
            "retryable upstream failure; trying next candidate"
        );
        attempts.push(ModelAttempt {
            model: candidate.to_string(),
            message: failure.to_string(),
        });
        last_cause = Some(cause);
    }

    Err(StudioError::CandidatesExhausted {
        attempts,
        last_cause,
    })
}
