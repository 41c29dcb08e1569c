use std::thread;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use lookbook_contracts::error::UpstreamFailure;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{ImageModel, InlineImage, ModelOutput, PromptPayload, ResponsePart};
use crate::config::EngineConfig;

const BLOCKING_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "IMAGE_SAFETY",
    "PROHIBITED_CONTENT",
    "BLOCKLIST",
    "SPII",
    "RECITATION",
];

pub struct GeminiClient {
    api_base: String,
    api_key: Option<String>,
    http: HttpClient,
    timeout: Duration,
    transport_retries: usize,
    retry_backoff: Duration,
}

impl GeminiClient {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            api_base: config.gemini_api_base.clone(),
            api_key: config.gemini_api_key.clone(),
            http: HttpClient::new(),
            timeout: config.model_timeout,
            transport_retries: config.transport_retries,
            retry_backoff: config.retry_backoff,
        }
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn post_with_transport_retries(
        &self,
        endpoint: &str,
        api_key: &str,
        body: &Value,
    ) -> Result<HttpResponse, reqwest::Error> {
        let mut attempt = 0;
        loop {
            let response = self
                .http
                .post(endpoint)
                .query(&[("key", api_key)])
                .timeout(self.timeout)
                .json(body)
                .send();

            match response {
                Ok(ok) => return Ok(ok),
                Err(err) => {
                    let retryable = err.is_timeout() || err.is_connect() || err.is_request();
                    if !retryable || attempt >= self.transport_retries {
                        return Err(err);
                    }
                    attempt += 1;
                    warn!(
                        endpoint = %endpoint,
                        attempt,
                        max = self.transport_retries,
                        "gemini transport retry after transient request failure"
                    );
                    thread::sleep(self.retry_backoff.mul_f64(attempt as f64));
                }
            }
        }
    }
}

impl ImageModel for GeminiClient {
    fn provider(&self) -> &str {
        "gemini"
    }

    fn generate(
        &self,
        model: &str,
        payload: &PromptPayload,
    ) -> Result<ModelOutput, UpstreamFailure> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(UpstreamFailure::new(
                Some(401),
                Some("UNAUTHENTICATED"),
                "GEMINI_API_KEY or GOOGLE_API_KEY not set",
            ));
        };
        let endpoint = self.endpoint_for_model(model);
        let body = build_request_body(payload);
        debug!(
            model,
            images = payload.images.len(),
            prompt_chars = payload.text.chars().count(),
            "gemini generateContent"
        );

        let response = self
            .post_with_transport_retries(&endpoint, api_key, &body)
            .map_err(|err| transport_failure(&err))?;
        let status = response.status();
        let text = response.text().map_err(|err| transport_failure(&err))?;
        if !status.is_success() {
            return Err(parse_error_body(status.as_u16(), &text));
        }
        let parsed: Value = serde_json::from_str(&text).map_err(|err| {
            UpstreamFailure::new(
                Some(502),
                Some("INVALID_RESPONSE"),
                format!("Gemini returned invalid JSON payload: {err}"),
            )
        })?;
        Ok(ModelOutput {
            parts: parse_response_parts(&parsed)?,
        })
    }
}

fn build_request_body(payload: &PromptPayload) -> Value {
    let mut parts: Vec<Value> = payload
        .images
        .iter()
        .map(|image| {
            json!({
                "inlineData": {
                    "mimeType": image.mime_type,
                    "data": BASE64.encode(&image.bytes),
                }
            })
        })
        .collect();
    parts.push(json!({ "text": payload.text }));
    json!({
        "contents": [{
            "role": "user",
            "parts": parts,
        }],
        "generationConfig": {
            "candidateCount": 1,
            "responseModalities": ["TEXT", "IMAGE"],
        },
    })
}

/// Flattens every candidate's parts into normalized [`ResponsePart`]s.
///
/// A response with no image that was stopped by a safety filter is a
/// fatal failure rather than an empty result.
pub fn parse_response_parts(response: &Value) -> Result<Vec<ResponsePart>, UpstreamFailure> {
    let candidates = response
        .get("candidates")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let mut out = Vec::new();
    let mut blocked_reason: Option<String> = None;

    for candidate in &candidates {
        let parts = candidate
            .get("content")
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for part in &parts {
            if let Some(normalized) = normalize_part(part)? {
                out.push(normalized);
            }
        }
        if let Some(reason) = candidate
            .get("finishReason")
            .or_else(|| candidate.get("finish_reason"))
            .and_then(Value::as_str)
            .filter(|reason| BLOCKING_FINISH_REASONS.contains(reason))
        {
            blocked_reason = Some(reason.to_string());
        }
    }

    let has_image = out
        .iter()
        .any(|part| matches!(part, ResponsePart::Image(_)));
    if !has_image {
        if let Some(reason) = response
            .get("promptFeedback")
            .or_else(|| response.get("prompt_feedback"))
            .and_then(|feedback| {
                feedback
                    .get("blockReason")
                    .or_else(|| feedback.get("block_reason"))
            })
            .and_then(Value::as_str)
        {
            return Err(UpstreamFailure::new(
                None,
                Some("PROMPT_BLOCKED"),
                format!("Gemini blocked the prompt ({reason})"),
            ));
        }
        if let Some(reason) = blocked_reason {
            return Err(UpstreamFailure::new(
                None,
                Some("SAFETY_BLOCKED"),
                format!("Gemini stopped generation ({reason})"),
            ));
        }
    }
    Ok(out)
}

/// Accepts both `inlineData`/`mimeType` and `inline_data`/`mime_type` parts.
/// Thought parts and empty payloads are dropped.
pub fn normalize_part(part: &Value) -> Result<Option<ResponsePart>, UpstreamFailure> {
    if part.get("thought").and_then(Value::as_bool).unwrap_or(false) {
        return Ok(None);
    }
    let inline = part
        .get("inlineData")
        .or_else(|| part.get("inline_data"))
        .and_then(Value::as_object);
    if let Some(inline) = inline {
        let data = inline
            .get("data")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if data.is_empty() {
            return Ok(None);
        }
        let bytes = BASE64.decode(data.as_bytes()).map_err(|err| {
            UpstreamFailure::new(
                Some(502),
                Some("INVALID_RESPONSE"),
                format!("Gemini image base64 decode failed: {err}"),
            )
        })?;
        let mime_type = inline
            .get("mimeType")
            .or_else(|| inline.get("mime_type"))
            .and_then(Value::as_str)
            .unwrap_or("image/png")
            .to_string();
        return Ok(Some(ResponsePart::Image(InlineImage { bytes, mime_type })));
    }
    Ok(part
        .get("text")
        .and_then(Value::as_str)
        .map(|text| ResponsePart::Text(text.to_string())))
}

/// Reads Google's `{"error": {"message", "status"}}` envelope when present.
pub fn parse_error_body(status: u16, body: &str) -> UpstreamFailure {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let error = parsed.as_ref().and_then(|value| value.get("error"));
    let code = error
        .and_then(|error| error.get("status"))
        .and_then(Value::as_str);
    let message = error
        .and_then(|error| error.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| truncate_text(body.trim(), 512));
    let message = if message.is_empty() {
        format!("Gemini request failed ({status})")
    } else {
        message
    };
    UpstreamFailure::new(Some(status), code, message)
}

fn transport_failure(err: &reqwest::Error) -> UpstreamFailure {
    let (status, code, label) = if err.is_timeout() {
        (504, "DEADLINE_EXCEEDED", "timed out")
    } else if err.is_connect() {
        (503, "UNAVAILABLE", "could not connect")
    } else {
        (502, "TRANSPORT_ERROR", "failed")
    };
    UpstreamFailure::new(
        Some(status),
        Some(code),
        format!("Gemini request {label}: {err}"),
    )
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
