use std::fs;
use std::io::Read;
use std::time::Duration;

use lookbook_contracts::error::{FetchErrorKind, StudioError};
use lookbook_contracts::generation::ImageBlob;
use reqwest::blocking::Client as HttpClient;
use reqwest::{StatusCode, Url};
use tracing::debug;

use crate::config::EngineConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

impl FetchedImage {
    /// Sniffed format wins over the transport's content type.
    pub fn mime_type(&self) -> String {
        if let Ok(format) = image::guess_format(&self.bytes) {
            return format.to_mime_type().to_string();
        }
        self.content_type
            .as_deref()
            .and_then(|value| value.split(';').next())
            .map(str::trim)
            .filter(|value| value.starts_with("image/"))
            .unwrap_or("application/octet-stream")
            .to_string()
    }

    pub fn into_blob(self) -> ImageBlob {
        let mime_type = self.mime_type();
        ImageBlob::new(self.bytes, mime_type)
    }
}

pub trait ImageFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<FetchedImage, StudioError>;
}

pub struct HttpImageFetcher {
    http: HttpClient,
    timeout: Duration,
    max_bytes: u64,
}

impl HttpImageFetcher {
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_limits(config.fetch_timeout, config.max_source_bytes)
    }

    pub fn with_limits(timeout: Duration, max_bytes: u64) -> Self {
        Self {
            http: HttpClient::new(),
            timeout,
            max_bytes,
        }
    }

    fn fetch_http(&self, url: &Url) -> Result<FetchedImage, StudioError> {
        let mut response = self
            .http
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .map_err(|err| request_failure(url, &err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_failure(url, status));
        }
        if let Some(length) = response.content_length() {
            if length > self.max_bytes {
                return Err(self.too_large(url));
            }
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let mut bytes = Vec::new();
        (&mut response)
            .take(self.max_bytes + 1)
            .read_to_end(&mut bytes)
            .map_err(|err| {
                let kind = if is_timeout(&err) {
                    FetchErrorKind::TimedOut
                } else {
                    FetchErrorKind::Unreadable
                };
                StudioError::fetch(kind, format!("failed reading {url}: {err}"))
            })?;
        self.finish(url, bytes, content_type)
    }

    fn fetch_file(&self, url: &Url) -> Result<FetchedImage, StudioError> {
        let path = url.to_file_path().map_err(|()| {
            StudioError::fetch(FetchErrorKind::Invalid, format!("{url} is not a local file path"))
        })?;
        let metadata = fs::metadata(&path).map_err(|err| {
            StudioError::fetch(FetchErrorKind::NotFound, format!("{url} not found: {err}"))
        })?;
        if metadata.len() > self.max_bytes {
            return Err(self.too_large(url));
        }
        let bytes = fs::read(&path).map_err(|err| {
            StudioError::fetch(FetchErrorKind::Unreadable, format!("failed reading {url}: {err}"))
        })?;
        self.finish(url, bytes, None)
    }

    fn finish(
        &self,
        url: &Url,
        bytes: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<FetchedImage, StudioError> {
        if bytes.len() as u64 > self.max_bytes {
            return Err(self.too_large(url));
        }
        if bytes.is_empty() {
            return Err(StudioError::fetch(
                FetchErrorKind::Unreadable,
                format!("{url} returned an empty body"),
            ));
        }
        debug!(url = %url, bytes = bytes.len(), "fetched source image");
        Ok(FetchedImage {
            bytes,
            content_type,
        })
    }

    fn too_large(&self, url: &Url) -> StudioError {
        StudioError::fetch(
            FetchErrorKind::TooLarge,
            format!("{url} exceeds the {} byte limit", self.max_bytes),
        )
    }
}

impl ImageFetcher for HttpImageFetcher {
    fn fetch(&self, raw: &str) -> Result<FetchedImage, StudioError> {
        let url = Url::parse(raw.trim()).map_err(|err| {
            StudioError::fetch(FetchErrorKind::Invalid, format!("invalid image URL '{raw}': {err}"))
        })?;
        match url.scheme() {
            "http" | "https" => self.fetch_http(&url),
            "file" => self.fetch_file(&url),
            other => Err(StudioError::fetch(
                FetchErrorKind::Invalid,
                format!("unsupported image URL scheme '{other}'"),
            )),
        }
    }
}

fn status_failure(url: &Url, status: StatusCode) -> StudioError {
    let kind = match status.as_u16() {
        404 | 410 => FetchErrorKind::NotFound,
        400..=499 => FetchErrorKind::Invalid,
        _ => FetchErrorKind::Unreadable,
    };
    StudioError::fetch(kind, format!("fetching {url} returned HTTP {status}"))
}

fn request_failure(url: &Url, err: &reqwest::Error) -> StudioError {
    let kind = if err.is_timeout() {
        FetchErrorKind::TimedOut
    } else if err.is_connect() || err.is_builder() {
        FetchErrorKind::NotFound
    } else {
        FetchErrorKind::Unreadable
    };
    StudioError::fetch(kind, format!("failed to fetch {url}: {err}"))
}

fn is_timeout(err: &std::io::Error) -> bool {
    if err.kind() == std::io::ErrorKind::TimedOut {
        return true;
    }
    err.get_ref()
        .and_then(|inner| inner.downcast_ref::<reqwest::Error>())
        .is_some_and(reqwest::Error::is_timeout)
}
