use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client as HttpClient;
use reqwest::Url;
use tracing::info;

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
}

pub trait ObjectStore: Send + Sync {
    fn put(&self, key: &str, bytes: &[u8], mime_type: &str) -> Result<StoredObject>;
}

pub fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type.trim().to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}

/// Writes objects under `root`; URLs are `public_base_url/key` or `file://` paths.
pub struct LocalObjectStore {
    root: PathBuf,
    public_base_url: Option<String>,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: Option<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.map(|value| value.trim_end_matches('/').to_string()),
        }
    }

    fn object_url(&self, key: &str, path: &Path) -> Result<String> {
        if let Some(base) = &self.public_base_url {
            return Ok(format!("{base}/{key}"));
        }
        let absolute = path
            .canonicalize()
            .with_context(|| format!("failed to resolve {}", path.display()))?;
        Url::from_file_path(&absolute)
            .map(|url| url.to_string())
            .map_err(|()| anyhow::anyhow!("cannot express {} as a file URL", absolute.display()))
    }
}

impl ObjectStore for LocalObjectStore {
    fn put(&self, key: &str, bytes: &[u8], _mime_type: &str) -> Result<StoredObject> {
        validate_key(key)?;
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
        let url = self.object_url(key, &path)?;
        info!(key, bytes = bytes.len(), "stored object locally");
        Ok(StoredObject {
            key: key.to_string(),
            url,
        })
    }
}

/// PUTs objects to `endpoint/key`, e.g. an S3-compatible bucket or presigned proxy.
pub struct HttpObjectStore {
    http: HttpClient,
    endpoint: String,
    token: Option<String>,
    public_base_url: String,
}

impl HttpObjectStore {
    pub fn new(endpoint: &str, token: Option<String>, public_base_url: &str) -> Self {
        Self {
            http: HttpClient::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl ObjectStore for HttpObjectStore {
    fn put(&self, key: &str, bytes: &[u8], mime_type: &str) -> Result<StoredObject> {
        validate_key(key)?;
        let target = format!("{}/{key}", self.endpoint);
        let mut request = self
            .http
            .put(&target)
            .timeout(UPLOAD_TIMEOUT)
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .body(bytes.to_vec());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .with_context(|| format!("upload to {target} failed"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            bail!(
                "upload to {target} returned HTTP {status}: {}",
                body.chars().take(300).collect::<String>()
            );
        }
        info!(key, bytes = bytes.len(), "uploaded object");
        Ok(StoredObject {
            key: key.to_string(),
            url: format!("{}/{key}", self.public_base_url),
        })
    }
}

fn validate_key(key: &str) -> Result<()> {
    let path = Path::new(key);
    let safe = !key.is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
    if !safe {
        bail!("invalid object key '{key}'");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use anyhow::Result;

    use super::{extension_for_mime, HttpObjectStore, LocalObjectStore, ObjectStore};
    use crate::testing::{http_response, OneShotServer};

    #[test]
    fn local_store_writes_under_root_with_public_urls() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let store =
            LocalObjectStore::new(temp.path(), Some("https://cdn.test/media/".to_string()));
        let stored = store.put("products/p1/generated/front-abc.png", b"png", "image/png")?;
        assert_eq!(stored.url, "https://cdn.test/media/products/p1/generated/front-abc.png");
        assert_eq!(
            fs::read(temp.path().join("products/p1/generated/front-abc.png"))?,
            b"png"
        );
        Ok(())
    }

    #[test]
    fn local_store_falls_back_to_file_urls() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let store = LocalObjectStore::new(temp.path(), None);
        let stored = store.put("crops/abc.png", b"x", "image/png")?;
        assert!(stored.url.starts_with("file://"));
        assert!(stored.url.ends_with("/crops/abc.png"));
        Ok(())
    }

    #[test]
    fn rejects_escaping_keys() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let store = LocalObjectStore::new(temp.path(), None);
        assert!(store.put("../outside.png", b"x", "image/png").is_err());
        assert!(store.put("/abs.png", b"x", "image/png").is_err());
        assert!(store.put("", b"x", "image/png").is_err());
        Ok(())
    }

    #[test]
    fn extensions_follow_mime() {
        assert_eq!(extension_for_mime("image/jpeg"), "jpg");
        assert_eq!(extension_for_mime("IMAGE/WEBP"), "webp");
        assert_eq!(extension_for_mime("image/png"), "png");
        assert_eq!(extension_for_mime("application/octet-stream"), "png");
    }

    #[test]
    fn http_store_puts_bytes_with_bearer_token() -> Result<()> {
        let server =
            OneShotServer::respond(http_response("200 OK", &[("Content-Length", "0")], b""));
        let endpoint = format!("{}/bucket/", server.base_url);
        let store = HttpObjectStore::new(
            &endpoint,
            Some("secret".to_string()),
            "https://cdn.test/media/",
        );

        let stored = store.put("crops/abc.png", b"png-bytes", "image/png")?;
        assert_eq!(stored.key, "crops/abc.png");
        assert_eq!(stored.url, "https://cdn.test/media/crops/abc.png");

        let request = server.request();
        assert!(request.starts_with("PUT /bucket/crops/abc.png HTTP/1.1"));
        let lowered = request.to_ascii_lowercase();
        assert!(lowered.contains("authorization: bearer secret"));
        assert!(lowered.contains("content-type: image/png"));
        assert!(request.ends_with("png-bytes"));
        Ok(())
    }

    #[test]
    fn http_store_reports_non_success_status() {
        let body = b"access denied";
        let server = OneShotServer::respond(http_response(
            "403 Forbidden",
            &[("Content-Length", "13")],
            body,
        ));
        let store = HttpObjectStore::new(&server.base_url, None, "https://cdn.test");

        let err = store.put("crops/abc.png", b"x", "image/png").err();
        let message = err.map(|err| format!("{err:#}")).unwrap_or_default();
        assert!(message.contains("403"), "{message}");
        assert!(message.contains("access denied"), "{message}");
        let request = server.request();
        assert!(!request.to_ascii_lowercase().contains("authorization:"));
    }
}
