use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde_json::{Map, Value};

use crate::gallery::GalleryState;

/// JSON document of product galleries keyed by product id.
///
/// Every read goes back to disk, and a write only replaces the one product
/// key, so separate processes touching different products do not clobber
/// each other. Two writers on the same product: last write wins.
#[derive(Debug, Clone)]
pub struct GalleryStore {
    path: PathBuf,
}

impl GalleryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// A missing document or product is an empty gallery; an unreadable one is an error.
    pub fn get(&self, product_id: &str) -> anyhow::Result<GalleryState> {
        let Some(value) = read_json_object(&self.path)?.remove(product_id) else {
            return Ok(GalleryState::default());
        };
        serde_json::from_value(value).with_context(|| {
            format!(
                "gallery for '{product_id}' in {} is malformed",
                self.path.display()
            )
        })
    }

    pub fn set(&self, product_id: &str, state: &GalleryState) -> anyhow::Result<()> {
        let mut on_disk = read_json_object(&self.path)?;
        let snapshot = serde_json::to_value(state)?;
        if on_disk.get(product_id) == Some(&snapshot) {
            return Ok(());
        }
        on_disk.insert(product_id.to_string(), snapshot);
        write_json_object(&self.path, &on_disk)
    }
}

fn read_json_object(path: &Path) -> anyhow::Result<Map<String, Value>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    let parsed: Value = serde_json::from_str(&raw)
        .with_context(|| format!("gallery document {} is not valid JSON", path.display()))?;
    match parsed {
        Value::Object(map) => Ok(map),
        _ => bail!("gallery document {} is not a JSON object", path.display()),
    }
}

fn write_json_object(path: &Path, payload: &Map<String, Value>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(
        &tmp,
        serde_json::to_string_pretty(&Value::Object(payload.clone()))?,
    )?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
