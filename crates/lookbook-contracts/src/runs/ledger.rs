use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::angles::Angle;

/// One successful angle, as persisted. Never rewritten once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub record_id: String,
    pub product_id: String,
    pub angle: Angle,
    pub image_url: String,
    pub object_key: String,
    pub content_hash: String,
    pub mime_type: String,
    pub source_hashes: Vec<String>,
    #[serde(default)]
    pub reference_hashes: Vec<String>,
    pub anchor_url: Option<String>,
    pub profile_id: String,
    pub model_used: String,
    pub prompt: String,
    pub revised_prompt: Option<String>,
    pub requested_by: Option<String>,
    pub created_at: String,
}

impl GenerationRecord {
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    pub fn now() -> String {
        Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
    }
}

/// Append-only writer for `generations.jsonl`, one compact record per line.
#[derive(Debug, Clone)]
pub struct LedgerWriter {
    inner: Arc<LedgerWriterInner>,
}

#[derive(Debug)]
struct LedgerWriterInner {
    path: PathBuf,
    lock: Mutex<()>,
}

impl LedgerWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(LedgerWriterInner {
                path: path.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn append(&self, record: &GenerationRecord) -> anyhow::Result<()> {
        if let Some(parent) = self.inner.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(record)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("ledger writer lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)
            .with_context(|| format!("failed to open {}", self.inner.path.display()))?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }

    /// Records for one product in append order; unparseable lines are skipped.
    pub fn records_for(&self, product_id: &str) -> anyhow::Result<Vec<GenerationRecord>> {
        if !self.inner.path.exists() {
            return Ok(Vec::new());
        }
        let file = std::fs::File::open(&self.inner.path)
            .with_context(|| format!("failed to open {}", self.inner.path.display()))?;
        let mut out = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            let Ok(record) = serde_json::from_str::<GenerationRecord>(&line) else {
                continue;
            };
            if record.product_id == product_id {
                out.push(record);
            }
        }
        Ok(out)
    }
}
