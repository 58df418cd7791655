use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;
use w3bench_race::{Backend, ContentRecord};
use w3bench_verify::Sha256Hash;

use crate::error::{Result, StoreError};

/// One record as it appears in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    pub locator: String,
    pub expected_digest_hex: Sha256Hash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_duration_seconds: Option<f64>,
}

impl StoredRecord {
    fn from_record(record: &ContentRecord) -> Self {
        Self {
            locator: record.locator.clone(),
            expected_digest_hex: record.expected_digest,
            upload_timestamp: record.uploaded_at,
            upload_duration_seconds: record.upload_duration.map(|d| d.as_secs_f64()),
        }
    }

    fn to_record(&self, backend: Backend, size_kb: u32) -> ContentRecord {
        ContentRecord {
            backend,
            size_kb,
            locator: self.locator.clone(),
            expected_digest: self.expected_digest_hex,
            uploaded_at: self.upload_timestamp,
            upload_duration: self.upload_duration_seconds.and_then(|s| Duration::try_from_secs_f64(s).ok()),
        }
    }
}

/// `{ "<backend>": { "<sizeKB>": [record, ...] } }`
type StoreFile = BTreeMap<String, BTreeMap<String, Vec<StoredRecord>>>;

/// Published content, keyed by backend and size class, in publication order.
///
/// The file is read once when loaded. Records are only ever appended and
/// every [`save`](ReferenceStore::save) replaces the file atomically.
#[derive(Debug, Clone)]
pub struct ReferenceStore {
    path: PathBuf,
    entries: BTreeMap<Backend, BTreeMap<u32, Vec<StoredRecord>>>,
}

impl ReferenceStore {
    /// An empty store that will be saved to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Load the store at `path`. A missing file is an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = match std::fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no reference store yet");
                return Ok(Self::empty(path));
            }
            Err(source) => return Err(StoreError::Read { path, source }),
        };

        let file: StoreFile = serde_json::from_slice(&content).map_err(|source| StoreError::Malformed {
            path: path.clone(),
            source,
        })?;

        let mut entries = BTreeMap::new();
        for (backend, sizes) in file {
            let backend: Backend = backend.parse().map_err(|_| StoreError::UnknownBackend(backend.clone()))?;
            let by_size: &mut BTreeMap<u32, Vec<StoredRecord>> = entries.entry(backend).or_default();
            for (size, records) in sizes {
                let size_kb = size.trim().parse().map_err(|_| StoreError::InvalidSize(size.clone()))?;
                by_size.entry(size_kb).or_default().extend(records);
            }
        }

        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path { &self.path }

    pub fn len(&self) -> usize { self.entries.values().flat_map(|s| s.values()).map(Vec::len).sum() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Every record of `backend`, grouped by size class.
    pub fn records_for(&self, backend: Backend) -> Vec<ContentRecord> {
        self.entries
            .get(&backend)
            .into_iter()
            .flat_map(|sizes| sizes.iter())
            .flat_map(|(&size_kb, records)| records.iter().map(move |r| r.to_record(backend, size_kb)))
            .collect()
    }

    /// Every record in the store.
    pub fn records(&self) -> Vec<ContentRecord> {
        self.entries.keys().flat_map(|&backend| self.records_for(backend)).collect()
    }

    /// The most recently published record of each backend and size class.
    pub fn latest(&self) -> Vec<ContentRecord> {
        self.entries
            .iter()
            .flat_map(|(&backend, sizes)| {
                sizes
                    .iter()
                    .filter_map(move |(&size_kb, records)| records.last().map(|r| r.to_record(backend, size_kb)))
            })
            .collect()
    }

    pub fn append(&mut self, record: &ContentRecord) {
        self.entries
            .entry(record.backend)
            .or_default()
            .entry(record.size_kb)
            .or_default()
            .push(StoredRecord::from_record(record));
    }

    /// Write the whole store to its path through a temporary file in the
    /// same directory, so readers see either the old or the new content.
    pub fn save(&self) -> Result<()> {
        let file: StoreFile = self
            .entries
            .iter()
            .map(|(backend, sizes)| {
                let sizes = sizes.iter().map(|(size, records)| (size.to_string(), records.clone())).collect();
                (backend.key().to_string(), sizes)
            })
            .collect();
        let content = serde_json::to_vec_pretty(&file).map_err(|source| StoreError::Malformed {
            path: self.path.clone(),
            source,
        })?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
        tmp.write_all(&content).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;

        debug!(path = %self.path.display(), records = self.len(), "reference store saved");
        Ok(())
    }
}
