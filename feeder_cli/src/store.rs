//! JSON-file command/telemetry store.
//!
//! Layout mirrors the shared record other clients use:
//!
//! ```json
//! {
//!   "dispenser": { "run": true, "amount": 50.0, "status": "feeding" },
//!   "bowl": { "weight": 12.5, "timestamp": 1700000000 },
//!   "detection": { "cat": { "detected": true, "confidence": 0.93, "timestamp": 1700000000 } }
//! }
//! ```
//!
//! Every read goes to disk. Writes patch individual keys of the raw
//! document, so sections and fields owned by other clients survive, and
//! land atomically (temp file + rename). There is no cross-process lock:
//! a concurrent writer can only lose an update inside one load/rename.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use feeder_traits::{BoxError, CommandStore, Detection, DetectionSource, FeedRequest};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io ({path}): {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("store json ({path}): {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DispenserDoc {
    pub run: bool,
    pub amount: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BowlDoc {
    pub weight: Option<f32>,
    pub timestamp: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionDoc {
    pub detected: bool,
    /// Absent means the detector does not report confidence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    pub timestamp: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreDoc {
    pub dispenser: DispenserDoc,
    pub bowl: BowlDoc,
    pub detection: BTreeMap<String, DetectionDoc>,
}

/// Write `bytes` to `path` via a sibling temp file and rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(tmp, path)
}

#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open the store, creating an empty document if the file is missing.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let store = Self {
            path: path.to_path_buf(),
            write_lock: Mutex::new(()),
        };
        if path.exists() {
            store.load()?;
        } else {
            tracing::info!(path = %path.display(), "creating command store");
            store.save(&StoreDoc::default())?;
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<StoreDoc, StoreError> {
        let text = fs::read_to_string(&self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        if text.trim().is_empty() {
            return Ok(StoreDoc::default());
        }
        serde_json::from_str(&text).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })
    }

    fn load_raw(&self) -> Result<Map<String, Value>, StoreError> {
        let text = fs::read_to_string(&self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        if text.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str(&text) {
            Ok(Value::Object(map)) => Ok(map),
            // A non-object root has no sections to keep.
            Ok(_) => Ok(Map::new()),
            Err(source) => Err(StoreError::Json {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn save<T: Serialize>(&self, doc: &T) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(doc).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;
        write_atomic(&self.path, &bytes).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }

    /// Set `fields` inside `section`, leaving every other key untouched.
    fn patch(&self, section: &str, fields: Value) -> Result<(), StoreError> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut root = self.load_raw()?;
        let slot = root
            .entry(section)
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        if let (Value::Object(target), Value::Object(fields)) = (slot, fields) {
            target.extend(fields);
        }
        self.save(&root)
    }
}

impl CommandStore for JsonFileStore {
    fn feed_request(&self) -> Result<FeedRequest, BoxError> {
        let d = self.load()?.dispenser;
        Ok(FeedRequest {
            run: d.run,
            amount_g: d.amount,
        })
    }

    fn set_status(&self, status: &str) -> Result<(), BoxError> {
        self.patch("dispenser", json!({ "status": status }))?;
        Ok(())
    }

    fn clear_run(&self) -> Result<(), BoxError> {
        self.patch("dispenser", json!({ "run": false }))?;
        Ok(())
    }

    fn publish_weight(&self, grams: f32, unix_s: u64) -> Result<(), BoxError> {
        self.patch("bowl", json!({ "weight": grams, "timestamp": unix_s }))?;
        Ok(())
    }
}

impl DetectionSource for JsonFileStore {
    fn detection(&self, species: &str) -> Result<Detection, BoxError> {
        let doc = self.load()?;
        Ok(doc
            .detection
            .get(species)
            .map(|d| Detection {
                detected: d.detected,
                confidence: d.confidence.unwrap_or(1.0),
                last_seen_s: d.timestamp,
            })
            .unwrap_or_default())
    }
}
