// loader.rs - Measurement stream loading
//
// Session files are `{"session_id": "...", "measurements": [...]}`, plain JSON or
// gzip-compressed (`.json.gz`). Measurements are stable-sorted by timestamp
// before the session invariants are checked.

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::error::{Result, TrackerError};
use crate::types::{Measurement, Session};

/// On-disk session record.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionFile {
    pub session_id: String,
    pub measurements: Vec<Measurement>,
}

/// Storage collaborator that supplies measurements keyed by session id.
pub trait MeasurementSource {
    fn session_ids(&self) -> Result<Vec<String>>;
    fn load_session(&self, id: &str) -> Result<Session>;
}

/// Sort by timestamp (stable, ties keep arrival order) and validate.
pub fn build_session(id: impl Into<String>, mut measurements: Vec<Measurement>) -> Result<Session> {
    let id = id.into();
    let out_of_order = measurements
        .windows(2)
        .filter(|pair| pair[1].timestamp < pair[0].timestamp)
        .count();
    if out_of_order > 0 {
        log::warn!(
            "[LOADER] session {}: {} measurements out of order, sorting",
            id,
            out_of_order
        );
        measurements.sort_by_key(|m| m.timestamp);
    }
    Session::new(id, measurements)
}

fn read_session_file(path: &Path) -> Result<SessionFile> {
    let file = File::open(path)?;
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        let reader = BufReader::new(GzDecoder::new(file));
        Ok(serde_json::from_reader(reader)?)
    } else {
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

/// Load one session file (`.json` or `.json.gz`).
pub fn load_session_file(path: impl AsRef<Path>) -> Result<Session> {
    let path = path.as_ref();
    let record = read_session_file(path)?;
    log::debug!(
        "[LOADER] {}: {} measurements for session {}",
        path.display(),
        record.measurements.len(),
        record.session_id
    );
    build_session(record.session_id, record.measurements)
}

/// Strip `.json` / `.json.gz` from a session file name.
fn session_id_from_path(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    name.strip_suffix(".json.gz")
        .or_else(|| name.strip_suffix(".json"))
        .filter(|stem| !stem.is_empty() && !stem.ends_with(".trajectory"))
        .map(str::to_string)
}

/// Directory with one `<session_id>.json[.gz]` file per session.
pub struct JsonDirectorySource {
    dir: PathBuf,
}

impl JsonDirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn files(&self) -> Result<BTreeMap<String, PathBuf>> {
        let mut files = BTreeMap::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            if let Some(id) = session_id_from_path(&path) {
                files.insert(id, path);
            }
        }
        Ok(files)
    }
}

impl MeasurementSource for JsonDirectorySource {
    fn session_ids(&self) -> Result<Vec<String>> {
        Ok(self.files()?.into_keys().collect())
    }

    fn load_session(&self, id: &str) -> Result<Session> {
        let files = self.files()?;
        let path = files
            .get(id)
            .ok_or_else(|| TrackerError::SessionNotFound(id.to_string()))?;
        let record = read_session_file(path)?;
        if record.session_id != id {
            log::warn!(
                "[LOADER] {} declares session {}, using file name {}",
                path.display(),
                record.session_id,
                id
            );
        }
        build_session(id, record.measurements)
    }
}

/// In-memory source, for embedding and tests.
#[derive(Default)]
pub struct MemorySource {
    sessions: BTreeMap<String, Vec<Measurement>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, measurements: Vec<Measurement>) {
        self.sessions.insert(id.into(), measurements);
    }
}

impl MeasurementSource for MemorySource {
    fn session_ids(&self) -> Result<Vec<String>> {
        Ok(self.sessions.keys().cloned().collect())
    }

    fn load_session(&self, id: &str) -> Result<Session> {
        let measurements = self
            .sessions
            .get(id)
            .ok_or_else(|| TrackerError::SessionNotFound(id.to_string()))?;
        build_session(id, measurements.clone())
    }
}
