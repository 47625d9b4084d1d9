use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use crate::error::{Result, TrackerError};
use crate::types::Trajectory;

/// Storage collaborator for computed trajectories.
///
/// `replace` drops whatever was stored for the session before and stores the
/// new trajectory; callers never observe a half-written result.
pub trait TrajectorySink {
    fn replace(&mut self, trajectory: &Trajectory) -> Result<()>;
}

/// Trajectory export (JSON-serializable)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrajectoryExport {
    pub session_id: String,
    pub generated_at: String,
    pub points: Vec<crate::types::TrajectoryPoint>,
}

impl TrajectoryExport {
    pub fn new(trajectory: &Trajectory) -> Self {
        Self {
            session_id: trajectory.session_id.clone(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            points: trajectory.points.clone(),
        }
    }

    pub fn into_trajectory(self) -> Trajectory {
        Trajectory {
            session_id: self.session_id,
            points: self.points,
        }
    }
}

/// One `<session_id>.trajectory.json` per session.
pub struct JsonDirectorySink {
    dir: PathBuf,
}

impl JsonDirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, session_id: &str) -> Result<PathBuf> {
        if session_id.is_empty()
            || session_id.contains(|c: char| c == '/' || c == '\\')
            || session_id == "."
            || session_id == ".."
        {
            return Err(TrackerError::Storage(format!(
                "session id {session_id:?} cannot be used as a file name"
            )));
        }
        Ok(self.dir.join(format!("{session_id}.trajectory.json")))
    }

    /// Read back a stored trajectory.
    pub fn load(&self, session_id: &str) -> Result<Trajectory> {
        let path = self.path_for(session_id)?;
        if !path.exists() {
            return Err(TrackerError::SessionNotFound(session_id.to_string()));
        }
        let export: TrajectoryExport = serde_json::from_slice(&fs::read(&path)?)?;
        Ok(export.into_trajectory())
    }
}

impl TrajectorySink for JsonDirectorySink {
    fn replace(&mut self, trajectory: &Trajectory) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&trajectory.session_id)?;
        let tmp = path.with_extension("json.tmp");

        let bytes = serde_json::to_vec_pretty(&TrajectoryExport::new(trajectory))?;
        fs::write(&tmp, bytes)?;
        // rename replaces the previous file in one step
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(TrackerError::Storage(format!(
                "failed to replace {}: {e}",
                path.display()
            )));
        }
        log::info!(
            "[PIPELINE] stored {} points for session {} at {}",
            trajectory.len(),
            trajectory.session_id,
            path.display()
        );
        Ok(())
    }
}

/// Keeps the latest trajectory per session in memory.
#[derive(Default)]
pub struct MemorySink {
    trajectories: BTreeMap<String, Trajectory>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session_id: &str) -> Option<&Trajectory> {
        self.trajectories.get(session_id)
    }

    pub fn len(&self) -> usize {
        self.trajectories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trajectories.is_empty()
    }
}

impl TrajectorySink for MemorySink {
    fn replace(&mut self, trajectory: &Trajectory) -> Result<()> {
        self.trajectories
            .insert(trajectory.session_id.clone(), trajectory.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TrajectoryPoint;

    fn trajectory(id: &str, points: usize) -> Trajectory {
        Trajectory {
            session_id: id.to_string(),
            points: (0..points)
                .map(|i| TrajectoryPoint {
                    timestamp: i as i64 * 100,
                    position: [i as f64, 0.0, 0.0],
                    velocity: [1.0, 0.0, 0.0],
                    magnetic_magnitude: None,
                })
                .collect(),
        }
    }

    #[test]
    fn test_directory_sink_replaces() {
        let dir = std::env::temp_dir().join(format!("path_tracker_sink_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        let mut sink = JsonDirectorySink::new(&dir);

        sink.replace(&trajectory("loop", 5)).unwrap();
        sink.replace(&trajectory("loop", 3)).unwrap();

        let stored = sink.load("loop").unwrap();
        assert_eq!(stored, trajectory("loop", 3));
        assert!(!dir.join("loop.trajectory.json.tmp").exists());
        assert!(matches!(
            sink.load("other"),
            Err(TrackerError::SessionNotFound(_))
        ));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_unsafe_session_id_rejected() {
        let sink = JsonDirectorySink::new("/tmp");
        assert!(matches!(
            sink.path_for("../etc"),
            Err(TrackerError::Storage(_))
        ));
    }

    #[test]
    fn test_memory_sink_keeps_latest() {
        let mut sink = MemorySink::new();
        sink.replace(&trajectory("a", 4)).unwrap();
        sink.replace(&trajectory("a", 2)).unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.get("a").map(Trajectory::len), Some(2));
    }
}
