//! Session snapshot schema.

use serde::{Deserialize, Serialize};

use crate::canonical::Validate;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A point-in-time capture of executor progress, used for resume.
pub struct SessionSnapshot {
    /// Random id of the executor session that wrote the snapshot.
    pub session_id: String,
    /// ISO-8601 UTC capture time.
    pub timestamp: String,
    /// Phase the session was driving.
    pub phase_id: String,
    /// Wave the session was on.
    pub wave_id: u32,
    /// Tasks verified complete so far.
    pub completed_task_ids: Vec<String>,
    /// Human-readable next steps.
    pub next_steps: Vec<String>,
    /// Known blockers, empty when none.
    pub blockers: Vec<String>,
}

impl Validate for SessionSnapshot {
    fn validate(&self) -> Result<(), String> {
        if self.timestamp.trim().is_empty() {
            return Err("session snapshot is missing its timestamp".to_string());
        }
        if self.phase_id.trim().is_empty() {
            return Err("session snapshot is missing its phase_id".to_string());
        }
        Ok(())
    }
}
