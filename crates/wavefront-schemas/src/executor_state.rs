//! Wave executor state schema.

use serde::{Deserialize, Serialize};

use crate::canonical::Validate;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Persistent executor progress (`wave_executor_state.json`).
pub struct ExecutorState {
    /// The wave the executor will run next.
    pub current_wave: u32,
    /// Waves that have verified and checkpointed, in completion order.
    pub completed_waves: Vec<u32>,
    /// Phase label the state belongs to.
    pub phase_id: String,
    /// ISO-8601 UTC timestamp of the last persist.
    pub timestamp: String,
}

impl ExecutorState {
    /// Fresh state for a phase: wave 1 up next, nothing completed.
    pub fn fresh(phase_id: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            current_wave: 1,
            completed_waves: Vec::new(),
            phase_id: phase_id.into(),
            timestamp: timestamp.into(),
        }
    }

    /// Return `true` when `wave_id` has already completed.
    pub fn is_completed(&self, wave_id: u32) -> bool {
        self.completed_waves.contains(&wave_id)
    }
}

impl Validate for ExecutorState {
    fn validate(&self) -> Result<(), String> {
        if self.current_wave == 0 {
            return Err("current_wave must be >= 1".to_string());
        }
        // completed_waves must be a prefix of [1, 2, .., current_wave - 1]:
        // waves are strictly serialized, so completion can never skip ahead.
        for (idx, wave) in self.completed_waves.iter().enumerate() {
            let expected = idx as u32 + 1;
            if *wave != expected {
                return Err(format!(
                    "completed_waves must be dense from 1; position {idx} holds wave {wave}"
                ));
            }
            if *wave >= self.current_wave {
                return Err(format!(
                    "completed wave {wave} is not earlier than current_wave {}",
                    self.current_wave
                ));
            }
        }
        Ok(())
    }
}
