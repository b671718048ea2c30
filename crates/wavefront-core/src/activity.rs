//! The activity stream.
//!
//! `activity_stream.md` is an append-only markdown log of what the system
//! did. Writes are best-effort: a failed append logs a warning and never
//! blocks the caller. Rotation is handled by the durable store.

use crate::store::DurableStore;
use crate::time::iso8601;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// What happened.
pub enum ActivityKind {
    /// An execution plan was written.
    Orchestrated,
    /// A wave began executing.
    WaveStarted,
    /// A task marker flipped to consumed.
    TaskConsumed,
    /// A task was verified complete.
    TaskCompleted,
    /// A wave passed verification.
    WaveVerified,
    /// A checkpoint commit landed.
    CheckpointCommitted,
    /// A micro-checkpoint commit landed.
    MicroCheckpoint,
    /// The activity log rolled over to a fresh file.
    Rotation,
    /// State was restored from a backup.
    Recovered,
    /// The executor shut down gracefully.
    Shutdown,
}

impl ActivityKind {
    /// Stable label used in the log.
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityKind::Orchestrated => "orchestrated",
            ActivityKind::WaveStarted => "wave_started",
            ActivityKind::TaskConsumed => "task_consumed",
            ActivityKind::TaskCompleted => "task_completed",
            ActivityKind::WaveVerified => "wave_verified",
            ActivityKind::CheckpointCommitted => "checkpoint_committed",
            ActivityKind::MicroCheckpoint => "micro_checkpoint",
            ActivityKind::Rotation => "rotation",
            ActivityKind::Recovered => "recovered",
            ActivityKind::Shutdown => "shutdown",
        }
    }
}

/// Appender for the activity stream.
pub struct ActivityLog<'a> {
    store: &'a DurableStore,
}

impl<'a> ActivityLog<'a> {
    /// Create an appender over `store`.
    pub fn new(store: &'a DurableStore) -> Self {
        Self { store }
    }

    /// Append one event. Best-effort: failures are logged, not returned.
    ///
    /// When the append tips the log over its rotation threshold, a
    /// `rotation` event naming the archive is written to the fresh file.
    pub fn record(&self, kind: ActivityKind, payload: &str) {
        let path = wavefront_common::paths::activity_stream_path(self.store.root());
        match self.store.append_with_rotation(&path, &self.line(kind, payload)) {
            Ok(None) => {}
            Ok(Some(archive)) => {
                let line = self.line(
                    ActivityKind::Rotation,
                    &format!("earlier entries archived to {archive}"),
                );
                // The fresh file is far below the threshold, so this append
                // cannot rotate again.
                if let Err(e) = self.store.append_with_rotation(&path, &line) {
                    tracing::warn!("activity log write failed: {e}");
                }
            }
            Err(e) => tracing::warn!("activity log write failed: {e}"),
        }
    }

    fn line(&self, kind: ActivityKind, payload: &str) -> String {
        let ts = iso8601(self.store.clock().now_utc());
        format!("- {ts} **{kind}** {payload}", kind = kind.as_str())
    }
}
