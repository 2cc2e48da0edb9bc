//! Phases of a backup run.

use std::fmt;

/// Where a [`BackupExecutor`](super::BackupExecutor) is in the backup protocol.
///
/// ```text
/// Idle -> ModeRequested -> ModeActive -> Snapshotting -> ModeActive
///      -> ModeStopping -> Completed
/// ```
/// Any non-terminal state may move to `Aborted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Idle,
    ModeRequested,
    ModeActive,
    Snapshotting,
    ModeStopping,
    Completed,
    Aborted,
}

impl fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutorState::Idle => "idle",
            ExecutorState::ModeRequested => "mode-requested",
            ExecutorState::ModeActive => "mode-active",
            ExecutorState::Snapshotting => "snapshotting",
            ExecutorState::ModeStopping => "mode-stopping",
            ExecutorState::Completed => "completed",
            ExecutorState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}
