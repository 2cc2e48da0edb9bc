//! Recording fakes of the external collaborators, shared by unit tests.

use crate::postgres::control_client::{
    BackupControlClient, BackupPhase, BackupStatus, StartBackupRequest, StopBackupRequest,
};
use crate::postgres::controldata::{ControlDataReader, REDO_WAL_FILE_FIELD};
use crate::repository::SnapshotTool;
use crate::utils::{Result, SidecarError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const BEGIN_WAL: &str = "000000010000000000000002";
pub const END_WAL: &str = "000000010000000000000004";

/// Ordered record of every collaborator call.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }
}

#[derive(Default)]
pub struct RecordingTool {
    calls: Mutex<Vec<Vec<String>>>,
    fail_on: Option<String>,
    journal: Journal,
}

impl RecordingTool {
    pub fn with_journal(journal: Journal) -> Self {
        Self {
            journal,
            ..Self::default()
        }
    }

    /// Fails every command whose first argument is `command`.
    pub fn failing_on(command: &str) -> Self {
        Self {
            fail_on: Some(command.to_string()),
            ..Self::default()
        }
    }

    pub fn failing_on_path(journal: Journal, path: &str) -> Self {
        Self {
            fail_on: Some(path.to_string()),
            journal,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// `(path, tags)` of every snapshot taken.
    pub fn snapshots(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter(|args| args.first().map(String::as_str) == Some("snapshot"))
            .map(|args| {
                let tags = args
                    .iter()
                    .find_map(|arg| arg.strip_prefix("--tags="))
                    .unwrap_or_default()
                    .to_string();
                (args[4].clone(), tags)
            })
            .collect()
    }
}

#[async_trait]
impl SnapshotTool for RecordingTool {
    async fn run(&self, args: &[String], cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(SidecarError::Cancelled);
        }
        self.calls.lock().unwrap().push(args.to_vec());
        if args.first().map(String::as_str) == Some("snapshot") {
            self.journal.push(format!("snapshot {}", args[4]));
        }

        if let Some(fail_on) = &self.fail_on {
            if args.first() == Some(fail_on) || args.get(4) == Some(fail_on) {
                return Err(SidecarError::ExternalTool {
                    command: format!("kopia {}", args[0]),
                    status: "exit status: 1".to_string(),
                    output: "injected failure".to_string(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Idle,
    Starting,
    Stopping,
}

/// Instance manager fake reaching each phase after a number of polls.
pub struct FakeControlClient {
    journal: Journal,
    pub polls_before_ready: usize,
    pub never_ready: bool,
    pub report_failed: bool,
    pub status_error: bool,
    /// How long `start` takes to answer after the request is delivered
    pub start_delay: Option<Duration>,
    state: Mutex<(Mode, usize)>,
    pub status_calls: AtomicUsize,
    pub start_requests: Mutex<Vec<StartBackupRequest>>,
}

impl FakeControlClient {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            polls_before_ready: 0,
            never_ready: false,
            report_failed: false,
            status_error: false,
            start_delay: None,
            state: Mutex::new((Mode::Idle, 0)),
            status_calls: AtomicUsize::new(0),
            start_requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl BackupControlClient for FakeControlClient {
    async fn start(&self, request: &StartBackupRequest) -> Result<()> {
        self.journal.push("start");
        self.start_requests.lock().unwrap().push(request.clone());
        *self.state.lock().unwrap() = (Mode::Starting, 0);
        if let Some(delay) = self.start_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn stop(&self, _request: &StopBackupRequest) -> Result<()> {
        self.journal.push("stop");
        *self.state.lock().unwrap() = (Mode::Stopping, 0);
        Ok(())
    }

    async fn status(&self) -> Result<BackupStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if self.status_error {
            return Err(SidecarError::ControlProtocol {
                code: "503".to_string(),
                message: "instance manager unavailable".to_string(),
            });
        }

        let mut state = self.state.lock().unwrap();
        state.1 += 1;
        let ready = !self.never_ready && state.1 > self.polls_before_ready;

        let phase = match (state.0, ready) {
            _ if self.report_failed => BackupPhase::Failed,
            (Mode::Starting, true) => BackupPhase::Started,
            (Mode::Stopping, true) => BackupPhase::Completed,
            _ => BackupPhase::InProgress,
        };

        let mut status = BackupStatus {
            backup_name: "nightly".to_string(),
            phase,
            begin_lsn: "0/2000028".to_string(),
            ..BackupStatus::default()
        };
        if phase == BackupPhase::Completed {
            status.end_lsn = "0/4000100".to_string();
            status.label_file = "START WAL LOCATION: 0/2000028".to_string();
            status.spcmap_file = "16384 /data/ts1\n16385 /data/ts2\n".to_string();
        }
        Ok(status)
    }
}

/// Returns `BEGIN_WAL` on the first read and `END_WAL` afterwards.
pub struct FakeControlData {
    journal: Journal,
    reads: AtomicUsize,
}

impl FakeControlData {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            reads: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ControlDataReader for FakeControlData {
    async fn read_control_data(&self, _cancel: &CancellationToken) -> Result<HashMap<String, String>> {
        self.journal.push("controldata");
        let wal = if self.reads.fetch_add(1, Ordering::SeqCst) == 0 {
            BEGIN_WAL
        } else {
            END_WAL
        };
        Ok(HashMap::from([(REDO_WAL_FILE_FIELD.to_string(), wal.to_string())]))
    }
}
