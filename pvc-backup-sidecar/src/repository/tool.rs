//! Invocation of the external snapshot store CLI.

use crate::utils::{Result, SidecarError};
use async_trait::async_trait;
use std::process::Stdio;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Runs one command of the snapshot store tool.
#[async_trait]
pub trait SnapshotTool: Send + Sync {
    async fn run(&self, args: &[String], cancel: &CancellationToken) -> Result<()>;
}

/// Runs the `kopia` executable as a subprocess.
pub struct KopiaCli {
    binary: String,
}

impl KopiaCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl SnapshotTool for KopiaCli {
    async fn run(&self, args: &[String], cancel: &CancellationToken) -> Result<()> {
        debug!(binary = %self.binary, ?args, "Invoking snapshot tool");

        let child = tokio::process::Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::select! {
            output = child => output?,
            _ = cancel.cancelled() => return Err(SidecarError::Cancelled),
        };

        if output.status.success() {
            return Ok(());
        }

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        // e.g. "kopia snapshot create"
        let subcommand: Vec<&str> = args.iter().take(2).map(String::as_str).collect();
        let command = format!("{} {}", self.binary, subcommand.join(" "));
        error!(
            %command,
            ?args,
            output = %combined,
            "Error invoking snapshot tool"
        );

        Err(SidecarError::ExternalTool {
            command,
            status: output.status.to_string(),
            output: combined,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failure_reports_combined_output() {
        let tool = KopiaCli::new("sh");
        let args = vec!["-c".to_string(), "echo out; echo err >&2; exit 3".to_string()];

        let err = tool.run(&args, &CancellationToken::new()).await.unwrap_err();
        match err {
            SidecarError::ExternalTool { output, status, .. } => {
                assert!(output.contains("out"));
                assert!(output.contains("err"));
                assert!(status.contains('3'));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_success() {
        let tool = KopiaCli::new("true");
        tool.run(&[], &CancellationToken::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_command_is_aborted() {
        let tool = KopiaCli::new("sleep");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = tool.run(&["30".to_string()], &cancel).await.unwrap_err();
        assert!(matches!(err, SidecarError::Cancelled));
    }
}
