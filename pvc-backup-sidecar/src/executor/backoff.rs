//! Bounded exponential backoff for the backup-mode poll loops.

use crate::utils::{Result, SidecarError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    /// Total number of attempts, the first one included
    pub steps: u32,
    /// Delay before the first retry
    pub duration: Duration,
    /// Growth of the delay between consecutive retries
    pub factor: f64,
    /// Relative random spread applied to every delay
    pub jitter: f64,
}

impl Backoff {
    /// Schedule waiting for PostgreSQL to enter or leave backup mode.
    ///
    /// Short retries come first; the last ones are long enough to outlast a
    /// slow checkpoint.
    pub const BACKUP_MODE: Backoff = Backoff {
        steps: 10,
        duration: Duration::from_secs(1),
        factor: 5.0,
        jitter: 0.1,
    };

    /// Delay before the `retry`-th retry (1-based), without jitter.
    pub fn base_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.duration.as_secs_f64() * self.factor.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Applies up to ±`jitter` of random spread to `base`.
    pub fn jittered(&self, base: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return base;
        }
        let spread = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        Duration::try_from_secs_f64(base.as_secs_f64() * (1.0 + spread)).unwrap_or(base)
    }
}

/// Runs `attempt` until it succeeds, fails with a non-retryable error or the
/// schedule runs out of steps. In the last case the final retryable error is
/// returned.
///
/// Cancelling `cancel` aborts both an in-flight attempt and the wait between
/// attempts.
pub async fn poll<T, F, Fut>(backoff: &Backoff, cancel: &CancellationToken, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retry = 0;
    loop {
        let outcome = tokio::select! {
            outcome = attempt() => outcome,
            _ = cancel.cancelled() => return Err(SidecarError::Cancelled),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && retry + 1 < backoff.steps => {
                retry += 1;
                let delay = backoff.jittered(backoff.base_delay(retry));
                debug!(retry, ?delay, reason = %e, "Retrying");

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Err(SidecarError::Cancelled),
                }
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postgres::BackupPhase;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    fn not_started() -> SidecarError {
        SidecarError::PhaseNotReached {
            expected: BackupPhase::Started,
            observed: BackupPhase::InProgress,
        }
    }

    fn fast(steps: u32) -> Backoff {
        Backoff {
            steps,
            duration: Duration::from_millis(1),
            factor: 1.0,
            jitter: 0.0,
        }
    }

    #[test]
    fn test_backup_mode_schedule() {
        let backoff = Backoff::BACKUP_MODE;
        let delays: Vec<u64> = (1..backoff.steps).map(|n| backoff.base_delay(n).as_secs()).collect();

        assert_eq!(
            delays,
            vec![1, 5, 25, 125, 625, 3_125, 15_625, 78_125, 390_625]
        );
    }

    #[test]
    fn test_jitter_stays_within_ten_percent() {
        let backoff = Backoff::BACKUP_MODE;
        let base = Duration::from_secs(25);
        for _ in 0..1000 {
            let delay = backoff.jittered(base).as_secs_f64();
            assert!((22.49..=27.51).contains(&delay), "delay {delay} out of range");
        }
    }

    #[tokio::test]
    async fn test_poll_gives_up_after_last_step() {
        let attempts = AtomicU32::new(0);

        let result: Result<()> = poll(&fast(10), &CancellationToken::new(), || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(not_started())
        })
        .await;

        assert!(matches!(result, Err(SidecarError::PhaseNotReached { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_poll_returns_first_success() {
        let attempts = AtomicU32::new(0);

        let value = poll(&fast(10), &CancellationToken::new(), || async {
            match attempts.fetch_add(1, Ordering::SeqCst) {
                0..=2 => Err(not_started()),
                n => Ok(n),
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 3);
    }

    #[tokio::test]
    async fn test_poll_does_not_retry_transport_errors() {
        let attempts = AtomicU32::new(0);

        let result: Result<()> = poll(&fast(10), &CancellationToken::new(), || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(SidecarError::ControlProtocol {
                code: "503".into(),
                message: "unreachable".into(),
            })
        })
        .await;

        assert!(matches!(result, Err(SidecarError::ControlProtocol { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_poll_honours_cancellation_during_wait() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result: Result<()> = poll(&Backoff::BACKUP_MODE, &cancel, || async { Err(not_started()) }).await;

        assert!(matches!(result, Err(SidecarError::Cancelled)));
        assert!(started.elapsed() < Duration::from_millis(900));
    }
}
