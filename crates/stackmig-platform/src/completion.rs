//! Bounded wait for a configuration to reach a terminal status

use crate::error::{PlatformError, Result};
use crate::model::ConfigurationStatus;
use crate::platform::StackPlatform;
use futures_util::StreamExt;
use stackmig_framework::CancelToken;
use std::time::Duration;
use tokio::time::Instant;

/// Budget for [`await_completion`], measured from entry
pub const AWAIT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// How an await ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Converged,
    Errored,
    Canceled,
    /// Status stream ended before a terminal status; carries the last one seen
    StreamClosed(ConfigurationStatus),
    /// Deadline elapsed or the caller cancelled; carries the last status seen
    TimedOut(ConfigurationStatus),
}

impl Completion {
    fn from_terminal(status: ConfigurationStatus) -> Option<Self> {
        match status {
            ConfigurationStatus::Converged => Some(Completion::Converged),
            ConfigurationStatus::Errored => Some(Completion::Errored),
            ConfigurationStatus::Canceled => Some(Completion::Canceled),
            _ => None,
        }
    }
}

/// Wait until `configuration_id` reaches a terminal status, `timeout`
/// elapses, or `cancel` fires.
///
/// The configuration is read once up front; an already-terminal status
/// returns without opening the status stream. Dropping the stream on
/// deadline or cancellation aborts any in-flight request.
pub async fn await_completion(
    platform: &dyn StackPlatform,
    configuration_id: &str,
    cancel: &CancelToken,
    timeout: Duration,
) -> Result<Completion> {
    let deadline = Instant::now() + timeout;
    let expired = || {
        PlatformError::Timeout(format!(
            "waiting for stack configuration {}",
            configuration_id
        ))
    };

    let initial = tokio::select! {
        result = platform.read_configuration(configuration_id) => result?,
        _ = tokio::time::sleep_until(deadline) => return Err(expired()),
        _ = cancel.cancelled() => return Err(expired()),
    };

    let mut last = initial.status;
    if let Some(completion) = Completion::from_terminal(last) {
        tracing::debug!(configuration_id, status = %last, "configuration already terminal");
        return Ok(completion);
    }

    tracing::info!(configuration_id, status = %last, "waiting for configuration to complete");
    let mut updates = platform.watch_configuration(configuration_id);
    let sleep = tokio::time::sleep_until(deadline);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => {
                tracing::warn!(configuration_id, status = %last, "timed out waiting for configuration");
                return Ok(Completion::TimedOut(last));
            }
            _ = cancel.cancelled() => {
                tracing::warn!(configuration_id, status = %last, "wait cancelled");
                return Ok(Completion::TimedOut(last));
            }
            update = updates.next() => match update {
                None => {
                    tracing::debug!(configuration_id, status = %last, "status stream closed");
                    return Ok(Completion::StreamClosed(last));
                }
                Some(Err(e)) => return Err(e),
                Some(Ok(status)) => {
                    if status != last {
                        tracing::debug!(configuration_id, from = %last, to = %status, "configuration status changed");
                    }
                    last = status;
                    if let Some(completion) = Completion::from_terminal(status) {
                        return Ok(completion);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakePlatform;
    use ConfigurationStatus::*;

    fn platform_with(initial: ConfigurationStatus, script: &[ConfigurationStatus]) -> FakePlatform {
        let platform = FakePlatform::new();
        platform.add_configuration("stc-1", initial, script);
        platform
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_statuses_return_after_one_read() {
        for (status, expected) in [
            (Converged, Completion::Converged),
            (Errored, Completion::Errored),
            (Canceled, Completion::Canceled),
        ] {
            let platform = platform_with(status, &[]);
            let completion =
                await_completion(&platform, "stc-1", &CancelToken::new(), AWAIT_TIMEOUT)
                    .await
                    .unwrap();
            assert_eq!(completion, expected);
            assert_eq!(platform.configuration_reads(), 1);
            assert_eq!(platform.watch_count(), 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transitions_to_converged() {
        let platform = platform_with(Pending, &[Preparing, Enqueueing, Converging, Converged]);
        let completion = await_completion(&platform, "stc-1", &CancelToken::new(), AWAIT_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(completion, Completion::Converged);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transitions_to_errored() {
        let platform = platform_with(Queued, &[Preparing, Errored]);
        let completion = await_completion(&platform, "stc-1", &CancelToken::new(), AWAIT_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(completion, Completion::Errored);
        assert_eq!(platform.configuration_status("stc-1"), Some(Errored));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_closed_keeps_last_status() {
        let platform = platform_with(Pending, &[Preparing, Converging]);
        let completion = await_completion(&platform, "stc-1", &CancelToken::new(), AWAIT_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(completion, Completion::StreamClosed(Converging));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_with_latest_transitional_status() {
        let platform = platform_with(Pending, &[Preparing]);
        platform.stall_after_script("stc-1");

        let started = Instant::now();
        let completion = await_completion(&platform, "stc-1", &CancelToken::new(), AWAIT_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(completion, Completion::TimedOut(Preparing));
        assert!(started.elapsed() >= AWAIT_TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_returns_promptly() {
        let platform = platform_with(Converging, &[]);
        platform.stall_after_script("stc-1");

        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let completion = await_completion(&platform, "stc-1", &cancel, AWAIT_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(completion, Completion::TimedOut(Converging));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_configuration() {
        let platform = FakePlatform::new();
        let err = await_completion(&platform, "stc-404", &CancelToken::new(), AWAIT_TIMEOUT)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
