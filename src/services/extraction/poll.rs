use crate::config::PollConfig;
use crate::error::{AppError, AppResult};
use std::future::Future;

/// Outcome of one status check against a remote job.
#[derive(Debug)]
pub enum PollStatus<T> {
    Ready(T),
    Pending(String),
}

/// Polls a remote job until it is ready.
///
/// The check runs at most `config.attempts` times (at least once) with a
/// fixed `config.interval` sleep in between. Errors from the check end the
/// loop immediately; running out of attempts is a [`AppError::Timeout`].
pub async fn poll_until<T, F, Fut>(what: &str, config: &PollConfig, mut check: F) -> AppResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = AppResult<PollStatus<T>>>,
{
    let attempts = config.attempts.max(1);
    let mut last_status = String::from("unknown");

    for attempt in 1..=attempts {
        match check(attempt).await? {
            PollStatus::Ready(value) => {
                tracing::info!("{} ready after {} attempt(s)", what, attempt);
                return Ok(value);
            }
            PollStatus::Pending(status) => {
                tracing::debug!("{} is {} (attempt {}/{})", what, status, attempt, attempts);
                last_status = status;
            }
        }

        if attempt < attempts {
            tokio::time::sleep(config.interval).await;
        }
    }

    Err(AppError::Timeout(format!(
        "{} still '{}' after {} attempts",
        what, last_status, attempts
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fast(attempts: u32) -> PollConfig {
        PollConfig {
            attempts,
            interval: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn returns_once_the_job_is_ready() {
        let result = poll_until("job", &fast(5), |attempt| async move {
            if attempt == 3 {
                Ok(PollStatus::Ready(attempt))
            } else {
                Ok(PollStatus::Pending("running".to_string()))
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 3);
    }

    #[tokio::test]
    async fn gives_up_after_the_attempt_cap() {
        let mut calls = 0;
        let err = poll_until::<(), _, _>("job", &fast(4), |_| {
            calls += 1;
            async { Ok(PollStatus::Pending("in progress".to_string())) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls, 4);
        match err {
            AppError::Timeout(msg) => assert!(msg.contains("in progress")),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn check_errors_stop_polling() {
        let mut calls = 0;
        let err = poll_until::<(), _, _>("job", &fast(10), |_| {
            calls += 1;
            async { Err(AppError::ExtractionFailed("job failed".to_string())) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls, 1);
        assert!(matches!(err, AppError::ExtractionFailed(_)));
    }

    #[tokio::test]
    async fn zero_attempts_still_checks_once() {
        let value = poll_until("job", &fast(0), |_| async { Ok(PollStatus::Ready(7)) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }
}
