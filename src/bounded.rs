//! Wall-clock bounded execution.
//!
//! The work runs on a detached worker thread; the caller waits on a
//! one-slot channel. A worker that misses the deadline keeps running and its
//! late result is dropped with the channel.

use std::{thread, time::Duration};

use crossbeam_channel::RecvTimeoutError;
use tracing::warn;

use crate::{
    classify::parse_content,
    config::Config,
    error::VerifyError,
    generated::{GeneratedQuestion, parse_generated},
    model::{Segment, VerificationRequest, VerificationResult},
    verify::verify,
};

/// Stack for worker threads; parsing recursion is bounded by
/// [`crate::parse::MAX_DEPTH`] and fits well inside it.
const WORKER_STACK_BYTES: usize = 8 * 1024 * 1024;

pub fn run_bounded<T, F>(timeout: Duration, job: F) -> Result<T, VerifyError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = crossbeam_channel::bounded(1);
    thread::Builder::new()
        .name("mathcheck-worker".to_string())
        .stack_size(WORKER_STACK_BYTES)
        .spawn(move || {
            let _ = tx.send(job());
        })
        .map_err(|e| VerifyError::Internal(format!("cannot start worker: {e}")))?;

    match rx.recv_timeout(timeout) {
        Ok(value) => Ok(value),
        Err(RecvTimeoutError::Timeout) => {
            let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
            warn!(millis, "bounded call timed out");
            Err(VerifyError::Timeout { millis })
        }
        Err(RecvTimeoutError::Disconnected) => {
            Err(VerifyError::Internal("worker stopped without a result".to_string()))
        }
    }
}

pub fn parse_content_bounded(input: &str, config: &Config) -> Result<Vec<Segment>, VerifyError> {
    config.validate()?;
    let input = input.to_string();
    run_bounded(Duration::from_millis(config.timeout_ms), move || {
        parse_content(&input)
    })
}

pub fn verify_bounded(
    request: VerificationRequest,
    config: &Config,
) -> Result<VerificationResult, VerifyError> {
    config.validate()?;
    let worker_config = config.clone();
    run_bounded(Duration::from_millis(config.timeout_ms), move || {
        verify(&request, &worker_config)
    })?
}

pub fn parse_generated_bounded(
    payload: &str,
    config: &Config,
) -> Result<GeneratedQuestion, VerifyError> {
    config.validate()?;
    let payload = payload.to_string();
    run_bounded(Duration::from_millis(config.timeout_ms), move || {
        parse_generated(&payload)
    })?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_the_result_in_time() {
        let value = run_bounded(Duration::from_secs(5), || 6 * 7).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn slow_work_times_out() {
        let err = run_bounded(Duration::from_millis(20), || {
            thread::sleep(Duration::from_millis(500));
        })
        .unwrap_err();
        assert!(matches!(err, VerifyError::Timeout { millis: 20 }));
        assert!(!err.is_client_error());
    }

    #[test]
    fn panicking_worker_is_internal() {
        let err = run_bounded(Duration::from_secs(5), || -> u8 { panic!("boom") }).unwrap_err();
        assert!(matches!(err, VerifyError::Internal(_)));
    }

    #[test]
    fn bounded_segmentation() {
        let segments = parse_content_bounded("Solve $x+1=5$", &Config::default()).unwrap();
        assert_eq!(segments.len(), 2);
    }
}
