//! Wall-clock limit around a blocking job.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use crate::error::{PipelineError, Result};

/// Run `job`, giving up after `timeout`.
///
/// With a timeout the job runs on a helper thread and the caller waits at
/// most `timeout` for its result. An expired job cannot be interrupted: it
/// runs to completion in the background and its result is dropped. Without
/// a timeout the job runs on the calling thread.
pub fn with_deadline<T, F>(timeout: Option<Duration>, job: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let Some(timeout) = timeout else {
        return job();
    };

    let (sender, receiver) = mpsc::channel();
    thread::Builder::new()
        .name("qsmprep-estimate".to_string())
        .spawn(move || {
            // The receiver is gone once the deadline passed.
            let _ = sender.send(job());
        })?;

    match receiver.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => {
            tracing::warn!(timeout_s = timeout.as_secs_f64(), "job exceeded its deadline");
            Err(PipelineError::Timeout(timeout))
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Err(PipelineError::Worker("job thread ended without a result".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_fast_job_returns_its_value() {
        let value = with_deadline(Some(Duration::from_secs(5)), || Ok(21 * 2)).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_slow_job_times_out() {
        let err = with_deadline(Some(Duration::from_millis(20)), || {
            thread::sleep(Duration::from_millis(500));
            Ok(())
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_job_error_passes_through() {
        let err = with_deadline::<(), _>(Some(Duration::from_secs(5)), || Err(PipelineError::shape_mismatch("grid")))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
    }

    #[test]
    fn test_panicking_job_is_reported() {
        let err = with_deadline::<(), _>(Some(Duration::from_secs(5)), || panic!("boom")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_no_deadline_runs_inline() {
        let id = thread::current().id();
        let ran_on = with_deadline(None, move || Ok(thread::current().id() == id)).unwrap();
        assert!(ran_on);
    }
}
