//! Readiness polling for two-step publishes
//!
//! Instagram and Threads first create a media container, then publish it
//! once the platform reports it ready. The poller waits with a doubling
//! backoff, bounded by `[polling]` config.

use std::future::Future;
use std::time::Duration;

use crate::config::PollingConfig;
use crate::error::{PlatformError, PlatformResult};

/// Container state as reported by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Pending,
    /// Terminal failure; no point polling again
    Failed(String),
}

impl Readiness {
    /// Map a Graph-style status string
    pub fn from_status(status: &str) -> Self {
        match status.to_uppercase().as_str() {
            "FINISHED" | "PUBLISHED" => Readiness::Ready,
            "ERROR" | "EXPIRED" => Readiness::Failed(format!("container status {}", status)),
            _ => Readiness::Pending,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Poller {
    initial_delay: Duration,
    max_delay: Duration,
    max_attempts: u32,
}

impl Poller {
    pub fn new(initial_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            initial_delay,
            max_delay,
            max_attempts,
        }
    }

    pub fn from_config(config: &PollingConfig) -> Self {
        Self::new(
            Duration::from_millis(config.initial_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            config.max_attempts,
        )
    }

    /// Delay before each attempt
    pub fn delays(&self) -> Vec<Duration> {
        let mut delays = Vec::with_capacity(self.max_attempts as usize);
        let mut delay = self.initial_delay;
        for _ in 0..self.max_attempts {
            delays.push(delay);
            delay = (delay * 2).min(self.max_delay);
        }
        delays
    }

    /// Wait, then check, until `check` reports ready
    ///
    /// Errors from `check` end the wait immediately. Running out of attempts
    /// is a `processing_timeout`.
    pub async fn wait_until_ready<F, Fut>(&self, what: &str, mut check: F) -> PlatformResult<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = PlatformResult<Readiness>>,
    {
        for (attempt, delay) in self.delays().into_iter().enumerate() {
            tokio::time::sleep(delay).await;

            match check().await? {
                Readiness::Ready => {
                    tracing::debug!(what, attempt = attempt + 1, "Container ready");
                    return Ok(());
                }
                Readiness::Failed(reason) => {
                    return Err(PlatformError::PlatformRejected {
                        status: None,
                        message: format!("{} failed: {}", what, reason),
                    });
                }
                Readiness::Pending => {
                    tracing::debug!(what, attempt = attempt + 1, "Container not ready yet");
                }
            }
        }

        Err(PlatformError::ProcessingTimeout(format!(
            "{} not ready after {} attempts",
            what, self.max_attempts
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_poller(max_attempts: u32) -> Poller {
        Poller::new(Duration::from_millis(1), Duration::from_millis(4), max_attempts)
    }

    #[test]
    fn test_delays_double_and_cap() {
        let poller = Poller::new(Duration::from_secs(3), Duration::from_secs(30), 6);
        let secs: Vec<u64> = poller.delays().iter().map(Duration::as_secs).collect();
        assert_eq!(secs, vec![3, 6, 12, 24, 30, 30]);
    }

    #[test]
    fn test_readiness_from_status() {
        assert_eq!(Readiness::from_status("FINISHED"), Readiness::Ready);
        assert_eq!(Readiness::from_status("in_progress"), Readiness::Pending);
        assert!(matches!(Readiness::from_status("ERROR"), Readiness::Failed(_)));
        assert!(matches!(Readiness::from_status("EXPIRED"), Readiness::Failed(_)));
    }

    #[tokio::test]
    async fn test_ready_after_pending() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = fast_poller(5)
            .wait_until_ready("container", move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                Ok(if n < 2 { Readiness::Pending } else { Readiness::Ready })
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_is_processing_timeout() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = fast_poller(3)
            .wait_until_ready("container", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Readiness::Pending)
            })
            .await;

        assert!(matches!(result, Err(PlatformError::ProcessingTimeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_terminal_failure_stops_polling() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = fast_poller(5)
            .wait_until_ready("container", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Readiness::from_status("ERROR"))
            })
            .await;

        assert_eq!(result.unwrap_err().code(), "platform_rejected");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_check_error_propagates() {
        let result = fast_poller(5)
            .wait_until_ready("container", || async {
                Err(PlatformError::Network("connection reset".to_string()))
            })
            .await;

        assert_eq!(result, Err(PlatformError::Network("connection reset".to_string())));
    }
}
