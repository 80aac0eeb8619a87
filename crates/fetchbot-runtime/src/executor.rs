//! [`HwExecutor`] – blocking hardware calls off the async runtime.
//!
//! Pin and sensor operations block (mutex waits, echo polling), so the
//! control loop never runs them inline: each call goes through
//! [`HwExecutor::run`], which moves it onto the blocking pool and counts it
//! in flight. Shutdown calls [`HwExecutor::drain`], which refuses new work
//! and waits for the in-flight count to reach zero, so no hardware call can
//! race the final handle close.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use fetchbot_types::RobotError;
use tracing::debug;

const DRAIN_POLL: Duration = Duration::from_millis(5);

/// Counted offload of blocking work onto the runtime's blocking pool.
#[derive(Clone)]
pub struct HwExecutor {
    inflight: Arc<AtomicUsize>,
    cancelled: Arc<AtomicBool>,
}

impl HwExecutor {
    pub fn new() -> Self {
        Self {
            inflight: Arc::new(AtomicUsize::new(0)),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Run `op` on the blocking pool, counted in flight until it finishes.
    ///
    /// Refused with [`RobotError::Channel`] once [`drain`](Self::drain) has
    /// begun.
    pub async fn run<T, F>(&self, op: F) -> Result<T, RobotError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, RobotError> + Send + 'static,
    {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(RobotError::Channel("executor is draining".into()));
        }
        let guard = InflightGuard::enter(Arc::clone(&self.inflight));
        let result = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            op()
        })
        .await;
        match result {
            Ok(inner) => inner,
            Err(e) => Err(RobotError::Channel(format!("blocking task failed: {e}"))),
        }
    }

    /// Number of operations currently in flight.
    pub fn in_flight(&self) -> usize {
        self.inflight.load(Ordering::SeqCst)
    }

    /// Refuse new work and wait until every in-flight operation finishes.
    pub async fn drain(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        while self.inflight.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(DRAIN_POLL).await;
        }
        debug!("hardware executor drained");
    }
}

impl Default for HwExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight count when the operation ends, panics included.
struct InflightGuard {
    inflight: Arc<AtomicUsize>,
}

impl InflightGuard {
    fn enter(inflight: Arc<AtomicUsize>) -> Self {
        inflight.fetch_add(1, Ordering::SeqCst);
        Self { inflight }
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.inflight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_returns_the_operation_result() {
        let exec = HwExecutor::new();
        let value = exec.run(|| Ok(21 * 2)).await.unwrap();
        assert_eq!(value, 42);
        assert_eq!(exec.in_flight(), 0);
    }

    #[tokio::test]
    async fn errors_pass_through() {
        let exec = HwExecutor::new();
        let result: Result<(), _> = exec.run(|| Err(RobotError::SensorTimeout)).await;
        assert_eq!(result, Err(RobotError::SensorTimeout));
    }

    #[tokio::test]
    async fn drain_refuses_new_work() {
        let exec = HwExecutor::new();
        exec.drain().await;
        let result: Result<(), _> = exec.run(|| Ok(())).await;
        assert!(matches!(result, Err(RobotError::Channel(_))));
    }

    #[tokio::test]
    async fn drain_waits_for_in_flight_work() {
        let exec = HwExecutor::new();
        let slow = {
            let exec = exec.clone();
            tokio::spawn(async move {
                exec.run(|| {
                    std::thread::sleep(Duration::from_millis(50));
                    Ok(7)
                })
                .await
            })
        };
        // Let the blocking task start before draining.
        tokio::time::sleep(Duration::from_millis(10)).await;
        exec.drain().await;
        assert_eq!(exec.in_flight(), 0);
        assert_eq!(slow.await.unwrap().unwrap(), 7);
    }

    #[tokio::test]
    async fn in_flight_count_survives_a_panicking_op() {
        let exec = HwExecutor::new();
        let result: Result<(), _> = exec
            .run(|| {
                panic!("op blew up");
            })
            .await;
        assert!(matches!(result, Err(RobotError::Channel(_))));
        assert_eq!(exec.in_flight(), 0);
    }
}
