//! Inactivity timer for relayed sessions.
//!
//! The timer checks once per interval whether any activity was recorded since
//! the previous check. A full interval of silence cancels the session token.
//! Changing the timeout restarts the interval from a clean slate, so the new
//! timeout is the whole grace a silent session gets.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

struct Shared {
    updated: AtomicBool,
    timeout: Mutex<Duration>,
    rearm: Notify,
    token: CancellationToken,
}

/// Cancels a token after a period without activity.
///
/// Cloning yields another handle to the same timer. The background check
/// stops once the token is cancelled, by the timer itself or by anyone else.
#[derive(Clone)]
pub struct ActivityTimer {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ActivityTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityTimer")
            .field("timeout", &*self.shared.timeout.lock())
            .field("cancelled", &self.shared.token.is_cancelled())
            .finish()
    }
}

impl ActivityTimer {
    /// Start watching `token`. A zero timeout cancels right away.
    pub fn start(token: CancellationToken, timeout: Duration) -> Self {
        let shared = Arc::new(Shared {
            updated: AtomicBool::new(false),
            timeout: Mutex::new(timeout),
            rearm: Notify::new(),
            token,
        });

        if timeout.is_zero() {
            shared.token.cancel();
        } else {
            tokio::spawn(check_loop(shared.clone()));
        }

        Self { shared }
    }

    /// Record activity
    pub fn update(&self) {
        self.shared.updated.store(true, Ordering::Release);
    }

    /// Replace the timeout and restart the interval. Zero cancels immediately.
    ///
    /// The rearm itself is not activity: one silent interval of the new length
    /// cancels the token.
    pub fn set_timeout(&self, timeout: Duration) {
        if timeout.is_zero() {
            self.shared.token.cancel();
            return;
        }

        *self.shared.timeout.lock() = timeout;
        self.shared.updated.store(false, Ordering::Release);
        self.shared.rearm.notify_one();
    }

    pub fn timeout(&self) -> Duration {
        *self.shared.timeout.lock()
    }

    pub fn is_expired(&self) -> bool {
        self.shared.token.is_cancelled()
    }
}

async fn check_loop(shared: Arc<Shared>) {
    loop {
        let interval = *shared.timeout.lock();
        tokio::select! {
            _ = shared.token.cancelled() => return,
            _ = shared.rearm.notified() => continue,
            _ = tokio::time::sleep(interval) => {
                if !shared.updated.swap(false, Ordering::AcqRel) {
                    tracing::debug!("No activity for {:?}, cancelling session", interval);
                    shared.token.cancel();
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{Instant, sleep, timeout};

    #[tokio::test]
    async fn silence_cancels_within_two_intervals() {
        let token = CancellationToken::new();
        let started = Instant::now();
        let _timer = ActivityTimer::start(token.clone(), Duration::from_millis(50));

        timeout(Duration::from_secs(2), token.cancelled())
            .await
            .expect("timer should cancel");
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(50), "{:?}", elapsed);
    }

    #[tokio::test]
    async fn activity_keeps_token_alive() {
        let token = CancellationToken::new();
        let timer = ActivityTimer::start(token.clone(), Duration::from_millis(80));

        for _ in 0..10 {
            sleep(Duration::from_millis(20)).await;
            timer.update();
        }
        assert!(!token.is_cancelled());
        assert!(!timer.is_expired());

        timeout(Duration::from_secs(2), token.cancelled())
            .await
            .expect("cancels after activity stops");
    }

    #[tokio::test]
    async fn zero_timeout_cancels_immediately() {
        let token = CancellationToken::new();
        let _timer = ActivityTimer::start(token.clone(), Duration::ZERO);
        assert!(token.is_cancelled());

        let token = CancellationToken::new();
        let timer = ActivityTimer::start(token.clone(), Duration::from_secs(60));
        timer.set_timeout(Duration::ZERO);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn shorter_timeout_takes_effect() {
        let token = CancellationToken::new();
        let timer = ActivityTimer::start(token.clone(), Duration::from_secs(300));

        let started = Instant::now();
        timer.set_timeout(Duration::from_millis(30));
        assert_eq!(timer.timeout(), Duration::from_millis(30));

        timeout(Duration::from_secs(2), token.cancelled())
            .await
            .expect("new timeout should apply");
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn rearm_is_not_counted_as_activity() {
        let token = CancellationToken::new();
        let timer = ActivityTimer::start(token.clone(), Duration::from_secs(30));
        timer.update();

        let grace = Duration::from_millis(300);
        let started = Instant::now();
        timer.set_timeout(grace);

        timeout(Duration::from_secs(2), token.cancelled())
            .await
            .expect("cancels after one silent interval");
        let elapsed = started.elapsed();
        assert!(elapsed >= grace, "{:?}", elapsed);
        assert!(elapsed < grace.mul_f32(1.5), "{:?}", elapsed);
    }

    #[tokio::test]
    async fn activity_after_rearm_extends_grace() {
        let token = CancellationToken::new();
        let timer = ActivityTimer::start(token.clone(), Duration::from_secs(30));
        timer.set_timeout(Duration::from_millis(100));

        for _ in 0..6 {
            sleep(Duration::from_millis(30)).await;
            timer.update();
        }
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn external_cancel_stops_timer() {
        let token = CancellationToken::new();
        let timer = ActivityTimer::start(token.clone(), Duration::from_secs(300));
        token.cancel();
        assert!(timer.is_expired());
    }
}
