use std::future::Future;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Owner of a scheduled background task.
///
/// Cancelling only stops the task at its next wait point: a callback that has
/// already started runs to completion, so a callback may safely cancel its
/// own handle. `cancel` is idempotent and dropping the handle cancels it.
#[derive(Debug)]
pub struct TimerHandle {
    token: CancellationToken,
}

impl TimerHandle {
    /// Runs `callback` every `period`, first call after one full period.
    pub fn repeating<F, Fut>(period: Duration, mut callback: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancel_token = token.clone();

        tokio::spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = cancel_token.cancelled() => break,
                }
                if cancel_token.is_cancelled() {
                    break;
                }
                callback().await;
            }
        });

        Self { token }
    }

    /// Runs `callback` once after `delay` unless cancelled first.
    pub fn once<F, Fut>(delay: Duration, callback: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancel_token = token.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = time::sleep(delay) => {}
                _ = cancel_token.cancelled() => return,
            }
            callback().await;
        });

        Self { token }
    }

    /// Runs a self-scheduling loop that receives the cancellation token and
    /// decides its own wake-ups.
    pub fn spawn<F, Fut>(task: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        tokio::spawn(task(token.clone()));
        Self { token }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
