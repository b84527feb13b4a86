//! Cancellable scheduled tasks.
//!
//! Every piece of recurring work (cleanup sweep, background refresh, sync
//! registrations) runs as a spawned task owned by a [`TaskHandle`].
//! Cancelling or dropping the handle aborts the task, so a torn-down owner
//! cannot leave a timer running behind it.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

/// Owner of a spawned task.
#[must_use = "dropping a TaskHandle cancels the task"]
#[derive(Debug)]
pub struct TaskHandle {
    name: String,
    join: Option<JoinHandle<()>>,
}

impl TaskHandle {
    /// Spawn `future` under a handle.
    pub fn spawn<F>(name: impl Into<String>, future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        debug!(task = %name, "Task spawned");
        Self {
            name,
            join: Some(tokio::spawn(future)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop the task. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(join) = self.join.take() {
            join.abort();
            debug!(task = %self.name, "Task cancelled");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.join.is_none()
    }

    /// Whether the task is no longer running, for any reason.
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Run `tick` every `period`, first firing one full period from now.
///
/// Missed ticks are skipped rather than replayed in a burst. A tick that is
/// still running when the next is due delays it; ticks never overlap.
pub fn spawn_periodic<F, Fut>(name: impl Into<String>, period: Duration, mut tick: F) -> TaskHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    TaskHandle::spawn(name, async move {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            tick().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_periodic_fires_after_each_period() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let _handle = spawn_periodic("counter", Duration::from_secs(10), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_ticks() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let mut handle = spawn_periodic("counter", Duration::from_secs(1), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(2500)).await;
        handle.cancel();
        handle.cancel();
        assert!(handle.is_cancelled());

        let seen = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), seen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let handle = spawn_periodic("counter", Duration::from_secs(1), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        drop(handle);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
