//! Cancellable one-shot timers.
//!
//! A timer is a sleeping task that delivers an event on an mpsc channel. Each
//! timer gets a process-unique token which the event carries, so a fire that
//! was already queued when the timer got cancelled can still be recognised as
//! stale by its owner.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Hand out a token that no other timer or request in this process will use.
pub fn next_token() -> u64 {
    NEXT_TOKEN.fetch_add(1, Ordering::Relaxed)
}

/// Handle to a scheduled timer.
#[derive(Debug)]
pub struct TimerHandle {
    token: u64,
    abort: AbortHandle,
}

impl TimerHandle {
    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn cancel(self) {
        self.abort.abort();
    }
}

/// Deliver `make(token)` on `tx` once `after` has elapsed.
///
/// Must be called from within a tokio runtime.
pub fn schedule_after<E, F>(tx: &mpsc::Sender<E>, after: Duration, make: F) -> TimerHandle
where
    E: Send + 'static,
    F: FnOnce(u64) -> E + Send + 'static,
{
    let token = next_token();
    let tx = tx.clone();
    let task = tokio::spawn(async move {
        tokio::time::sleep(after).await;
        // Receiver gone means the owner shut down; nothing to tell.
        let _ = tx.send(make(token)).await;
    });
    TimerHandle {
        token,
        abort: task.abort_handle(),
    }
}

/// Holds at most one armed timer. Arming a new one cancels the previous, and
/// dropping the slot cancels whatever is armed.
#[derive(Debug, Default)]
pub struct TimerSlot {
    armed: Option<TimerHandle>,
}

impl TimerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self, handle: TimerHandle) {
        if let Some(old) = self.armed.replace(handle) {
            old.cancel();
        }
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.armed.take() {
            handle.cancel();
        }
    }

    /// Accept a fire. Returns `true` (and disarms) only when `token` belongs
    /// to the currently armed timer.
    pub fn fire(&mut self, token: u64) -> bool {
        match &self.armed {
            Some(handle) if handle.token == token => {
                self.armed = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Fired(u64);

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let (tx, mut rx) = mpsc::channel(4);
        let handle = schedule_after(&tx, Duration::from_millis(500), Fired);
        let token = handle.token();

        tokio::time::sleep(Duration::from_millis(499)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(rx.try_recv().unwrap(), Fired(token));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let (tx, mut rx) = mpsc::channel(4);
        let handle = schedule_after(&tx, Duration::from_millis(100), Fired);
        handle.cancel();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slot_rejects_superseded_token() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut slot = TimerSlot::new();

        let first = schedule_after(&tx, Duration::from_millis(100), Fired);
        let stale = first.token();
        slot.arm(first);
        let second = schedule_after(&tx, Duration::from_millis(100), Fired);
        let fresh = second.token();
        slot.arm(second);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(rx.try_recv().unwrap(), Fired(fresh));
        assert!(rx.try_recv().is_err());

        assert!(!slot.fire(stale));
        assert!(slot.is_armed());
        assert!(slot.fire(fresh));
        assert!(!slot.is_armed());
    }
}
