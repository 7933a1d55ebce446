//! Timer-driven workflows. Every scheduled task lives in a [`TimerSlot`];
//! arming a slot replaces (and aborts) whatever it held, and every path that
//! enables a feature has a matching path that cancels its slot.

pub mod focus;
pub mod idle;
pub mod proactive;
pub mod reminders;

use std::future::Future;
use std::sync::Mutex;

use tokio::task::JoinHandle;

/// A spawned task that is aborted when dropped.
pub struct TaskHandle(JoinHandle<()>);

impl TaskHandle {
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self(tokio::spawn(future))
    }

    pub fn is_finished(&self) -> bool {
        self.0.is_finished()
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Holds at most one scheduled task.
#[derive(Default)]
pub struct TimerSlot(Mutex<Option<TaskHandle>>);

impl TimerSlot {
    pub fn arm(&self, handle: TaskHandle) {
        let previous = self.lock().replace(handle);
        drop(previous);
    }

    pub fn cancel(&self) {
        let previous = self.lock().take();
        drop(previous);
    }

    /// True while a task is scheduled and has not finished.
    pub fn is_armed(&self) -> bool {
        self.lock().as_ref().is_some_and(|h| !h.is_finished())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<TaskHandle>> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Default)]
pub struct Timers {
    pub reminder_poll: TimerSlot,
    pub transcript_watch: TimerSlot,
    pub idle: TimerSlot,
    pub proactive: TimerSlot,
    pub focus: TimerSlot,
    pub voice: TimerSlot,
    pub notification: TimerSlot,
    pub reaction: TimerSlot,
}

impl Timers {
    /// Everything that only runs while the assistant is active.
    pub fn cancel_activity(&self) {
        self.reminder_poll.cancel();
        self.transcript_watch.cancel();
        self.idle.cancel();
        self.proactive.cancel();
        self.focus.cancel();
        self.voice.cancel();
    }

    pub fn cancel_all(&self) {
        self.cancel_activity();
        self.notification.cancel();
        self.reaction.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let fired = Arc::new(AtomicBool::new(false));
        let slot = TimerSlot::default();
        let f = fired.clone();
        slot.arm(TaskHandle::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            f.store(true, Ordering::SeqCst);
        }));
        assert!(slot.is_armed());

        slot.cancel();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!fired.load(Ordering::SeqCst));
        assert!(!slot.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_previous() {
        let first = Arc::new(AtomicBool::new(false));
        let second = Arc::new(AtomicBool::new(false));
        let slot = TimerSlot::default();

        let f = first.clone();
        slot.arm(TaskHandle::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            f.store(true, Ordering::SeqCst);
        }));
        let s = second.clone();
        slot.arm(TaskHandle::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            s.store(true, Ordering::SeqCst);
        }));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(!first.load(Ordering::SeqCst));
        assert!(second.load(Ordering::SeqCst));
    }
}
