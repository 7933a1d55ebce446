//! Focus sessions — a timed block of work with a spoken wrap-up.

use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};

use super::TaskHandle;
use crate::kibo::Kibo;
use crate::types::*;

/// Longer requests are capped to a day.
const MAX_FOCUS_MINUTES: u64 = 24 * 60;

impl Kibo {
    /// Start (or replace) the focus session. Ignored while deactivated.
    pub async fn start_focus_session(&self, task: &str, minutes: u64) {
        let task = task.trim();
        let minutes = minutes.min(MAX_FOCUS_MINUTES);
        let end = Utc::now() + chrono::Duration::minutes(minutes as i64);

        if !self.read(|s| s.is_kibo_active) {
            debug!("Inactive, not starting focus session: {}", task);
            return;
        }
        self.inner.timers.focus.cancel();
        let started = self.update(|s| {
            if s.is_kibo_active {
                s.start_focus(task, end);
            }
            s.is_kibo_active
        });
        if !started {
            return;
        }
        self.broadcast_focus();
        info!("Focus session: {} for {} min", task, minutes);

        let weak = self.downgrade();
        self.inner.timers.focus.arm(TaskHandle::spawn(async move {
            tokio::time::sleep(Duration::from_secs(minutes * 60)).await;
            if let Some(kibo) = weak.upgrade() {
                kibo.complete_focus_session().await;
            }
        }));

        self.speak(
            &format!(
                "Focus mode on: {} for {} minutes. You've got this.",
                task, minutes
            ),
            Mood::Calm,
        )
        .await;
    }

    /// True while a focus session's expiry is scheduled.
    pub fn focus_timer_armed(&self) -> bool {
        self.inner.timers.focus.is_armed()
    }

    /// End the session early without the wrap-up.
    pub fn cancel_focus_session(&self) {
        self.inner.timers.focus.cancel();
        if self.update(|s| s.clear_focus()).is_some() {
            info!("Focus session cancelled");
            self.broadcast_focus();
        }
    }

    pub(crate) async fn complete_focus_session(&self) {
        let Some(session) = self.update(|s| s.clear_focus()) else {
            return;
        };
        info!("Focus session complete: {}", session.task);
        self.broadcast_focus();
        self.notify(
            NotificationKind::Info,
            format!("Focus session complete: {}", session.task),
        );
        self.speak(
            &format!("Time's up! Great work on {}.", session.task),
            Mood::Happy,
        )
        .await;
    }
}
