//! Reminder poller — alerts for every overdue, incomplete reminder on each tick.

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use tokio::time::MissedTickBehavior;
use tracing::info;

use super::TaskHandle;
use crate::kibo::Kibo;
use crate::types::*;

impl Kibo {
    pub(crate) fn arm_reminder_poll(&self) {
        let weak = self.downgrade();
        let period = self.config().reminder_poll();
        self.inner.timers.reminder_poll.arm(TaskHandle::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(kibo) = weak.upgrade() else { break };
                kibo.fire_due_reminders(Utc::now()).await;
            }
        }));
    }

    /// Notify and speak for each reminder due at `now`. A reminder keeps
    /// firing on every poll until it is completed. Returns how many fired.
    pub async fn fire_due_reminders(&self, now: DateTime<Utc>) -> usize {
        let due = self.read(|s| {
            if s.is_kibo_active {
                s.due_reminders(now)
            } else {
                Vec::new()
            }
        });
        for reminder in &due {
            info!("Reminder due: {}", reminder.task);
            self.notify(
                NotificationKind::Reminder,
                format!("Reminder: {}", reminder.task),
            );
            self.speak(&alert_line(&reminder.task), Mood::Excited).await;
        }
        due.len()
    }
}

const ALERT_OPENERS: &[&str] = &["Hey!", "Psst!", "Heads up!", "Don't forget!"];

fn alert_line(task: &str) -> String {
    let opener = ALERT_OPENERS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("Hey!");
    format!("{} Time to {}.", opener, task)
}
