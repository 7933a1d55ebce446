//! Proactive mode — periodically look at the screen and offer a suggestion.

use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use super::TaskHandle;
use crate::capabilities::NO_SUGGESTION;
use crate::kibo::Kibo;
use crate::types::*;

impl Kibo {
    pub(crate) fn arm_proactive_poll(&self) {
        let weak = self.downgrade();
        let period = self.config().proactive_poll();
        self.inner.timers.proactive.arm(TaskHandle::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(kibo) = weak.upgrade() else { break };
                if !kibo.proactive_tick().await {
                    break;
                }
            }
        }));
    }

    /// One poll. Returns false once proactive mode is off, including when
    /// this poll turned it off after a failure.
    pub async fn proactive_tick(&self) -> bool {
        let (enabled, busy, language) =
            self.read(|s| (s.is_proactive_mode && s.is_kibo_active, s.is_busy(), s.language.clone()));
        if !enabled {
            return false;
        }
        if busy {
            debug!("Busy, skipping proactive check");
            return true;
        }

        let screen = match self.inner.devices.capture_screen().await {
            Ok(screen) => screen,
            Err(e) => {
                error!("Screen capture failed: {}", e);
                self.disable_proactive(e.user_message("screen recording"));
                return false;
            }
        };

        match self.ai().proactive_suggestion(&screen, &language).await {
            Ok(text) => {
                let text = text.trim();
                if text.is_empty() || text.contains(NO_SUGGESTION) {
                    debug!("Nothing to suggest");
                    return true;
                }
                info!("Proactive suggestion: {}", text);
                self.append_message(Message::model_text(text));
                self.speak(text, Mood::Curious).await;
                true
            }
            Err(e) => {
                error!("Proactive suggestion failed: {}", e);
                self.disable_proactive(format!("I couldn't check your screen: {}", e));
                false
            }
        }
    }

    fn disable_proactive(&self, reason: String) {
        self.update(|s| s.is_proactive_mode = false);
        self.notify(
            NotificationKind::Error,
            format!("{} Proactive mode is now off.", reason),
        );
    }
}
