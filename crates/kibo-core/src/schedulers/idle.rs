//! Idle prompting — a light remark after a stretch of silence.

use tracing::{debug, warn};

use super::TaskHandle;
use crate::kibo::Kibo;
use crate::state::SessionState;
use crate::types::*;

/// Changes whenever a message is appended or the transcript is cleared.
fn transcript_marker(state: &SessionState) -> (usize, Option<String>) {
    (
        state.messages.len(),
        state.messages.last().map(|m| m.id.clone()),
    )
}

impl Kibo {
    /// Restart the idle countdown on every transcript change.
    pub(crate) fn arm_transcript_watch(&self) {
        let weak = self.downgrade();
        let mut rx = self.watch();
        self.inner.timers.transcript_watch.arm(TaskHandle::spawn(async move {
            let mut seen = transcript_marker(&rx.borrow_and_update());
            while rx.changed().await.is_ok() {
                let marker = transcript_marker(&rx.borrow_and_update());
                if marker == seen {
                    continue;
                }
                seen = marker;
                let Some(kibo) = weak.upgrade() else { break };
                kibo.restart_idle_timer();
            }
        }));
    }

    pub(crate) fn restart_idle_timer(&self) {
        if !self.read(|s| s.is_kibo_active) {
            return;
        }
        let weak = self.downgrade();
        let delay = self.config().idle_prompt();
        self.inner.timers.idle.arm(TaskHandle::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(kibo) = weak.upgrade() {
                // The remark appends a message, which re-arms this slot.
                tokio::spawn(async move { kibo.idle_remark().await });
            }
        }));
    }

    /// Offer a fun fact, but only when nothing else is going on.
    pub async fn idle_remark(&self) {
        let Some((language, persona)) = self.read(|s| {
            (s.is_kibo_active && !s.is_busy())
                .then(|| (s.language.clone(), Kibo::persona_context(s)))
        }) else {
            debug!("Busy, skipping idle remark");
            return;
        };

        match self.ai().fun_fact(&language, &persona).await {
            Ok(text) if !text.trim().is_empty() => {
                self.append_message(Message::model_text(text.clone()));
                self.speak(&text, Mood::Happy).await;
            }
            Ok(_) => {}
            Err(e) => warn!("Idle remark failed: {}", e),
        }
    }
}
