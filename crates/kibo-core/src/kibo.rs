//! Kibo — the coordinator that owns the session and every workflow around it.
//!
//! A `Kibo` is a cheap handle; clones share one session. Background tasks
//! hold a [`WeakKibo`] so dropping the last handle winds everything down.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};

use crate::capabilities::{AiCapabilities, PersonaContext};
use crate::config::Config;
use crate::devices::{AudioBackend, Devices};
use crate::events::{FocusData, KiboEvent, StatusData};
use crate::prompts::{CONVERSATION_SUMMARY_INSTRUCTION, MOOD_REPORT_INSTRUCTION};
use crate::schedulers::{TaskHandle, Timers};
use crate::speech::SpeechOutput;
use crate::state::SessionState;
use crate::storage::KeyValueStore;
use crate::store::SessionStore;
use crate::types::*;

pub(crate) struct Inner {
    pub(crate) config: Config,
    pub(crate) store: SessionStore,
    pub(crate) ai: Arc<dyn AiCapabilities>,
    pub(crate) devices: Arc<dyn Devices>,
    pub(crate) speech: SpeechOutput,
    pub(crate) timers: Timers,
    events: broadcast::Sender<KiboEvent>,
    notification_seq: AtomicU64,
}

#[derive(Clone)]
pub struct Kibo {
    pub(crate) inner: Arc<Inner>,
}

/// Non-owning handle for background tasks.
#[derive(Clone)]
pub struct WeakKibo(Weak<Inner>);

impl WeakKibo {
    pub fn upgrade(&self) -> Option<Kibo> {
        self.0.upgrade().map(|inner| Kibo { inner })
    }
}

impl Kibo {
    pub fn new(
        config: Config,
        storage: Arc<dyn KeyValueStore>,
        ai: Arc<dyn AiCapabilities>,
        devices: Arc<dyn Devices>,
        audio: Arc<dyn AudioBackend>,
    ) -> Self {
        let store = SessionStore::load(storage, &config.default_language);
        let (events, _) = broadcast::channel(256);

        Self {
            inner: Arc::new(Inner {
                config,
                store,
                ai,
                devices,
                speech: SpeechOutput::new(audio),
                timers: Timers::default(),
                events,
                notification_seq: AtomicU64::new(1),
            }),
        }
    }

    /// Arm the background workflows the restored state calls for.
    pub fn start(&self) {
        let (active, proactive) = self.read(|s| (s.is_kibo_active, s.is_proactive_mode));
        info!("Kibo starting (active: {}, proactive: {})", active, proactive);
        if active {
            self.start_activity();
        }
    }

    /// Cancel every scheduled task.
    pub fn shutdown(&self) {
        info!("Kibo shutting down");
        self.inner.timers.cancel_all();
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn state(&self) -> SessionState {
        self.inner.store.get()
    }

    pub fn store(&self) -> &SessionStore {
        &self.inner.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<KiboEvent> {
        self.inner.events.subscribe()
    }

    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.inner.store.subscribe()
    }

    pub fn downgrade(&self) -> WeakKibo {
        WeakKibo(Arc::downgrade(&self.inner))
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&SessionState) -> R) -> R {
        self.inner.store.read(f)
    }

    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        self.inner.store.update(f)
    }

    pub(crate) fn ai(&self) -> Arc<dyn AiCapabilities> {
        self.inner.ai.clone()
    }

    pub(crate) fn broadcast(&self, event: KiboEvent) {
        let _ = self.inner.events.send(event);
    }

    pub(crate) fn broadcast_status(&self) {
        let data = self.read(|s| StatusData {
            status: s.status,
            mood: s.mood,
            is_loading: s.is_loading,
        });
        self.broadcast(KiboEvent::Status(data));
    }

    pub(crate) fn broadcast_focus(&self) {
        let data = self.read(|s| FocusData {
            active: s.is_focus_mode_active(),
            task: s.focus_session_task().map(String::from),
            end_time: s.focus_session_end_time(),
        });
        self.broadcast(KiboEvent::Focus(data));
    }

    pub(crate) fn persona_context(state: &SessionState) -> PersonaContext {
        PersonaContext {
            name: state
                .current_character_name
                .clone()
                .unwrap_or_else(|| "Kibo".to_string()),
            style: state.avatar_style,
        }
    }

    // ── Surface ──

    /// Show a notification, replacing whatever occupied the slot.
    pub fn notify(&self, kind: NotificationKind, message: impl Into<String>) {
        let notification = Notification {
            id: self.inner.notification_seq.fetch_add(1, Ordering::Relaxed),
            kind,
            message: message.into(),
        };
        let id = notification.id;
        match kind {
            NotificationKind::Error => warn!("[notify] {}", notification.message),
            _ => info!("[notify] {}", notification.message),
        }
        self.update(|s| s.notification = Some(notification.clone()));
        self.broadcast(KiboEvent::Notification(notification));

        let weak = self.downgrade();
        let timeout = self.inner.config.notification_timeout();
        self.inner.timers.notification.arm(TaskHandle::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(kibo) = weak.upgrade() {
                kibo.clear_notification(Some(id));
            }
        }));
    }

    pub fn dismiss_notification(&self) {
        self.inner.timers.notification.cancel();
        self.clear_notification(None);
    }

    /// Empty the slot, but only if it still holds `id` (any id when None).
    fn clear_notification(&self, id: Option<u64>) {
        let cleared = self.update(|s| {
            let matches = match (&s.notification, id) {
                (Some(n), Some(id)) => n.id == id,
                (Some(_), None) => true,
                (None, _) => false,
            };
            if matches {
                s.notification = None;
            }
            matches
        });
        if cleared {
            self.broadcast(KiboEvent::NotificationCleared);
        }
    }

    /// Play a short avatar reaction; it clears itself.
    pub fn react(&self, reaction: Reaction) {
        self.update(|s| s.reaction = Some(reaction));
        self.broadcast(KiboEvent::Reaction(reaction));

        let weak = self.downgrade();
        let duration = self.inner.config.reaction_duration();
        self.inner.timers.reaction.arm(TaskHandle::spawn(async move {
            tokio::time::sleep(duration).await;
            if let Some(kibo) = weak.upgrade() {
                kibo.update(|s| {
                    if s.reaction == Some(reaction) {
                        s.reaction = None;
                    }
                });
            }
        }));
    }

    pub(crate) fn append_message(&self, message: Message) {
        self.update(|s| s.push_message(message.clone()));
        self.broadcast(KiboEvent::Message(message));
    }

    pub(crate) fn set_status(&self, status: Status) {
        self.update(|s| s.status = status);
        self.broadcast_status();
    }

    pub fn clear_conversation(&self) {
        self.update(|s| s.messages.clear());
        info!("Conversation cleared");
    }

    // ── Preferences ──

    /// Turning the assistant off ends focus, stops listening, and cancels every timer.
    pub async fn set_active(&self, active: bool) {
        let was_active = self.read(|s| s.is_kibo_active);
        if active == was_active {
            return;
        }

        if active {
            self.update(|s| s.is_kibo_active = true);
            info!("Kibo activated");
            self.start_activity();
        } else {
            let had_focus = self.read(|s| s.is_focus_mode_active());
            let was_listening = self.read(|s| s.status == Status::Listening);
            self.inner.timers.cancel_activity();
            if was_listening {
                self.inner.devices.stop_voice().await;
                self.broadcast(KiboEvent::Listening { active: false });
            }
            self.update(|s| s.deactivate());
            info!("Kibo deactivated");
            if had_focus {
                self.broadcast_focus();
            }
            self.broadcast_status();
        }
    }

    fn start_activity(&self) {
        self.arm_reminder_poll();
        self.arm_transcript_watch();
        self.restart_idle_timer();
        if self.read(|s| s.is_proactive_mode) {
            self.arm_proactive_poll();
        }
    }

    pub fn set_proactive_mode(&self, enabled: bool) {
        let active = self.update(|s| {
            s.is_proactive_mode = enabled;
            s.is_kibo_active
        });
        info!("Proactive mode {}", if enabled { "on" } else { "off" });
        if enabled && active {
            self.arm_proactive_poll();
        } else {
            self.inner.timers.proactive.cancel();
        }
    }

    pub fn set_floating_mode(&self, enabled: bool) {
        self.update(|s| s.is_floating_mode = enabled);
    }

    /// The user's own language choice; it also becomes the active language.
    pub fn set_language(&self, language: &str) {
        self.update(|s| {
            s.user_preferred_language = language.to_string();
            s.language = language.to_string();
        });
        info!("Language set to {}", language);
    }

    pub fn set_voice(&self, voice: Voice) {
        self.update(|s| s.voice = voice);
    }

    pub fn set_animation_pack(&self, pack: AnimationPack) {
        self.update(|s| s.animation_pack = pack);
    }

    // ── Reminders ──

    pub fn add_reminder(&self, task: &str, due_time: DateTime<Utc>) -> Reminder {
        let reminder = Reminder::new(task, due_time);
        self.update(|s| s.add_reminder(reminder.clone()));
        info!("Reminder added: {} at {}", reminder.task, reminder.due_time);
        reminder
    }

    /// Returns the new completion flag, or None for an unknown id.
    pub fn toggle_reminder(&self, id: &str) -> Option<bool> {
        self.update(|s| s.toggle_reminder(id, Utc::now()))
    }

    /// Ask the model to rank incomplete reminders. The stored order is never
    /// changed; the ranking is returned for display.
    pub async fn prioritize_reminders(&self) -> Vec<Reminder> {
        let pending: Vec<Reminder> = self.read(|s| {
            s.reminders
                .iter()
                .filter(|r| !r.completed)
                .cloned()
                .collect()
        });
        if pending.len() < 2 {
            return pending;
        }

        let tasks: Vec<(String, String)> = pending
            .iter()
            .map(|r| (r.id.clone(), r.task.clone()))
            .collect();
        match self.inner.ai.prioritize_tasks(&tasks).await {
            Ok(order) => apply_priority(pending, &order),
            Err(e) => {
                error!("Prioritizing reminders failed: {}", e);
                self.notify(NotificationKind::Error, "I couldn't prioritize your tasks right now.");
                pending
            }
        }
    }

    // ── Reports ──

    /// A short report on how the user's mood has been trending.
    pub async fn mood_report(&self) -> Option<String> {
        let (history, language) = self.read(|s| (s.mood_history.clone(), s.language.clone()));
        if history.is_empty() {
            self.notify(NotificationKind::Info, "No mood history yet.");
            return None;
        }
        let content = history
            .iter()
            .map(|e| format!("{} {}", e.timestamp.to_rfc3339(), e.mood))
            .collect::<Vec<_>>()
            .join("\n");
        self.summarize_into_transcript(&content, MOOD_REPORT_INSTRUCTION, &language)
            .await
    }

    pub async fn summarize_conversation(&self) -> Option<String> {
        let (messages, language) = self.read(|s| (s.messages.clone(), s.language.clone()));
        if messages.is_empty() {
            self.notify(NotificationKind::Info, "There's nothing to summarize yet.");
            return None;
        }
        let content = messages
            .iter()
            .map(|m| {
                let who = match m.role {
                    Role::User => "User",
                    Role::Model => "Kibo",
                };
                format!("{}: {}", who, m.text())
            })
            .collect::<Vec<_>>()
            .join("\n");
        self.summarize_into_transcript(&content, CONVERSATION_SUMMARY_INSTRUCTION, &language)
            .await
    }

    async fn summarize_into_transcript(
        &self,
        content: &str,
        instruction: &str,
        language: &str,
    ) -> Option<String> {
        match self.inner.ai.summarize(content, instruction, language).await {
            Ok(text) if !text.trim().is_empty() => {
                self.append_message(Message::model_text(text.clone()));
                Some(text)
            }
            Ok(_) => None,
            Err(e) => {
                error!("Summary failed: {}", e);
                self.notify(NotificationKind::Error, "I couldn't put that summary together.");
                None
            }
        }
    }

    /// Summarize whatever is on the clipboard through the normal pipeline.
    pub async fn summarize_clipboard(&self) {
        match self.inner.devices.read_clipboard().await {
            Ok(text) if !text.trim().is_empty() => {
                let file = Attachment {
                    name: "clipboard.txt".to_string(),
                    mime: "text/plain".to_string(),
                    bytes: text.into_bytes(),
                };
                self.dispatch(None, Some(file)).await;
            }
            Ok(_) => self.notify(NotificationKind::Info, "The clipboard is empty."),
            Err(e) => {
                warn!("Clipboard read failed: {}", e);
                self.notify(NotificationKind::Error, e.user_message("clipboard"));
            }
        }
    }

    /// Capture the screen and ask about it through the normal pipeline.
    pub async fn ask_about_screen(&self, prompt: &str) {
        match self.inner.devices.capture_screen().await {
            Ok(image) => {
                let ext = image.mime.rsplit('/').next().unwrap_or("png").to_string();
                let file = Attachment {
                    name: format!("screen.{}", ext),
                    mime: image.mime,
                    bytes: image.bytes,
                };
                let prompt = Some(prompt.to_string()).filter(|p| !p.trim().is_empty());
                self.dispatch(prompt, Some(file)).await;
            }
            Err(e) => {
                warn!("Screen capture failed: {}", e);
                self.notify(NotificationKind::Error, e.user_message("screen recording"));
            }
        }
    }
}

/// Reorder `pending` by `order`. Unknown ids are ignored; reminders the
/// order leaves out keep their relative order at the end.
pub fn apply_priority(pending: Vec<Reminder>, order: &[String]) -> Vec<Reminder> {
    let mut remaining = pending;
    let mut ranked = Vec::with_capacity(remaining.len());
    for id in order {
        if let Some(pos) = remaining.iter().position(|r| &r.id == id) {
            ranked.push(remaining.remove(pos));
        }
    }
    ranked.extend(remaining);
    ranked
}
