//! SessionState — the single aggregate behind every view of the companion.
//!
//! All mutation goes through [`crate::store::SessionStore::update`]; the
//! methods here are the transitions those updates are built from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::*;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub messages: Vec<Message>,
    pub status: Status,
    pub mood: Mood,
    pub mood_history: Vec<MoodEntry>,
    pub reminders: Vec<Reminder>,
    pub learned_facts: Vec<LearnedFact>,

    /// Active language; a persona may override it.
    pub language: String,
    /// The user's own choice, restored when a persona releases the override.
    pub user_preferred_language: String,

    pub voice: Voice,
    pub animation_pack: AnimationPack,
    pub avatar_style: AvatarStyle,
    pub generated_avatar_url: Option<String>,
    pub current_character_name: Option<String>,

    pub is_proactive_mode: bool,
    pub is_kibo_active: bool,
    pub is_floating_mode: bool,

    /// Present exactly while a focus session runs.
    pub focus: Option<FocusSession>,

    /// True while a dispatch-pipeline request is in flight.
    pub is_loading: bool,

    pub notification: Option<Notification>,
    pub reaction: Option<Reaction>,

    /// Bumped by every reminder transition, so persistence can spot
    /// in-place changes without comparing the list.
    #[serde(skip)]
    reminders_revision: u64,
}

impl SessionState {
    pub fn new(language: &str) -> Self {
        Self {
            messages: Vec::new(),
            status: Status::Idle,
            mood: Mood::Neutral,
            mood_history: Vec::new(),
            reminders: Vec::new(),
            learned_facts: Vec::new(),
            language: language.to_string(),
            user_preferred_language: language.to_string(),
            voice: Voice::default(),
            animation_pack: AnimationPack::default(),
            avatar_style: AvatarStyle::default(),
            generated_avatar_url: None,
            current_character_name: None,
            is_proactive_mode: false,
            is_kibo_active: true,
            is_floating_mode: false,
            focus: None,
            is_loading: false,
            notification: None,
            reaction: None,
            reminders_revision: 0,
        }
    }

    // ── Focus session ──

    pub fn is_focus_mode_active(&self) -> bool {
        self.focus.is_some()
    }

    pub fn focus_session_end_time(&self) -> Option<DateTime<Utc>> {
        self.focus.as_ref().map(|f| f.end_time)
    }

    pub fn focus_session_task(&self) -> Option<&str> {
        self.focus.as_ref().map(|f| f.task.as_str())
    }

    /// Replaces any running session.
    pub fn start_focus(&mut self, task: &str, end_time: DateTime<Utc>) {
        self.focus = Some(FocusSession {
            task: task.to_string(),
            end_time,
        });
    }

    pub fn clear_focus(&mut self) -> Option<FocusSession> {
        self.focus.take()
    }

    /// Turning the assistant off also ends any focus session.
    pub fn deactivate(&mut self) {
        self.is_kibo_active = false;
        self.focus = None;
        self.status = Status::Idle;
    }

    // ── Conversation ──

    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// The last `n` messages, oldest first.
    pub fn recent_messages(&self, n: usize) -> Vec<Message> {
        let start = self.messages.len().saturating_sub(n);
        self.messages[start..].to_vec()
    }

    pub fn record_mood(&mut self, mood: Mood, at: DateTime<Utc>) {
        self.mood = mood;
        self.mood_history.push(MoodEntry {
            mood,
            timestamp: at,
        });
    }

    pub fn is_busy(&self) -> bool {
        self.is_loading || self.status != Status::Idle
    }

    // ── Reminders and facts ──

    /// Returns false and leaves the set unchanged when the id is already taken.
    pub fn add_reminder(&mut self, reminder: Reminder) -> bool {
        if self.reminders.iter().any(|r| r.id == reminder.id) {
            return false;
        }
        self.reminders.push(reminder);
        self.reminders_revision += 1;
        true
    }

    /// Flips completion. Returns the new completion flag, or None for an unknown id.
    pub fn toggle_reminder(&mut self, id: &str, now: DateTime<Utc>) -> Option<bool> {
        let reminder = self.reminders.iter_mut().find(|r| r.id == id)?;
        reminder.completed = !reminder.completed;
        reminder.completed_at = reminder.completed.then_some(now);
        let completed = reminder.completed;
        self.reminders_revision += 1;
        Some(completed)
    }

    pub fn due_reminders(&self, now: DateTime<Utc>) -> Vec<Reminder> {
        self.reminders
            .iter()
            .filter(|r| r.is_due(now))
            .cloned()
            .collect()
    }

    pub fn add_fact(&mut self, text: &str) -> LearnedFact {
        let fact = LearnedFact {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.to_string(),
        };
        self.learned_facts.push(fact.clone());
        fact
    }
}

// ── Persistence subset ──

pub const KEY_REMINDERS: &str = "reminders";
pub const KEY_VOICE: &str = "voice";
pub const KEY_ANIMATION_PACK: &str = "animation_pack";
pub const KEY_AVATAR_STYLE: &str = "avatar_style";
pub const KEY_PROACTIVE_MODE: &str = "proactive_mode";
pub const KEY_LEARNED_FACTS: &str = "learned_facts";
pub const KEY_MOOD_HISTORY: &str = "mood_history";
pub const KEY_KIBO_ACTIVE: &str = "kibo_active";
pub const KEY_FLOATING_MODE: &str = "floating_mode";

/// A cheap fingerprint of the fields that survive a restart. Mood history
/// and facts only ever grow, so their length is enough to spot a change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PersistedFields {
    reminders_revision: u64,
    reminders_len: usize,
    voice: Voice,
    animation_pack: AnimationPack,
    avatar_style: AvatarStyle,
    proactive_mode: bool,
    learned_facts_len: usize,
    mood_history_len: usize,
    kibo_active: bool,
    floating_mode: bool,
}

impl PersistedFields {
    pub fn from_state(state: &SessionState) -> Self {
        Self {
            reminders_revision: state.reminders_revision,
            reminders_len: state.reminders.len(),
            voice: state.voice,
            animation_pack: state.animation_pack,
            avatar_style: state.avatar_style,
            proactive_mode: state.is_proactive_mode,
            learned_facts_len: state.learned_facts.len(),
            mood_history_len: state.mood_history.len(),
            kibo_active: state.is_kibo_active,
            floating_mode: state.is_floating_mode,
        }
    }

    /// Keys that changed since `before`, with their current values from `state`.
    pub fn changed_entries(
        &self,
        before: &PersistedFields,
        state: &SessionState,
    ) -> Vec<(&'static str, serde_json::Value)> {
        let mut out = Vec::new();
        macro_rules! diff {
            ($key:expr, $changed:expr, $value:expr) => {
                if $changed {
                    match serde_json::to_value($value) {
                        Ok(v) => out.push(($key, v)),
                        Err(e) => tracing::error!("Failed to serialize {}: {}", $key, e),
                    }
                }
            };
        }
        diff!(
            KEY_REMINDERS,
            self.reminders_revision != before.reminders_revision
                || self.reminders_len != before.reminders_len,
            &state.reminders
        );
        diff!(KEY_VOICE, self.voice != before.voice, state.voice);
        diff!(
            KEY_ANIMATION_PACK,
            self.animation_pack != before.animation_pack,
            state.animation_pack
        );
        diff!(
            KEY_AVATAR_STYLE,
            self.avatar_style != before.avatar_style,
            state.avatar_style
        );
        diff!(
            KEY_PROACTIVE_MODE,
            self.proactive_mode != before.proactive_mode,
            state.is_proactive_mode
        );
        diff!(
            KEY_LEARNED_FACTS,
            self.learned_facts_len != before.learned_facts_len,
            &state.learned_facts
        );
        diff!(
            KEY_MOOD_HISTORY,
            self.mood_history_len != before.mood_history_len,
            &state.mood_history
        );
        diff!(
            KEY_KIBO_ACTIVE,
            self.kibo_active != before.kibo_active,
            state.is_kibo_active
        );
        diff!(
            KEY_FLOATING_MODE,
            self.floating_mode != before.floating_mode,
            state.is_floating_mode
        );
        out
    }
}
