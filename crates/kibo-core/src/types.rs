//! Core types — Status, Mood, Voice, Message, Reminder, Notification, etc.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Status ──

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Idle,
    Listening,
    Thinking,
    Speaking,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Idle => write!(f, "idle"),
            Status::Listening => write!(f, "listening"),
            Status::Thinking => write!(f, "thinking"),
            Status::Speaking => write!(f, "speaking"),
        }
    }
}

// ── Mood ──

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    #[default]
    Neutral,
    Happy,
    Sad,
    Excited,
    Surprised,
    Angry,
    Curious,
    Calm,
}

impl Mood {
    pub const ALL: &'static [Mood] = &[
        Mood::Neutral,
        Mood::Happy,
        Mood::Sad,
        Mood::Excited,
        Mood::Surprised,
        Mood::Angry,
        Mood::Curious,
        Mood::Calm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Neutral => "neutral",
            Mood::Happy => "happy",
            Mood::Sad => "sad",
            Mood::Excited => "excited",
            Mood::Surprised => "surprised",
            Mood::Angry => "angry",
            Mood::Curious => "curious",
            Mood::Calm => "calm",
        }
    }

    /// Pull a mood tag out of free-form model output. Falls back to neutral.
    pub fn parse_lenient(raw: &str) -> Mood {
        first_known(raw, Mood::ALL, Mood::as_str).unwrap_or_default()
    }
}

impl std::fmt::Display for Mood {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Voice ──

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Voice {
    #[default]
    Zephyr,
    Puck,
    Charon,
    Kore,
    Fenrir,
}

impl Voice {
    pub const ALL: &'static [Voice] = &[
        Voice::Zephyr,
        Voice::Puck,
        Voice::Charon,
        Voice::Kore,
        Voice::Fenrir,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Voice::Zephyr => "Zephyr",
            Voice::Puck => "Puck",
            Voice::Charon => "Charon",
            Voice::Kore => "Kore",
            Voice::Fenrir => "Fenrir",
        }
    }

    /// Pull a voice id out of free-form model output. Falls back to the default voice.
    pub fn parse_lenient(raw: &str) -> Voice {
        first_known(raw, Voice::ALL, Voice::as_str).unwrap_or_default()
    }
}

/// Return the known value whose name appears earliest in `raw` (case-insensitive, whole word).
fn first_known<T: Copy>(raw: &str, all: &[T], name: fn(&T) -> &'static str) -> Option<T> {
    let lowered = raw.to_lowercase();
    lowered
        .split(|c: char| !c.is_ascii_alphabetic())
        .filter(|w| !w.is_empty())
        .find_map(|word| all.iter().find(|v| name(*v).eq_ignore_ascii_case(word)).copied())
}

// ── Persona / presentation ──

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvatarStyle {
    #[default]
    Abstract,
    AnimeGirl,
    MuzanPreset,
    GojoPreset,
    Generated,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnimationPack {
    #[default]
    Classic,
    Playful,
    Minimal,
}

// ── Conversation ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessagePart {
    Text { text: String },
    Image { mime: String, data_url: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub uri: String,
    pub title: String,
}

/// One transcript entry. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub parts: Vec<MessagePart>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Source>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, parts: Vec<MessagePart>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            parts,
            sources: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn model_text(text: impl Into<String>) -> Self {
        Self::new(Role::Model, vec![MessagePart::Text { text: text.into() }])
    }

    pub fn with_sources(mut self, sources: Vec<Source>) -> Self {
        self.sources = sources;
        self
    }

    /// All text parts joined with newlines.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                MessagePart::Text { text } => Some(text.as_str()),
                MessagePart::Image { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ── Productivity ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: String,
    pub task: String,
    pub due_time: DateTime<Utc>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Reminder {
    pub fn new(task: impl Into<String>, due_time: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            task: task.into(),
            due_time,
            completed: false,
            completed_at: None,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.completed && now >= self.due_time
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnedFact {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodEntry {
    pub mood: Mood,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusSession {
    pub task: String,
    pub end_time: DateTime<Utc>,
}

// ── Notifications and reactions ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Reminder,
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: u64,
    pub kind: NotificationKind,
    pub message: String,
}

/// Short avatar animations triggered by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reaction {
    Attention,
    Acknowledge,
    Surprised,
}

// ── Binary payloads ──

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl ImageData {
    pub fn data_url(&self) -> String {
        use base64::Engine;
        let b64 = base64::engine::general_purpose::STANDARD.encode(&self.bytes);
        format!("data:{};base64,{}", self.mime, b64)
    }
}

/// A file handed to the dispatch pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mood_parse_lenient() {
        assert_eq!(Mood::parse_lenient("happy"), Mood::Happy);
        assert_eq!(Mood::parse_lenient("  The user seems SAD.\n"), Mood::Sad);
        assert_eq!(Mood::parse_lenient("{\"mood\": \"curious\"}"), Mood::Curious);
        assert_eq!(Mood::parse_lenient("no idea"), Mood::Neutral);
        assert_eq!(Mood::parse_lenient(""), Mood::Neutral);
    }

    #[test]
    fn test_voice_parse_lenient() {
        assert_eq!(Voice::parse_lenient("Charon"), Voice::Charon);
        assert_eq!(Voice::parse_lenient("I'd pick fenrir for this one"), Voice::Fenrir);
        assert_eq!(Voice::parse_lenient("baritone"), Voice::Zephyr);
    }

    #[test]
    fn test_reminder_due() {
        let now = Utc::now();
        let mut r = Reminder::new("stretch", now);
        assert!(r.is_due(now));
        assert!(!r.is_due(now - chrono::Duration::seconds(1)));
        r.completed = true;
        assert!(!r.is_due(now));
    }

    #[test]
    fn test_message_text_skips_images() {
        let msg = Message::new(
            Role::User,
            vec![
                MessagePart::Text { text: "look".into() },
                MessagePart::Image {
                    mime: "image/png".into(),
                    data_url: "data:image/png;base64,AA==".into(),
                },
                MessagePart::Text { text: "at this".into() },
            ],
        );
        assert_eq!(msg.text(), "look\nat this");
    }
}
