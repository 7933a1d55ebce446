//! KiboEvent enum — broadcast from the companion to frontends via tokio::broadcast.

use serde::{Deserialize, Serialize};

use crate::types::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusData {
    pub status: Status,
    pub mood: Mood,
    pub is_loading: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioData {
    pub text: String,
    pub mood: Mood,
    pub voice: Voice,
    /// Base64 PCM, 24 kHz 16-bit mono.
    pub pcm: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaData {
    pub style: AvatarStyle,
    pub voice: Voice,
    pub name: Option<String>,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FocusData {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
}

/// Events broadcast to all subscribers (WebSocket clients, tests).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum KiboEvent {
    /// A message was appended to the transcript
    #[serde(rename = "message")]
    Message(Message),

    /// Status, mood, or loading flag changed
    #[serde(rename = "status")]
    Status(StatusData),

    /// A notification took the slot
    #[serde(rename = "notification")]
    Notification(Notification),

    /// The notification slot was emptied
    #[serde(rename = "notification_cleared")]
    NotificationCleared,

    /// Brief avatar reaction
    #[serde(rename = "reaction")]
    Reaction(Reaction),

    /// Synthesized speech for clients that play audio themselves
    #[serde(rename = "audio")]
    Audio(AudioData),

    /// Persona (style/voice/name/language) changed
    #[serde(rename = "persona")]
    Persona(PersonaData),

    /// Focus session started or ended
    #[serde(rename = "focus")]
    Focus(FocusData),

    /// Voice input started or stopped
    #[serde(rename = "listening")]
    Listening { active: bool },
}

impl KiboEvent {
    /// Serialize to the JSON format the frontend expects:
    /// `{"event": "...", "data": {...}}`
    pub fn to_ws_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}
