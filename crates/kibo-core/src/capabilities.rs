//! The AI capability contract — everything the companion asks of the remote
//! generative service. Implementations live in [`crate::providers`]; tests
//! substitute recording fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::CapabilityError;
use crate::types::*;

/// Sentinel a proactive-suggestion call returns when it has nothing to say.
pub const NO_SUGGESTION: &str = "NO_SUGGESTION";

/// Who the assistant currently is, as seen by prompts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaContext {
    pub name: String,
    pub style: AvatarStyle,
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Oldest first.
    pub history: Vec<Message>,
    /// Extra instruction appended after the history (e.g. "confirm transformation").
    pub instruction: Option<String>,
    pub mood: Mood,
    pub language: String,
    pub persona: PersonaContext,
    pub facts: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatReply {
    pub text: String,
    pub directives: Vec<Directive>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WebAnswer {
    pub text: String,
    pub sources: Vec<Source>,
}

/// Side-effecting instruction returned alongside a conversational reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", content = "args", rename_all = "camelCase")]
pub enum Directive {
    ChangeCharacter { name: String },
    ExtractFact { fact: String },
    SetReminder { task: String, delay_seconds: u64 },
    StartFocusSession { task: String, duration_minutes: u64 },
    LaunchApplication { app_name: String },
}

impl Directive {
    pub const NAMES: &'static [&'static str] = &[
        "changeCharacter",
        "extractFact",
        "setReminder",
        "startFocusSession",
        "launchApplication",
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Directive::ChangeCharacter { .. } => "changeCharacter",
            Directive::ExtractFact { .. } => "extractFact",
            Directive::SetReminder { .. } => "setReminder",
            Directive::StartFocusSession { .. } => "startFocusSession",
            Directive::LaunchApplication { .. } => "launchApplication",
        }
    }

    /// Parse a function call into a directive. Unknown names or missing
    /// arguments yield None.
    pub fn from_call(name: &str, args: &Value) -> Option<Directive> {
        let text = |key: &str| {
            args.get(key)
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };
        // Models sometimes send numbers as strings.
        let number = |key: &str| {
            let v = args.get(key)?;
            v.as_u64()
                .or_else(|| v.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
                .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
        };

        match name {
            "changeCharacter" => Some(Directive::ChangeCharacter {
                name: text("characterName").or_else(|| text("name"))?,
            }),
            "extractFact" => Some(Directive::ExtractFact { fact: text("fact")? }),
            "setReminder" => Some(Directive::SetReminder {
                task: text("task")?,
                delay_seconds: number("delaySeconds")?,
            }),
            "startFocusSession" => Some(Directive::StartFocusSession {
                task: text("task")?,
                duration_minutes: number("durationMinutes")?,
            }),
            "launchApplication" => Some(Directive::LaunchApplication {
                app_name: text("appName")?,
            }),
            _ => None,
        }
    }
}

#[async_trait]
pub trait AiCapabilities: Send + Sync {
    /// Conversational reply with optional directives.
    async fn chat(&self, request: ChatRequest) -> Result<ChatReply, CapabilityError>;

    async fn describe_image(
        &self,
        image: &ImageData,
        prompt: &str,
        language: &str,
    ) -> Result<String, CapabilityError>;

    /// Answer grounded in web knowledge, with citations.
    async fn web_knowledge(&self, prompt: &str, language: &str)
        -> Result<WebAnswer, CapabilityError>;

    async fn detect_mood(&self, text: &str, language: &str) -> Result<Mood, CapabilityError>;

    /// Raw 24 kHz 16-bit mono PCM.
    async fn text_to_speech(
        &self,
        text: &str,
        mood: Mood,
        voice: Voice,
    ) -> Result<Vec<u8>, CapabilityError>;

    async fn generate_avatar(&self, character: &str) -> Result<ImageData, CapabilityError>;

    async fn infer_voice(&self, character: &str) -> Result<Voice, CapabilityError>;

    /// `tasks` are (id, description) pairs; returns ids in priority order.
    async fn prioritize_tasks(
        &self,
        tasks: &[(String, String)],
    ) -> Result<Vec<String>, CapabilityError>;

    async fn summarize(
        &self,
        content: &str,
        instruction: &str,
        language: &str,
    ) -> Result<String, CapabilityError>;

    /// A short unprompted remark for idle moments.
    async fn fun_fact(
        &self,
        language: &str,
        persona: &PersonaContext,
    ) -> Result<String, CapabilityError>;

    /// Returns [`NO_SUGGESTION`] or empty text when nothing is worth saying.
    async fn proactive_suggestion(
        &self,
        screen: &ImageData,
        language: &str,
    ) -> Result<String, CapabilityError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_call_set_reminder() {
        let d = Directive::from_call("setReminder", &json!({"task": "tea", "delaySeconds": 600}));
        assert_eq!(
            d,
            Some(Directive::SetReminder {
                task: "tea".into(),
                delay_seconds: 600
            })
        );
    }

    #[test]
    fn test_from_call_accepts_stringly_numbers() {
        let d = Directive::from_call(
            "startFocusSession",
            &json!({"task": "essay", "durationMinutes": "25"}),
        );
        assert_eq!(
            d,
            Some(Directive::StartFocusSession {
                task: "essay".into(),
                duration_minutes: 25
            })
        );
    }

    #[test]
    fn test_from_call_rejects_missing_args() {
        assert!(Directive::from_call("extractFact", &json!({})).is_none());
        assert!(Directive::from_call("setReminder", &json!({"task": "x"})).is_none());
        assert!(Directive::from_call("launchRocket", &json!({"appName": "x"})).is_none());
    }

    #[test]
    fn test_names_match_variants() {
        let all = [
            Directive::ChangeCharacter { name: "a".into() },
            Directive::ExtractFact { fact: "b".into() },
            Directive::SetReminder {
                task: "c".into(),
                delay_seconds: 1,
            },
            Directive::StartFocusSession {
                task: "d".into(),
                duration_minutes: 1,
            },
            Directive::LaunchApplication {
                app_name: "e".into(),
            },
        ];
        let names: Vec<&str> = all.iter().map(Directive::name).collect();
        assert_eq!(names, Directive::NAMES);
    }
}
