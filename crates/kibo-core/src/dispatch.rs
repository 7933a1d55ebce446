//! The dispatch pipeline — one user input (typed, spoken, or a file) in,
//! one reply (text, speech, side effects) out.

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::capabilities::{ChatRequest, Directive};
use crate::devices::TEXT_EXTS;
use crate::errors::CapabilityError;
use crate::kibo::Kibo;
use crate::prompts::{DEFAULT_SUMMARY_INSTRUCTION, OPTIMIZE_PERSONA_INSTRUCTION};
use crate::types::*;
use crate::web;

/// Reserved command: rewrite a persona draft. Never enters the transcript as user input.
pub const OPTIMIZE_PERSONA_COMMAND: &str = "/optimize-persona";

/// Leading phrases that route a request to web knowledge.
const WEB_PREFIXES: &[&str] = &[
    "who is",
    "what is",
    "search for",
    "look up",
    "tell me about",
    "summarize",
];

/// Mood used when answering about an image or from the web.
const ANSWER_MOOD: Mood = Mood::Happy;

/// Reminders further out than a year are clamped.
const MAX_REMINDER_DELAY_SECONDS: u64 = 365 * 24 * 3600;

const DESCRIBE_IMAGE_DEFAULT: &str = "What's in this image?";

const APOLOGY: &str = "Sorry, something went wrong on my side. Could you try that again?";

/// Shown to the user on failure. Provider details stay in the log.
const FAILURE_NOTICE: &str = "Something went wrong. Please try again in a moment.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemCommand {
    OptimizePersona(String),
}

impl SystemCommand {
    pub fn parse(text: &str) -> Option<SystemCommand> {
        let rest = text.trim_start().strip_prefix(OPTIMIZE_PERSONA_COMMAND)?;
        if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
            return None;
        }
        Some(SystemCommand::OptimizePersona(rest.trim().to_string()))
    }
}

/// What an attachment contributes to the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    Image(ImageData),
    Text(String),
}

/// Images pass through; text-like files are decoded; anything else is dropped.
pub fn prepare_attachment(file: &Attachment) -> Option<FileContent> {
    if file.mime.starts_with("image/") {
        return Some(FileContent::Image(ImageData {
            mime: file.mime.clone(),
            bytes: file.bytes.clone(),
        }));
    }
    if is_text_like(file) {
        return Some(FileContent::Text(
            String::from_utf8_lossy(&file.bytes).into_owned(),
        ));
    }
    None
}

fn is_text_like(file: &Attachment) -> bool {
    if file.mime.starts_with("text/") {
        return true;
    }
    if matches!(
        file.mime.as_str(),
        "application/json" | "application/xml" | "application/x-yaml" | "application/yaml"
    ) {
        return true;
    }
    let lower = file.name.to_lowercase();
    TEXT_EXTS.iter().any(|ext| lower.ends_with(ext))
}

/// Where a request goes. Checked in this order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    SystemCommand(SystemCommand),
    DescribeImage,
    Summarize,
    WebKnowledge,
    Conversation,
}

pub fn route(text: &str, content: Option<&FileContent>) -> Route {
    if let Some(cmd) = SystemCommand::parse(text) {
        return Route::SystemCommand(cmd);
    }
    match content {
        Some(FileContent::Image(_)) => Route::DescribeImage,
        Some(FileContent::Text(_)) => Route::Summarize,
        None if is_web_query(text) => Route::WebKnowledge,
        None => Route::Conversation,
    }
}

/// Contains a URL, or starts with one of the web keywords.
pub fn is_web_query(text: &str) -> bool {
    if web::contains_url(text) {
        return true;
    }
    let lower = text.trim_start().to_lowercase();
    WEB_PREFIXES.iter().any(|p| lower.starts_with(p))
}

fn user_message(text: &str, file: Option<&Attachment>, content: Option<&FileContent>) -> Message {
    let mut parts = Vec::new();
    if !text.is_empty() {
        parts.push(MessagePart::Text {
            text: text.to_string(),
        });
    }
    if let Some(file) = file {
        parts.push(MessagePart::Text {
            text: format!("📎 {}", file.name),
        });
    }
    if let Some(FileContent::Image(image)) = content {
        parts.push(MessagePart::Image {
            mime: image.mime.clone(),
            data_url: image.data_url(),
        });
    }
    Message::new(Role::User, parts)
}

/// A finished reply, ready for the transcript and the speaker.
struct Reply {
    text: String,
    sources: Vec<Source>,
    mood: Mood,
}

impl Kibo {
    /// Run one input through the pipeline. Never fails: errors become an
    /// apology, and the loading flag and status are always restored.
    pub async fn dispatch(&self, text: Option<String>, file: Option<Attachment>) {
        let text = text.map(|t| t.trim().to_string()).unwrap_or_default();
        if text.is_empty() && file.is_none() {
            return;
        }

        self.inner.timers.idle.cancel();
        self.react(Reaction::Attention);
        self.update(|s| {
            s.status = Status::Thinking;
            s.is_loading = true;
        });
        self.broadcast_status();

        if let Err(e) = self.run_pipeline(&text, file).await {
            error!("Dispatch failed: {}", e);
            self.append_message(Message::model_text(APOLOGY));
            // The error notification below is the only one for this input.
            self.speak_quietly(APOLOGY, Mood::Sad).await;
            self.notify(NotificationKind::Error, FAILURE_NOTICE);
            self.react(Reaction::Surprised);
        }

        self.update(|s| {
            s.is_loading = false;
            s.status = Status::Idle;
        });
        self.broadcast_status();
    }

    async fn run_pipeline(&self, text: &str, file: Option<Attachment>) -> Result<(), CapabilityError> {
        let content = file.as_ref().and_then(|f| {
            let content = prepare_attachment(f);
            if content.is_none() {
                info!("Ignoring unsupported attachment {} ({})", f.name, f.mime);
            }
            content
        });

        let route = route(text, content.as_ref());
        debug!("Routing {:?}", route);

        if let Route::SystemCommand(cmd) = route {
            return self.run_system_command(cmd).await;
        }

        self.append_message(user_message(text, file.as_ref(), content.as_ref()));

        let language = self.read(|s| s.language.clone());
        let mood = if text.is_empty() {
            self.read(|s| s.mood)
        } else {
            let mood = self.inner.ai.detect_mood(text, &language).await?;
            self.update(|s| s.record_mood(mood, Utc::now()));
            self.broadcast_status();
            mood
        };

        let reply = match (route, content) {
            (Route::DescribeImage, Some(FileContent::Image(image))) => {
                let prompt = if text.is_empty() { DESCRIBE_IMAGE_DEFAULT } else { text };
                Reply {
                    text: self.inner.ai.describe_image(&image, prompt, &language).await?,
                    sources: Vec::new(),
                    mood: ANSWER_MOOD,
                }
            }
            (Route::Summarize, Some(FileContent::Text(body))) => {
                let instruction = if text.is_empty() {
                    DEFAULT_SUMMARY_INSTRUCTION
                } else {
                    text
                };
                Reply {
                    text: self.inner.ai.summarize(&body, instruction, &language).await?,
                    sources: Vec::new(),
                    mood,
                }
            }
            (Route::WebKnowledge, _) => {
                let answer = self.inner.ai.web_knowledge(text, &language).await?;
                Reply {
                    text: answer.text,
                    sources: answer.sources,
                    mood: ANSWER_MOOD,
                }
            }
            _ => self.converse(mood, &language).await?,
        };

        if !reply.text.trim().is_empty() {
            self.append_message(Message::model_text(reply.text.clone()).with_sources(reply.sources));
            self.speak(&reply.text, reply.mood).await;
        }
        Ok(())
    }

    async fn converse(&self, mood: Mood, language: &str) -> Result<Reply, CapabilityError> {
        let window = self.inner.config.context_messages;
        let request = self.read(|s| ChatRequest {
            history: s.recent_messages(window),
            instruction: None,
            mood,
            language: language.to_string(),
            persona: Kibo::persona_context(s),
            facts: s.learned_facts.iter().map(|f| f.text.clone()).collect(),
        });
        let reply = self.inner.ai.chat(request).await?;

        for directive in reply.directives {
            self.apply_directive(directive, mood).await;
        }

        Ok(Reply {
            text: reply.text,
            sources: Vec::new(),
            mood,
        })
    }

    async fn apply_directive(&self, directive: Directive, mood: Mood) {
        info!("Directive: {}", directive.name());
        match directive {
            Directive::ChangeCharacter { name } => self.transform_character(&name).await,
            Directive::ExtractFact { fact } => {
                let fact = fact.trim();
                if fact.is_empty() {
                    return;
                }
                self.update(|s| s.add_fact(fact));
                self.react(Reaction::Acknowledge);
                info!("Learned: {}", fact);
            }
            Directive::SetReminder {
                task,
                delay_seconds,
            } => {
                let delay_seconds = delay_seconds.min(MAX_REMINDER_DELAY_SECONDS);
                let due = Utc::now() + chrono::Duration::seconds(delay_seconds as i64);
                let reminder = self.add_reminder(&task, due);
                self.react(Reaction::Acknowledge);
                self.notify(
                    NotificationKind::Info,
                    format!(
                        "Reminder set: {} at {}",
                        reminder.task,
                        reminder.due_time.format("%H:%M")
                    ),
                );
                self.speak(
                    &format!(
                        "Okay, I'll remind you to {} in {}.",
                        reminder.task,
                        human_delay(delay_seconds)
                    ),
                    mood,
                )
                .await;
            }
            Directive::StartFocusSession {
                task,
                duration_minutes,
            } => self.start_focus_session(&task, duration_minutes).await,
            Directive::LaunchApplication { app_name } => {
                warn!("Launching applications is not supported: {}", app_name);
                self.notify(
                    NotificationKind::Info,
                    format!("I can't open {} from here yet.", app_name),
                );
            }
        }
    }

    async fn run_system_command(&self, command: SystemCommand) -> Result<(), CapabilityError> {
        match command {
            SystemCommand::OptimizePersona(draft) => {
                if draft.is_empty() {
                    self.notify(
                        NotificationKind::Info,
                        format!("Usage: {} <persona draft>", OPTIMIZE_PERSONA_COMMAND),
                    );
                    return Ok(());
                }
                let language = self.read(|s| s.language.clone());
                let optimized = self
                    .inner
                    .ai
                    .summarize(&draft, OPTIMIZE_PERSONA_INSTRUCTION, &language)
                    .await?;
                if !optimized.trim().is_empty() {
                    self.append_message(Message::model_text(optimized));
                }
                Ok(())
            }
        }
    }
}

fn human_delay(seconds: u64) -> String {
    match seconds {
        0..=59 => format!("{} second{}", seconds, if seconds == 1 { "" } else { "s" }),
        60..=3599 => {
            let m = seconds / 60;
            format!("{} minute{}", m, if m == 1 { "" } else { "s" })
        }
        _ => {
            let h = seconds / 3600;
            let m = (seconds % 3600) / 60;
            if m == 0 {
                format!("{} hour{}", h, if h == 1 { "" } else { "s" })
            } else {
                format!("{}h {}m", h, m)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, mime: &str) -> Attachment {
        Attachment {
            name: name.into(),
            mime: mime.into(),
            bytes: b"hello".to_vec(),
        }
    }

    #[test]
    fn test_web_query_detection() {
        assert!(is_web_query("what is entropy"));
        assert!(is_web_query("Who is Ada Lovelace?"));
        assert!(is_web_query("read https://example.com/post please"));
        assert!(!is_web_query("entropy"));
        assert!(!is_web_query("so what is up"));
    }

    #[test]
    fn test_route_order() {
        let image = prepare_attachment(&file("cat.png", "image/png"));
        let text = prepare_attachment(&file("notes.md", "text/markdown"));

        assert_eq!(route("what is this", image.as_ref()), Route::DescribeImage);
        assert_eq!(route("what is this", text.as_ref()), Route::Summarize);
        assert_eq!(route("what is entropy", None), Route::WebKnowledge);
        assert_eq!(route("hello there", None), Route::Conversation);
        assert_eq!(
            route("/optimize-persona a grumpy cat", image.as_ref()),
            Route::SystemCommand(SystemCommand::OptimizePersona("a grumpy cat".into()))
        );
    }

    #[test]
    fn test_unsupported_attachment_dropped() {
        assert!(prepare_attachment(&file("a.bin", "application/octet-stream")).is_none());
        assert!(matches!(
            prepare_attachment(&file("main.rs", "application/octet-stream")),
            Some(FileContent::Text(_))
        ));
    }

    #[test]
    fn test_system_command_needs_word_boundary() {
        assert!(SystemCommand::parse("/optimize-personality").is_none());
        assert_eq!(
            SystemCommand::parse("/optimize-persona"),
            Some(SystemCommand::OptimizePersona(String::new()))
        );
    }

    #[test]
    fn test_user_message_echoes_file() {
        let f = file("cat.png", "image/png");
        let content = prepare_attachment(&f);
        let msg = user_message("look", Some(&f), content.as_ref());
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.text(), "look\n📎 cat.png");
        assert!(matches!(msg.parts.last(), Some(MessagePart::Image { .. })));
    }

    #[test]
    fn test_human_delay() {
        assert_eq!(human_delay(1), "1 second");
        assert_eq!(human_delay(600), "10 minutes");
        assert_eq!(human_delay(3600), "1 hour");
        assert_eq!(human_delay(5400), "1h 30m");
    }
}
