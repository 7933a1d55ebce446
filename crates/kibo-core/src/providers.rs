//! OpenAI-compatible implementation of the AI capability contract, using
//! reqwest for HTTP calls. Chat Completions for text, `audio/speech` for TTS,
//! `images/generations` for avatars.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::capabilities::*;
use crate::config::Config;
use crate::errors::CapabilityError;
use crate::prompts;
use crate::types::*;
use crate::web::{grounding_context, sources_for, WebClient, WebPage};

/// Max tokens for one-word classifications.
const SHORT_TOKENS: u32 = 16;
const REPLY_TOKENS: u32 = 600;

// ── Tool definitions ──

/// The directive set, as Chat Completions function tools.
pub fn directive_tools() -> Vec<Value> {
    let function = |name: &str, description: &str, properties: Value, required: &[&str]| {
        json!({
            "type": "function",
            "function": {
                "name": name,
                "description": description,
                "parameters": {
                    "type": "object",
                    "properties": properties,
                    "required": required,
                }
            }
        })
    };

    vec![
        function(
            "changeCharacter",
            "Transform into another character when the user asks you to become someone.",
            json!({"characterName": {"type": "string", "description": "Who to become"}}),
            &["characterName"],
        ),
        function(
            "extractFact",
            "Remember a fact the user shared about themselves.",
            json!({"fact": {"type": "string", "description": "The fact, phrased about the user"}}),
            &["fact"],
        ),
        function(
            "setReminder",
            "Remind the user about a task after a delay.",
            json!({
                "task": {"type": "string", "description": "What to remind them about"},
                "delaySeconds": {"type": "integer", "description": "Seconds from now"}
            }),
            &["task", "delaySeconds"],
        ),
        function(
            "startFocusSession",
            "Start a timed focus session on a task.",
            json!({
                "task": {"type": "string", "description": "What the user is focusing on"},
                "durationMinutes": {"type": "integer", "description": "Length of the session"}
            }),
            &["task", "durationMinutes"],
        ),
        function(
            "launchApplication",
            "Open an application on the user's computer.",
            json!({"appName": {"type": "string", "description": "Application name"}}),
            &["appName"],
        ),
    ]
}

// ── Request/response translation ──

/// Convert transcript messages to Chat Completions messages.
fn history_to_messages(history: &[Message]) -> Vec<Value> {
    history
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Model => "assistant",
            };
            let has_image = m
                .parts
                .iter()
                .any(|p| matches!(p, MessagePart::Image { .. }));
            // Assistant turns and text-only turns stay plain strings.
            if !has_image || m.role == Role::Model {
                return json!({"role": role, "content": m.text()});
            }
            let parts: Vec<Value> = m
                .parts
                .iter()
                .map(|p| match p {
                    MessagePart::Text { text } => json!({"type": "text", "text": text}),
                    MessagePart::Image { data_url, .. } => {
                        json!({"type": "image_url", "image_url": {"url": data_url}})
                    }
                })
                .collect();
            json!({"role": role, "content": parts})
        })
        .collect()
}

#[derive(Debug, Default)]
struct Completion {
    text: String,
    calls: Vec<(String, Value)>,
}

/// Normalize a Chat Completions response into text plus function calls.
fn normalize_completion(response: &Value) -> Result<Completion, CapabilityError> {
    let message = response
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| CapabilityError::Malformed("response has no choices".into()))?;

    let text = message
        .get("content")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .trim()
        .to_string();

    let mut calls = Vec::new();
    if let Some(tcs) = message.get("tool_calls").and_then(|v| v.as_array()) {
        for tc in tcs {
            let func = &tc["function"];
            let name = func
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            let arguments: Value = func
                .get("arguments")
                .and_then(|v| v.as_str())
                .and_then(|s| serde_json::from_str(s).ok())
                .unwrap_or(json!({}));
            calls.push((name, arguments));
        }
    }

    Ok(Completion { text, calls })
}

/// Models like to wrap JSON in markdown fences.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// System prompt and user turn for a web answer grounded on `pages`.
fn web_request(pages: &[WebPage], question: &str, language: &str) -> (String, String) {
    if pages.is_empty() {
        return (prompts::web_offline_prompt(language), question.to_string());
    }
    (
        prompts::web_prompt(language),
        format!("{}\n\nQuestion: {}", grounding_context(pages), question),
    )
}

/// Parse a prioritization answer. Malformed output keeps the original order.
fn parse_order(raw: &str, tasks: &[(String, String)]) -> Vec<String> {
    let original = || -> Vec<String> { tasks.iter().map(|(id, _)| id.clone()).collect() };
    match serde_json::from_str::<Value>(strip_code_fence(raw)) {
        Ok(v) => match v.get("order").and_then(|o| o.as_array()) {
            Some(arr) => arr
                .iter()
                .filter_map(|id| id.as_str().map(String::from))
                .collect(),
            None => original(),
        },
        Err(e) => {
            warn!("Unparsable prioritization, keeping order: {}", e);
            original()
        }
    }
}

/// Our closed voice set mapped onto the speech endpoint's voices.
fn speech_voice(voice: Voice) -> &'static str {
    match voice {
        Voice::Zephyr => "nova",
        Voice::Puck => "fable",
        Voice::Charon => "onyx",
        Voice::Kore => "shimmer",
        Voice::Fenrir => "echo",
    }
}

// ── Provider ──

pub struct OpenAiProvider {
    config: Config,
    client: reqwest::Client,
    web: WebClient,
}

impl OpenAiProvider {
    pub fn new(config: Config) -> Result<Self, CapabilityError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        let web = WebClient::new(config.ollama_api_key.clone())?;
        Ok(Self {
            config,
            client,
            web,
        })
    }

    fn url(&self, path: &str) -> String {
        let base = self
            .config
            .base_url
            .as_deref()
            .unwrap_or("https://api.openai.com/v1");
        format!("{}/{}", base.trim_end_matches('/'), path)
    }

    /// POST with one retry on HTTP 500.
    async fn send(&self, path: &str, body: &Value) -> Result<reqwest::Response, CapabilityError> {
        let url = self.url(path);
        // Ollama and other local servers don't need a key
        let api_key = self.config.api_key.as_deref().unwrap_or("ollama");

        let mut retried = false;
        loop {
            let response = self
                .client
                .post(&url)
                .bearer_auth(api_key)
                .json(body)
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            let text = response.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(500).collect();
            error!("API HTTP {}: {} | url={}", status, snippet, url);

            if status.as_u16() == 500 && !retried {
                retried = true;
                tokio::time::sleep(Duration::from_secs(2)).await;
                continue;
            }
            return Err(CapabilityError::Http {
                status: status.as_u16(),
                body: snippet,
            });
        }
    }

    async fn complete(
        &self,
        messages: Vec<Value>,
        with_tools: bool,
        max_tokens: u32,
    ) -> Result<Completion, CapabilityError> {
        let mut body = json!({
            "model": self.config.model,
            "messages": messages,
            "max_tokens": max_tokens,
        });
        if with_tools {
            body["tools"] = json!(directive_tools());
        }

        info!(
            "chat_completions request: model={} provider={} msg_count={}",
            self.config.model,
            self.config.provider,
            body["messages"].as_array().map(|m| m.len()).unwrap_or(0)
        );

        let data: Value = self.send("chat/completions", &body).await?.json().await?;
        normalize_completion(&data)
    }

    /// One system prompt, one user turn, text out.
    async fn ask(
        &self,
        system: &str,
        user: Value,
        max_tokens: u32,
    ) -> Result<String, CapabilityError> {
        let messages = vec![
            json!({"role": "system", "content": system}),
            json!({"role": "user", "content": user}),
        ];
        Ok(self.complete(messages, false, max_tokens).await?.text)
    }
}

#[async_trait]
impl AiCapabilities for OpenAiProvider {
    async fn chat(&self, request: ChatRequest) -> Result<ChatReply, CapabilityError> {
        let system = prompts::conversation_system_prompt(
            &request.persona,
            request.mood,
            &request.language,
            &request.facts,
        );
        let mut messages = vec![json!({"role": "system", "content": system})];
        messages.extend(history_to_messages(&request.history));
        if let Some(instruction) = &request.instruction {
            messages.push(json!({"role": "user", "content": instruction}));
        }

        let completion = self.complete(messages, true, REPLY_TOKENS).await?;

        let mut directives = Vec::new();
        for (name, args) in &completion.calls {
            match Directive::from_call(name, args) {
                Some(d) => directives.push(d),
                None => warn!("Skipping unusable function call {} {}", name, args),
            }
        }
        Ok(ChatReply {
            text: completion.text,
            directives,
        })
    }

    async fn describe_image(
        &self,
        image: &ImageData,
        prompt: &str,
        language: &str,
    ) -> Result<String, CapabilityError> {
        let content = json!([
            {"type": "text", "text": prompt},
            {"type": "image_url", "image_url": {"url": image.data_url()}}
        ]);
        self.ask(&prompts::describe_image_prompt(language), content, REPLY_TOKENS)
            .await
    }

    async fn web_knowledge(
        &self,
        prompt: &str,
        language: &str,
    ) -> Result<WebAnswer, CapabilityError> {
        let pages = self.web.gather(prompt).await?;
        info!("web_knowledge: {} pages retrieved", pages.len());
        let (system, user) = web_request(&pages, prompt, language);
        let text = self.ask(&system, json!(user), REPLY_TOKENS).await?;
        Ok(WebAnswer {
            text: text.trim().to_string(),
            sources: sources_for(&pages),
        })
    }

    async fn detect_mood(&self, text: &str, language: &str) -> Result<Mood, CapabilityError> {
        let raw = self
            .ask(&prompts::mood_prompt(language), json!(text), SHORT_TOKENS)
            .await?;
        Ok(Mood::parse_lenient(&raw))
    }

    async fn text_to_speech(
        &self,
        text: &str,
        mood: Mood,
        voice: Voice,
    ) -> Result<Vec<u8>, CapabilityError> {
        let body = json!({
            "model": self.config.tts_model,
            "input": text,
            "voice": speech_voice(voice),
            "instructions": format!("Speak in a {} tone.", mood),
            "response_format": "pcm",
        });
        info!("speech request: voice={} mood={} chars={}", voice.as_str(), mood, text.len());
        let bytes = self.send("audio/speech", &body).await?.bytes().await?;
        Ok(bytes.to_vec())
    }

    async fn generate_avatar(&self, character: &str) -> Result<ImageData, CapabilityError> {
        let body = json!({
            "model": self.config.image_model,
            "prompt": prompts::avatar_prompt(character),
            "n": 1,
            "size": "1024x1024",
        });
        info!("image request: character={}", character);
        let data: Value = self.send("images/generations", &body).await?.json().await?;
        let b64 = data["data"][0]["b64_json"]
            .as_str()
            .ok_or_else(|| CapabilityError::Malformed("image response has no b64_json".into()))?;

        use base64::Engine;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(b64)
            .map_err(|e| CapabilityError::Malformed(format!("bad image payload: {}", e)))?;
        Ok(ImageData {
            mime: "image/png".to_string(),
            bytes,
        })
    }

    async fn infer_voice(&self, character: &str) -> Result<Voice, CapabilityError> {
        let raw = self
            .ask(prompts::VOICE_PROMPT, json!(character), SHORT_TOKENS)
            .await?;
        Ok(Voice::parse_lenient(&raw))
    }

    async fn prioritize_tasks(
        &self,
        tasks: &[(String, String)],
    ) -> Result<Vec<String>, CapabilityError> {
        let listing: Vec<Value> = tasks
            .iter()
            .map(|(id, task)| json!({"id": id, "task": task}))
            .collect();
        let raw = self
            .ask(
                prompts::PRIORITIZE_PROMPT,
                json!(serde_json::to_string(&listing).unwrap_or_default()),
                REPLY_TOKENS,
            )
            .await?;
        Ok(parse_order(&raw, tasks))
    }

    async fn summarize(
        &self,
        content: &str,
        instruction: &str,
        language: &str,
    ) -> Result<String, CapabilityError> {
        let user = format!("Instruction: {}\n\nContent:\n{}", instruction, content);
        self.ask(&prompts::summarize_prompt(language), json!(user), REPLY_TOKENS)
            .await
    }

    async fn fun_fact(
        &self,
        language: &str,
        persona: &PersonaContext,
    ) -> Result<String, CapabilityError> {
        self.ask(
            &prompts::fun_fact_prompt(language, persona),
            json!("Say something."),
            REPLY_TOKENS,
        )
        .await
    }

    async fn proactive_suggestion(
        &self,
        screen: &ImageData,
        language: &str,
    ) -> Result<String, CapabilityError> {
        let content = json!([
            {"type": "image_url", "image_url": {"url": screen.data_url()}}
        ]);
        self.ask(&prompts::proactive_prompt(language), content, REPLY_TOKENS)
            .await
    }
}
