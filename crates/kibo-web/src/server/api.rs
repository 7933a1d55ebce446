//! REST API endpoints.
//!
//! Long-running operations (dispatch, transformations, reports that speak)
//! are spawned; their results arrive over the WebSocket.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use kibo_core::errors::DeviceError;
use kibo_core::types::*;

use super::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/message", post(post_message))
        .route("/api/conversation/clear", post(post_clear_conversation))
        .route("/api/conversation/summary", post(post_conversation_summary))
        .route("/api/reminders", get(get_reminders).post(post_reminder))
        .route("/api/reminders/prioritized", get(get_prioritized))
        .route("/api/reminders/{id}/toggle", post(post_toggle_reminder))
        .route("/api/focus", post(post_focus).delete(delete_focus))
        .route("/api/settings", post(post_settings))
        .route("/api/character", post(post_character))
        .route("/api/mood-report", post(post_mood_report))
        .route("/api/notification/dismiss", post(post_dismiss))
        .route("/api/voice/start", post(post_voice_start))
        .route("/api/voice/stop", post(post_voice_stop))
        .route("/api/voice/transcript", post(post_transcript))
        .route("/api/voice/end", post(post_voice_end))
        .route("/api/snapshot", post(post_snapshot))
        .route("/api/screen/ask", post(post_ask_screen))
        .route("/api/clipboard", post(post_clipboard))
        .route("/api/clipboard/summarize", post(post_summarize_clipboard))
}

fn bad_request(message: impl Into<String>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"ok": false, "error": message.into()})),
    )
}

/// Accepts bare base64 or a `data:<mime>;base64,` URL.
fn decode_payload(data: &str) -> Result<(Option<String>, Vec<u8>), base64::DecodeError> {
    let (mime, b64) = match data.strip_prefix("data:").and_then(|rest| rest.split_once(',')) {
        Some((header, body)) => (
            header.strip_suffix(";base64").map(String::from),
            body,
        ),
        None => (None, data),
    };
    let bytes = base64::engine::general_purpose::STANDARD.decode(b64.trim())?;
    Ok((mime, bytes))
}

// --- State ---

async fn get_state(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(serde_json::to_value(state.kibo.state()).unwrap_or(json!({})))
}

// --- Dispatch ---

#[derive(Deserialize)]
struct FileBody {
    name: String,
    #[serde(default)]
    mime: Option<String>,
    /// Base64 or data URL.
    data: String,
}

#[derive(Deserialize)]
struct MessageBody {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    file: Option<FileBody>,
}

async fn post_message(
    State(state): State<Arc<AppState>>,
    Json(body): Json<MessageBody>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let file = match body.file {
        Some(f) => {
            let (data_mime, bytes) =
                decode_payload(&f.data).map_err(|e| bad_request(format!("bad file data: {}", e)))?;
            let mime = f
                .mime
                .or(data_mime)
                .unwrap_or_else(|| {
                    kibo_core::devices::mime_for_path(std::path::Path::new(&f.name)).to_string()
                });
            Some(Attachment {
                name: f.name,
                mime,
                bytes,
            })
        }
        None => None,
    };

    let has_text = body.text.as_deref().is_some_and(|t| !t.trim().is_empty());
    if !has_text && file.is_none() {
        return Err(bad_request("text or file is required"));
    }

    let kibo = state.kibo.clone();
    tokio::spawn(async move { kibo.dispatch(body.text, file).await });
    Ok(Json(json!({"ok": true})))
}

async fn post_clear_conversation(State(state): State<Arc<AppState>>) -> Json<Value> {
    state.kibo.clear_conversation();
    Json(json!({"ok": true}))
}

async fn post_conversation_summary(State(state): State<Arc<AppState>>) -> Json<Value> {
    let summary = state.kibo.summarize_conversation().await;
    Json(json!({"ok": summary.is_some(), "summary": summary}))
}

// --- Reminders ---

async fn get_reminders(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!(state.kibo.state().reminders))
}

#[derive(Deserialize)]
struct ReminderBody {
    task: String,
    #[serde(default)]
    due_time: Option<DateTime<Utc>>,
    #[serde(default)]
    delay_seconds: Option<u64>,
}

async fn post_reminder(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ReminderBody>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let task = body.task.trim();
    if task.is_empty() {
        return Err(bad_request("task is required"));
    }
    let due = match (body.due_time, body.delay_seconds) {
        (Some(due), _) => due,
        (None, Some(delay)) => Utc::now() + chrono::Duration::seconds(delay.min(i32::MAX as u64) as i64),
        (None, None) => return Err(bad_request("due_time or delay_seconds is required")),
    };
    let reminder = state.kibo.add_reminder(task, due);
    Ok(Json(json!({"ok": true, "reminder": reminder})))
}

async fn get_prioritized(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!(state.kibo.prioritize_reminders().await))
}

async fn post_toggle_reminder(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match state.kibo.toggle_reminder(&id) {
        Some(completed) => Ok(Json(json!({"ok": true, "completed": completed}))),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(json!({"ok": false, "error": "no such reminder"})),
        )),
    }
}

// --- Focus ---

#[derive(Deserialize)]
struct FocusBody {
    task: String,
    minutes: u64,
}

async fn post_focus(
    State(state): State<Arc<AppState>>,
    Json(body): Json<FocusBody>,
) -> Json<Value> {
    let kibo = state.kibo.clone();
    tokio::spawn(async move { kibo.start_focus_session(&body.task, body.minutes).await });
    Json(json!({"ok": true}))
}

async fn delete_focus(State(state): State<Arc<AppState>>) -> Json<Value> {
    state.kibo.cancel_focus_session();
    Json(json!({"ok": true}))
}

// --- Settings ---

#[derive(Deserialize, Default)]
struct SettingsBody {
    active: Option<bool>,
    proactive: Option<bool>,
    floating: Option<bool>,
    language: Option<String>,
    voice: Option<Voice>,
    animation_pack: Option<AnimationPack>,
}

async fn post_settings(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SettingsBody>,
) -> Json<Value> {
    let kibo = &state.kibo;
    if let Some(active) = body.active {
        kibo.set_active(active).await;
    }
    if let Some(proactive) = body.proactive {
        kibo.set_proactive_mode(proactive);
    }
    if let Some(floating) = body.floating {
        kibo.set_floating_mode(floating);
    }
    if let Some(language) = body.language.as_deref().filter(|l| !l.trim().is_empty()) {
        kibo.set_language(language.trim());
    }
    if let Some(voice) = body.voice {
        kibo.set_voice(voice);
    }
    if let Some(pack) = body.animation_pack {
        kibo.set_animation_pack(pack);
    }
    Json(json!({"ok": true}))
}

// --- Persona ---

#[derive(Deserialize)]
struct CharacterBody {
    name: String,
}

async fn post_character(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CharacterBody>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if body.name.trim().is_empty() {
        return Err(bad_request("name is required"));
    }
    info!("Character change requested: {}", body.name);
    let kibo = state.kibo.clone();
    tokio::spawn(async move { kibo.transform_character(&body.name).await });
    Ok(Json(json!({"ok": true})))
}

async fn post_mood_report(State(state): State<Arc<AppState>>) -> Json<Value> {
    let report = state.kibo.mood_report().await;
    Json(json!({"ok": report.is_some(), "report": report}))
}

async fn post_dismiss(State(state): State<Arc<AppState>>) -> Json<Value> {
    state.kibo.dismiss_notification();
    Json(json!({"ok": true}))
}

// --- Voice ---

async fn post_voice_start(State(state): State<Arc<AppState>>) -> Json<Value> {
    state.kibo.start_listening().await;
    let listening = state.kibo.state().status == Status::Listening;
    Json(json!({"ok": listening}))
}

async fn post_voice_stop(State(state): State<Arc<AppState>>) -> Json<Value> {
    state.kibo.stop_listening().await;
    Json(json!({"ok": true}))
}

#[derive(Deserialize)]
struct TranscriptBody {
    text: String,
}

async fn post_transcript(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TranscriptBody>,
) -> Json<Value> {
    let delivered = state.bridge.deliver_transcript(&body.text);
    Json(json!({"ok": delivered}))
}

#[derive(Deserialize, Default)]
struct VoiceEndBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    permission_denied: bool,
}

async fn post_voice_end(
    State(state): State<Arc<AppState>>,
    Json(body): Json<VoiceEndBody>,
) -> Json<Value> {
    let error = if body.permission_denied {
        Some(DeviceError::PermissionDenied(
            body.error.unwrap_or_else(|| "microphone".into()),
        ))
    } else {
        body.error.map(DeviceError::Unavailable)
    };
    let delivered = state.bridge.deliver_voice_end(error);
    Json(json!({"ok": delivered}))
}

// --- Screen and clipboard ---

#[derive(Deserialize)]
struct SnapshotBody {
    /// Base64 or data URL of the current screen frame.
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    mime: Option<String>,
    #[serde(default)]
    denied: bool,
}

async fn post_snapshot(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SnapshotBody>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if body.denied {
        state.bridge.set_screen_denied();
        return Ok(Json(json!({"ok": true})));
    }
    let Some(image) = body.image else {
        return Err(bad_request("image or denied is required"));
    };
    let (data_mime, bytes) = decode_payload(&image).map_err(|e| {
        warn!("Bad snapshot payload: {}", e);
        bad_request(format!("bad image data: {}", e))
    })?;
    let mime = body
        .mime
        .or(data_mime)
        .unwrap_or_else(|| "image/png".to_string());
    state.bridge.set_screen_frame(ImageData { mime, bytes });
    Ok(Json(json!({"ok": true})))
}

#[derive(Deserialize, Default)]
struct AskScreenBody {
    #[serde(default)]
    prompt: String,
}

async fn post_ask_screen(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AskScreenBody>,
) -> Json<Value> {
    let kibo = state.kibo.clone();
    tokio::spawn(async move { kibo.ask_about_screen(&body.prompt).await });
    Json(json!({"ok": true}))
}

#[derive(Deserialize)]
struct ClipboardBody {
    text: String,
}

async fn post_clipboard(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ClipboardBody>,
) -> Json<Value> {
    state.bridge.set_clipboard(body.text);
    Json(json!({"ok": true}))
}

async fn post_summarize_clipboard(State(state): State<Arc<AppState>>) -> Json<Value> {
    let kibo = state.kibo.clone();
    tokio::spawn(async move { kibo.summarize_clipboard().await });
    Json(json!({"ok": true}))
}
