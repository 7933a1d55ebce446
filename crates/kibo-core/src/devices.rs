//! Device contract — microphone, screen, clipboard, speaker.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::errors::DeviceError;
use crate::types::ImageData;

/// File extensions we can read as text
pub const TEXT_EXTS: &[&str] = &[
    ".txt", ".md", ".py", ".json", ".csv", ".yaml", ".yml", ".toml", ".js", ".ts", ".html",
    ".css", ".sh", ".log", ".rs", ".xml",
];

/// Events produced by a running voice-to-text session.
#[derive(Debug)]
pub enum VoiceEvent {
    Transcript(String),
    Ended,
    Failed(DeviceError),
}

#[async_trait]
pub trait Devices: Send + Sync {
    /// Begin listening; events arrive on `events` until `Ended` or `Failed`.
    async fn start_voice(&self, events: mpsc::UnboundedSender<VoiceEvent>)
        -> Result<(), DeviceError>;

    async fn stop_voice(&self);

    async fn capture_screen(&self) -> Result<ImageData, DeviceError>;

    async fn read_clipboard(&self) -> Result<String, DeviceError>;
}

/// Guess a MIME type from the file extension, for uploads sent without one.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default();
    match ext.as_str() {
        ".png" => "image/png",
        ".jpg" | ".jpeg" => "image/jpeg",
        ".gif" => "image/gif",
        ".webp" => "image/webp",
        ".json" => "application/json",
        ".md" => "text/markdown",
        ".csv" => "text/csv",
        ".html" => "text/html",
        e if TEXT_EXTS.contains(&e) => "text/plain",
        _ => "application/octet-stream",
    }
}

/// A host with no devices attached.
pub struct NoDevices;

#[async_trait]
impl Devices for NoDevices {
    async fn start_voice(
        &self,
        _events: mpsc::UnboundedSender<VoiceEvent>,
    ) -> Result<(), DeviceError> {
        Err(DeviceError::Unavailable("no microphone".into()))
    }

    async fn stop_voice(&self) {}

    async fn capture_screen(&self) -> Result<ImageData, DeviceError> {
        Err(DeviceError::Unavailable("no screen capture".into()))
    }

    async fn read_clipboard(&self) -> Result<String, DeviceError> {
        Err(DeviceError::Unavailable("no clipboard".into()))
    }
}

// ── Audio output ──

/// An open output stream. Reused for every utterance.
#[async_trait]
pub trait AudioContext: Send + Sync {
    /// Play PCM to completion.
    async fn play(&self, pcm: &[u8]) -> Result<(), DeviceError>;
}

pub trait AudioBackend: Send + Sync {
    fn open(&self) -> Result<Arc<dyn AudioContext>, DeviceError>;
}

/// Discards audio immediately.
pub struct SilentAudio;

#[async_trait]
impl AudioContext for SilentAudio {
    async fn play(&self, _pcm: &[u8]) -> Result<(), DeviceError> {
        Ok(())
    }
}

impl AudioBackend for SilentAudio {
    fn open(&self) -> Result<Arc<dyn AudioContext>, DeviceError> {
        Ok(Arc::new(SilentAudio))
    }
}

/// Playback time of 24 kHz 16-bit mono PCM.
pub fn pcm_duration(pcm: &[u8]) -> std::time::Duration {
    const BYTES_PER_SECOND: u64 = 24_000 * 2;
    std::time::Duration::from_millis(pcm.len() as u64 * 1000 / BYTES_PER_SECOND)
}
