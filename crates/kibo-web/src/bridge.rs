//! Browser device bridge — the web client owns the microphone, screen share,
//! clipboard, and speaker, and reports back over the REST API.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info};

use kibo_core::devices::{pcm_duration, AudioBackend, AudioContext, Devices, VoiceEvent};
use kibo_core::errors::DeviceError;
use kibo_core::types::ImageData;

/// A screen frame older than this is not offered to the companion.
const SNAPSHOT_MAX_AGE: Duration = Duration::from_secs(180);

#[derive(Default)]
enum ScreenShare {
    #[default]
    NotShared,
    Denied,
    Frame { image: ImageData, at: Instant },
}

#[derive(Default)]
pub struct BrowserBridge {
    voice: Mutex<Option<mpsc::UnboundedSender<VoiceEvent>>>,
    screen: Mutex<ScreenShare>,
    clipboard: Mutex<Option<String>>,
}

impl BrowserBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward a finished utterance. Returns false when nobody is listening.
    pub fn deliver_transcript(&self, text: &str) -> bool {
        self.send_voice(VoiceEvent::Transcript(text.to_string()))
    }

    /// The browser's recognizer stopped or failed.
    pub fn deliver_voice_end(&self, error: Option<DeviceError>) -> bool {
        let event = match error {
            Some(e) => VoiceEvent::Failed(e),
            None => VoiceEvent::Ended,
        };
        let delivered = self.send_voice(event);
        self.lock_voice().take();
        delivered
    }

    fn send_voice(&self, event: VoiceEvent) -> bool {
        match self.lock_voice().as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => {
                debug!("Voice event with no session: {:?}", event);
                false
            }
        }
    }

    pub fn set_screen_frame(&self, image: ImageData) {
        *lock(&self.screen) = ScreenShare::Frame {
            image,
            at: Instant::now(),
        };
    }

    pub fn set_screen_denied(&self) {
        info!("Screen share denied by the browser");
        *lock(&self.screen) = ScreenShare::Denied;
    }

    pub fn set_clipboard(&self, text: String) {
        *lock(&self.clipboard) = Some(text);
    }

    fn lock_voice(&self) -> std::sync::MutexGuard<'_, Option<mpsc::UnboundedSender<VoiceEvent>>> {
        lock(&self.voice)
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl Devices for BrowserBridge {
    async fn start_voice(
        &self,
        events: mpsc::UnboundedSender<VoiceEvent>,
    ) -> Result<(), DeviceError> {
        *self.lock_voice() = Some(events);
        Ok(())
    }

    async fn stop_voice(&self) {
        self.lock_voice().take();
    }

    async fn capture_screen(&self) -> Result<ImageData, DeviceError> {
        match &*lock(&self.screen) {
            ScreenShare::Frame { image, at } if at.elapsed() <= SNAPSHOT_MAX_AGE => {
                Ok(image.clone())
            }
            ScreenShare::Frame { .. } => {
                Err(DeviceError::Unavailable("screen share went stale".into()))
            }
            ScreenShare::Denied => Err(DeviceError::PermissionDenied("screen".into())),
            ScreenShare::NotShared => Err(DeviceError::Unavailable("screen not shared".into())),
        }
    }

    async fn read_clipboard(&self) -> Result<String, DeviceError> {
        lock(&self.clipboard)
            .clone()
            .ok_or_else(|| DeviceError::Unavailable("no clipboard text received".into()))
    }
}

/// Audio is played by the browser from the `audio` event; this context
/// only holds the speaking status for as long as playback takes.
pub struct ClientAudio;

#[async_trait]
impl AudioContext for ClientAudio {
    async fn play(&self, pcm: &[u8]) -> Result<(), DeviceError> {
        tokio::time::sleep(pcm_duration(pcm)).await;
        Ok(())
    }
}

impl AudioBackend for ClientAudio {
    fn open(&self) -> Result<Arc<dyn AudioContext>, DeviceError> {
        Ok(Arc::new(ClientAudio))
    }
}
