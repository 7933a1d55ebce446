//! Speech output (text → PCM → speaker) and speech input (microphone → transcript).

use std::sync::Arc;

use base64::Engine;
use thiserror::Error;
use tokio::sync::{mpsc, OnceCell};
use tracing::{debug, error, info, warn};

use crate::devices::{AudioBackend, AudioContext, VoiceEvent};
use crate::errors::{CapabilityError, DeviceError};
use crate::events::{AudioData, KiboEvent};
use crate::kibo::Kibo;
use crate::schedulers::TaskHandle;
use crate::types::*;

#[derive(Debug, Error)]
enum SpeechError {
    #[error("synthesis failed: {0}")]
    Synthesis(#[from] CapabilityError),

    #[error("playback failed: {0}")]
    Playback(#[from] DeviceError),
}

/// Returns status from Speaking to Idle when dropped, including when the
/// task that owns the utterance is aborted mid-playback.
struct SpeakingGuard<'a>(&'a Kibo);

impl Drop for SpeakingGuard<'_> {
    fn drop(&mut self) {
        let was_speaking = self.0.update(|s| {
            let speaking = s.status == Status::Speaking;
            if speaking {
                s.status = Status::Idle;
            }
            speaking
        });
        if was_speaking {
            self.0.broadcast_status();
        }
    }
}

/// Lazily opened output stream, reused for every utterance.
pub struct SpeechOutput {
    backend: Arc<dyn AudioBackend>,
    context: OnceCell<Arc<dyn AudioContext>>,
}

impl SpeechOutput {
    pub fn new(backend: Arc<dyn AudioBackend>) -> Self {
        Self {
            backend,
            context: OnceCell::new(),
        }
    }

    async fn context(&self) -> Result<Arc<dyn AudioContext>, DeviceError> {
        self.context
            .get_or_try_init(|| async { self.backend.open() })
            .await
            .cloned()
    }
}

impl Kibo {
    /// Speak `text` in the current voice. Failures surface as a notification
    /// and never reach the caller; status always returns to Idle.
    pub async fn speak(&self, text: &str, mood: Mood) {
        self.speak_with(text, mood, true).await
    }

    /// Like [`Kibo::speak`], but a failure is only logged. For callers that
    /// already report their own error.
    pub(crate) async fn speak_quietly(&self, text: &str, mood: Mood) {
        self.speak_with(text, mood, false).await
    }

    async fn speak_with(&self, text: &str, mood: Mood, notify_failure: bool) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let Some(voice) = self.update(|s| {
            if !s.is_kibo_active {
                return None;
            }
            s.status = Status::Speaking;
            s.mood = mood;
            Some(s.voice)
        }) else {
            debug!("Inactive, not speaking");
            return;
        };
        self.broadcast_status();

        let result = {
            let _speaking = SpeakingGuard(self);
            self.play_speech(text, mood, voice).await
        };

        if let Err(e) = result {
            error!("Speech failed: {}", e);
            if notify_failure {
                self.notify(NotificationKind::Error, "I couldn't say that out loud.");
            }
        }
    }

    async fn play_speech(&self, text: &str, mood: Mood, voice: Voice) -> Result<(), SpeechError> {
        let pcm = self.inner.ai.text_to_speech(text, mood, voice).await?;
        self.broadcast(KiboEvent::Audio(AudioData {
            text: text.to_string(),
            mood,
            voice,
            pcm: base64::engine::general_purpose::STANDARD.encode(&pcm),
        }));
        let context = self.inner.speech.context().await?;
        context.play(&pcm).await?;
        Ok(())
    }

    /// Open the microphone. A transcript is dispatched like typed input.
    pub async fn start_listening(&self) {
        let (active, status) = self.read(|s| (s.is_kibo_active, s.status));
        if !active || status == Status::Listening {
            return;
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        if let Err(e) = self.inner.devices.start_voice(tx).await {
            warn!("Voice input failed to start: {}", e);
            self.notify(NotificationKind::Error, e.user_message("microphone"));
            return;
        }

        info!("Listening");
        self.set_status(Status::Listening);
        self.broadcast(KiboEvent::Listening { active: true });

        let weak = self.downgrade();
        self.inner.timers.voice.arm(TaskHandle::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(kibo) = weak.upgrade() else { break };
                match event {
                    VoiceEvent::Transcript(text) => {
                        info!("Heard: {}", text);
                        kibo.finish_listening();
                        // Detached so stopping the microphone can't abort the reply.
                        tokio::spawn(async move { kibo.dispatch(Some(text), None).await });
                        break;
                    }
                    VoiceEvent::Ended => {
                        kibo.finish_listening();
                        break;
                    }
                    VoiceEvent::Failed(e) => {
                        warn!("Voice input failed: {}", e);
                        kibo.finish_listening();
                        kibo.notify(NotificationKind::Error, e.user_message("microphone"));
                        break;
                    }
                }
            }
        }));
    }

    pub async fn stop_listening(&self) {
        if self.read(|s| s.status) != Status::Listening {
            return;
        }
        self.inner.devices.stop_voice().await;
        self.inner.timers.voice.cancel();
        self.finish_listening();
    }

    fn finish_listening(&self) {
        let was_listening = self.update(|s| {
            let listening = s.status == Status::Listening;
            if listening {
                s.status = Status::Idle;
            }
            listening
        });
        if was_listening {
            self.broadcast_status();
            self.broadcast(KiboEvent::Listening { active: false });
        }
    }
}
