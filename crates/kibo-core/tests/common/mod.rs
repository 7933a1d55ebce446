//! Recording fakes for the capability, device, and audio seams.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use kibo_core::capabilities::*;
use kibo_core::config::Config;
use kibo_core::devices::{AudioBackend, AudioContext, Devices, SilentAudio, VoiceEvent};
use kibo_core::errors::{CapabilityError, DeviceError};
use kibo_core::events::KiboEvent;
use kibo_core::storage::MemoryStore;
use kibo_core::types::*;
use kibo_core::Kibo;

#[derive(Default)]
pub struct FakeAi {
    calls: Mutex<Vec<&'static str>>,
    failing: Mutex<HashSet<&'static str>>,
    moods: Mutex<VecDeque<Mood>>,
    chat_replies: Mutex<VecDeque<ChatReply>>,
    chat_requests: Mutex<Vec<ChatRequest>>,
    web: Mutex<WebAnswer>,
    voice: Mutex<Voice>,
    suggestion: Mutex<String>,
    priority: Mutex<Vec<String>>,
    summarized: Mutex<Vec<(String, String)>>,
}

impl FakeAi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, op: &'static str) {
        self.failing.lock().unwrap().insert(op);
    }

    pub fn push_mood(&self, mood: Mood) {
        self.moods.lock().unwrap().push_back(mood);
    }

    pub fn push_chat(&self, reply: ChatReply) {
        self.chat_replies.lock().unwrap().push_back(reply);
    }

    pub fn set_web(&self, answer: WebAnswer) {
        *self.web.lock().unwrap() = answer;
    }

    pub fn set_voice(&self, voice: Voice) {
        *self.voice.lock().unwrap() = voice;
    }

    pub fn set_suggestion(&self, text: &str) {
        *self.suggestion.lock().unwrap() = text.to_string();
    }

    pub fn set_priority(&self, order: Vec<String>) {
        *self.priority.lock().unwrap() = order;
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == op).count()
    }

    /// (content, instruction) for every summarize call.
    pub fn summarized(&self) -> Vec<(String, String)> {
        self.summarized.lock().unwrap().clone()
    }

    pub fn chat_requests(&self) -> Vec<ChatRequest> {
        self.chat_requests.lock().unwrap().clone()
    }

    fn record(&self, op: &'static str) -> Result<(), CapabilityError> {
        self.calls.lock().unwrap().push(op);
        if self.failing.lock().unwrap().contains(op) {
            return Err(CapabilityError::Http {
                status: 500,
                body: format!("{} exploded", op),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl AiCapabilities for FakeAi {
    async fn chat(&self, request: ChatRequest) -> Result<ChatReply, CapabilityError> {
        self.record("chat")?;
        self.chat_requests.lock().unwrap().push(request);
        Ok(self
            .chat_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ChatReply {
                text: "Sure thing!".into(),
                directives: Vec::new(),
            }))
    }

    async fn describe_image(
        &self,
        image: &ImageData,
        _prompt: &str,
        _language: &str,
    ) -> Result<String, CapabilityError> {
        self.record("describe_image")?;
        Ok(format!("An image of {} bytes.", image.bytes.len()))
    }

    async fn web_knowledge(
        &self,
        _prompt: &str,
        _language: &str,
    ) -> Result<WebAnswer, CapabilityError> {
        self.record("web_knowledge")?;
        Ok(self.web.lock().unwrap().clone())
    }

    async fn detect_mood(&self, _text: &str, _language: &str) -> Result<Mood, CapabilityError> {
        self.record("detect_mood")?;
        Ok(self.moods.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn text_to_speech(
        &self,
        _text: &str,
        _mood: Mood,
        _voice: Voice,
    ) -> Result<Vec<u8>, CapabilityError> {
        self.record("text_to_speech")?;
        Ok(vec![0u8; 480])
    }

    async fn generate_avatar(&self, _character: &str) -> Result<ImageData, CapabilityError> {
        self.record("generate_avatar")?;
        Ok(ImageData {
            mime: "image/png".into(),
            bytes: vec![137, 80, 78, 71],
        })
    }

    async fn infer_voice(&self, _character: &str) -> Result<Voice, CapabilityError> {
        self.record("infer_voice")?;
        Ok(*self.voice.lock().unwrap())
    }

    async fn prioritize_tasks(
        &self,
        _tasks: &[(String, String)],
    ) -> Result<Vec<String>, CapabilityError> {
        self.record("prioritize_tasks")?;
        Ok(self.priority.lock().unwrap().clone())
    }

    async fn summarize(
        &self,
        content: &str,
        instruction: &str,
        _language: &str,
    ) -> Result<String, CapabilityError> {
        self.record("summarize")?;
        self.summarized
            .lock()
            .unwrap()
            .push((content.to_string(), instruction.to_string()));
        Ok(format!("[{}] {}", instruction, content.len()))
    }

    async fn fun_fact(
        &self,
        _language: &str,
        _persona: &PersonaContext,
    ) -> Result<String, CapabilityError> {
        self.record("fun_fact")?;
        Ok("Octopuses have three hearts.".into())
    }

    async fn proactive_suggestion(
        &self,
        _screen: &ImageData,
        _language: &str,
    ) -> Result<String, CapabilityError> {
        self.record("proactive_suggestion")?;
        Ok(self.suggestion.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct FakeDevices {
    pub deny_microphone: Mutex<bool>,
    pub deny_screen: Mutex<bool>,
    pub clipboard: Mutex<String>,
    voice_tx: Mutex<Option<mpsc::UnboundedSender<VoiceEvent>>>,
    stops: Mutex<usize>,
}

impl FakeDevices {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Deliver a transcript to the running voice session.
    pub fn say(&self, text: &str) {
        if let Some(tx) = self.voice_tx.lock().unwrap().as_ref() {
            let _ = tx.send(VoiceEvent::Transcript(text.to_string()));
        }
    }

    pub fn stop_count(&self) -> usize {
        *self.stops.lock().unwrap()
    }
}

#[async_trait]
impl Devices for FakeDevices {
    async fn start_voice(
        &self,
        events: mpsc::UnboundedSender<VoiceEvent>,
    ) -> Result<(), DeviceError> {
        if *self.deny_microphone.lock().unwrap() {
            return Err(DeviceError::PermissionDenied("microphone".into()));
        }
        *self.voice_tx.lock().unwrap() = Some(events);
        Ok(())
    }

    async fn stop_voice(&self) {
        *self.stops.lock().unwrap() += 1;
        self.voice_tx.lock().unwrap().take();
    }

    async fn capture_screen(&self) -> Result<ImageData, DeviceError> {
        if *self.deny_screen.lock().unwrap() {
            return Err(DeviceError::PermissionDenied("screen".into()));
        }
        Ok(ImageData {
            mime: "image/png".into(),
            bytes: vec![1, 2, 3],
        })
    }

    async fn read_clipboard(&self) -> Result<String, DeviceError> {
        Ok(self.clipboard.lock().unwrap().clone())
    }
}

/// Playback that takes a fixed time per utterance.
pub struct SlowAudio(pub Duration);

#[async_trait]
impl AudioContext for SlowAudio {
    async fn play(&self, _pcm: &[u8]) -> Result<(), DeviceError> {
        tokio::time::sleep(self.0).await;
        Ok(())
    }
}

impl AudioBackend for SlowAudio {
    fn open(&self) -> Result<Arc<dyn AudioContext>, DeviceError> {
        Ok(Arc::new(SlowAudio(self.0)))
    }
}

pub struct Harness {
    pub kibo: Kibo,
    pub ai: Arc<FakeAi>,
    pub devices: Arc<FakeDevices>,
    pub storage: Arc<MemoryStore>,
    pub events: broadcast::Receiver<KiboEvent>,
}

pub fn harness() -> Harness {
    harness_with(Config::default())
}

pub fn harness_with(config: Config) -> Harness {
    harness_with_audio(config, Arc::new(SilentAudio))
}

pub fn harness_with_audio(config: Config, audio: Arc<dyn AudioBackend>) -> Harness {
    let ai = FakeAi::new();
    let devices = FakeDevices::new();
    let storage = Arc::new(MemoryStore::new());
    let kibo = Kibo::new(
        config,
        storage.clone(),
        ai.clone(),
        devices.clone(),
        audio,
    );
    let events = kibo.subscribe();
    Harness {
        kibo,
        ai,
        devices,
        storage,
        events,
    }
}

impl Harness {
    /// Everything broadcast since the last drain.
    pub fn drain(&mut self) -> Vec<KiboEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = self.events.try_recv() {
            out.push(ev);
        }
        out
    }

    pub fn notifications(&mut self, kind: NotificationKind) -> Vec<Notification> {
        self.drain()
            .into_iter()
            .filter_map(|ev| match ev {
                KiboEvent::Notification(n) if n.kind == kind => Some(n),
                _ => None,
            })
            .collect()
    }
}

pub fn text_file(name: &str, body: &str) -> Attachment {
    Attachment {
        name: name.into(),
        mime: "text/plain".into(),
        bytes: body.as_bytes().to_vec(),
    }
}
