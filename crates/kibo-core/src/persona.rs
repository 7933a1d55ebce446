//! Character transformation — preset personas and generated ones.

use tracing::{error, info};

use crate::capabilities::{ChatRequest, PersonaContext};
use crate::errors::CapabilityError;
use crate::events::{KiboEvent, PersonaData};
use crate::kibo::Kibo;
use crate::prompts::CONFIRM_TRANSFORMATION;
use crate::state::SessionState;
use crate::types::*;

/// Language forced by the anime-family presets.
pub const JAPANESE: &str = "ja-JP";

const PRESETS: &[(&[&str], AvatarStyle)] = &[
    (&["ABSTRACT", "KIBO", "DEFAULT"], AvatarStyle::Abstract),
    (&["ANIME GIRL", "ANIME-GIRL", "ANIME"], AvatarStyle::AnimeGirl),
    (
        &["MUZAN", "MUZAN KIBUTSUJI", "KIBUTSUJI MUZAN"],
        AvatarStyle::MuzanPreset,
    ),
    (
        &["GOJO", "SATORU GOJO", "GOJO SATORU"],
        AvatarStyle::GojoPreset,
    ),
];

/// Uppercase, drop parenthesized asides, collapse whitespace.
pub fn normalize_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut depth = 0usize;
    for c in raw.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

pub fn resolve_preset(raw: &str) -> Option<AvatarStyle> {
    let name = normalize_name(raw);
    PRESETS
        .iter()
        .find(|(keys, _)| keys.contains(&name.as_str()))
        .map(|(_, style)| *style)
}

/// Fixed traits of a resolved style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StyleTraits {
    pub voice: Voice,
    pub language_override: Option<&'static str>,
    pub display_name: &'static str,
}

/// Voice, language override, and display name for a style. Generated
/// personas get their voice and name from inference instead.
pub fn persona_for(style: AvatarStyle) -> StyleTraits {
    let (voice, language_override, display_name) = match style {
        AvatarStyle::Abstract | AvatarStyle::Generated => (Voice::Zephyr, None, "Kibo"),
        AvatarStyle::AnimeGirl => (Voice::Kore, Some(JAPANESE), "Kibo-chan"),
        AvatarStyle::MuzanPreset => (Voice::Charon, Some(JAPANESE), "Muzan Kibutsuji"),
        AvatarStyle::GojoPreset => (Voice::Puck, Some(JAPANESE), "Satoru Gojo"),
    };
    StyleTraits {
        voice,
        language_override,
        display_name,
    }
}

/// A fully resolved persona, ready to commit.
#[derive(Debug, Clone, PartialEq)]
pub struct Persona {
    pub style: AvatarStyle,
    pub voice: Voice,
    pub name: String,
    pub avatar_url: Option<String>,
}

impl Persona {
    pub fn preset(style: AvatarStyle) -> Self {
        let traits = persona_for(style);
        Self {
            style,
            voice: traits.voice,
            name: traits.display_name.to_string(),
            avatar_url: None,
        }
    }

    pub fn generated(name: &str, voice: Voice, avatar_url: String) -> Self {
        Self {
            style: AvatarStyle::Generated,
            voice,
            name: name.to_string(),
            avatar_url: Some(avatar_url),
        }
    }

    pub fn language(&self, user_preferred: &str) -> String {
        persona_for(self.style)
            .language_override
            .unwrap_or(user_preferred)
            .to_string()
    }

    pub fn context(&self) -> PersonaContext {
        PersonaContext {
            name: self.name.clone(),
            style: self.style,
        }
    }

    pub fn apply(&self, state: &mut SessionState) {
        state.avatar_style = self.style;
        state.voice = self.voice;
        state.current_character_name = match self.style {
            AvatarStyle::Abstract => None,
            _ => Some(self.name.clone()),
        };
        state.generated_avatar_url = self.avatar_url.clone();
        state.language = self.language(&state.user_preferred_language);
    }
}

impl Kibo {
    /// Become `raw_name`. Nothing changes unless every step succeeds.
    pub async fn transform_character(&self, raw_name: &str) {
        let raw_name = raw_name.trim();
        if raw_name.is_empty() {
            return;
        }
        info!("Transforming into {}", raw_name);

        let (mood, preferred) = self.read(|s| (s.mood, s.user_preferred_language.clone()));
        let outcome = self.resolve_persona(raw_name, mood, &preferred).await;

        match outcome {
            Ok((persona, confirmation)) => {
                self.update(|s| persona.apply(s));
                let data = self.read(|s| PersonaData {
                    style: s.avatar_style,
                    voice: s.voice,
                    name: s.current_character_name.clone(),
                    language: s.language.clone(),
                    avatar_url: s.generated_avatar_url.clone(),
                });
                self.broadcast(KiboEvent::Persona(data));
                info!("Now {} ({:?}, {:?})", persona.name, persona.style, persona.voice);

                if !confirmation.trim().is_empty() {
                    self.append_message(Message::model_text(confirmation.clone()));
                    self.speak(&confirmation, mood).await;
                }
            }
            Err(e) => {
                error!("Transformation into {} failed: {}", raw_name, e);
                let apology = format!("Sorry, I couldn't become {} right now.", raw_name);
                self.append_message(Message::model_text(apology.clone()));
                self.speak(&apology, Mood::Sad).await;
                self.notify(
                    NotificationKind::Error,
                    format!("Transformation failed: {}", e),
                );
            }
        }
    }

    async fn resolve_persona(
        &self,
        raw_name: &str,
        mood: Mood,
        preferred_language: &str,
    ) -> Result<(Persona, String), CapabilityError> {
        let ai = self.ai();
        let persona = match resolve_preset(raw_name) {
            Some(style) => Persona::preset(style),
            None => {
                let (avatar, voice) =
                    tokio::try_join!(ai.generate_avatar(raw_name), ai.infer_voice(raw_name))?;
                Persona::generated(raw_name, voice, avatar.data_url())
            }
        };

        let reply = ai
            .chat(ChatRequest {
                history: Vec::new(),
                instruction: Some(CONFIRM_TRANSFORMATION.to_string()),
                mood,
                language: persona.language(preferred_language),
                persona: persona.context(),
                facts: Vec::new(),
            })
            .await?;
        Ok((persona, reply.text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  muzan   (Demon Slayer) "), "MUZAN");
        assert_eq!(normalize_name("Satoru\tGojo"), "SATORU GOJO");
        assert_eq!(normalize_name("a wise old dragon"), "A WISE OLD DRAGON");
    }

    #[test]
    fn test_resolve_presets() {
        assert_eq!(resolve_preset("MUZAN"), Some(AvatarStyle::MuzanPreset));
        assert_eq!(resolve_preset("kibutsuji muzan"), Some(AvatarStyle::MuzanPreset));
        assert_eq!(resolve_preset("Gojo (JJK)"), Some(AvatarStyle::GojoPreset));
        assert_eq!(resolve_preset("anime-girl"), Some(AvatarStyle::AnimeGirl));
        assert_eq!(resolve_preset("default"), Some(AvatarStyle::Abstract));
        assert_eq!(resolve_preset("a wise old dragon"), None);
    }

    #[test]
    fn test_persona_for_presets() {
        let muzan = persona_for(AvatarStyle::MuzanPreset);
        assert_eq!(muzan.voice, Voice::Charon);
        assert_eq!(muzan.language_override, Some(JAPANESE));
        assert_eq!(persona_for(AvatarStyle::Abstract).language_override, None);
    }

    #[test]
    fn test_apply_restores_preferred_language() {
        let mut state = SessionState::new("en-US");
        Persona::preset(AvatarStyle::GojoPreset).apply(&mut state);
        assert_eq!(state.language, JAPANESE);
        assert_eq!(state.voice, Voice::Puck);
        assert_eq!(state.current_character_name.as_deref(), Some("Satoru Gojo"));

        Persona::generated("a dragon", Voice::Fenrir, "data:image/png;base64,AA==".into())
            .apply(&mut state);
        assert_eq!(state.language, "en-US");
        assert_eq!(state.avatar_style, AvatarStyle::Generated);
        assert!(state.generated_avatar_url.is_some());

        Persona::preset(AvatarStyle::Abstract).apply(&mut state);
        assert!(state.generated_avatar_url.is_none());
        assert!(state.current_character_name.is_none());
    }
}
