mod common;

use common::*;
use kibo_core::capabilities::{ChatReply, Directive};
use kibo_core::events::KiboEvent;
use kibo_core::persona::JAPANESE;
use kibo_core::state::{KEY_AVATAR_STYLE, KEY_VOICE};
use kibo_core::storage::KeyValueStore;
use kibo_core::types::*;

#[tokio::test]
async fn test_preset_needs_no_generation() {
    let mut h = harness();
    h.kibo.transform_character("MUZAN").await;

    assert_eq!(h.ai.count("generate_avatar"), 0);
    assert_eq!(h.ai.count("infer_voice"), 0);

    let state = h.kibo.state();
    assert_eq!(state.avatar_style, AvatarStyle::MuzanPreset);
    assert_eq!(state.voice, Voice::Charon);
    assert_eq!(state.language, JAPANESE);
    assert_eq!(state.user_preferred_language, "en-US");
    assert_eq!(state.current_character_name.as_deref(), Some("Muzan Kibutsuji"));

    assert!(h
        .drain()
        .iter()
        .any(|e| matches!(e, KiboEvent::Persona(p) if p.style == AvatarStyle::MuzanPreset)));
}

#[tokio::test]
async fn test_unknown_character_is_generated() {
    let h = harness();
    h.ai.set_voice(Voice::Fenrir);

    h.kibo.transform_character("Gojo").await;
    h.kibo.transform_character("a wise old dragon").await;

    assert_eq!(h.ai.count("generate_avatar"), 1);
    assert_eq!(h.ai.count("infer_voice"), 1);

    let state = h.kibo.state();
    assert_eq!(state.avatar_style, AvatarStyle::Generated);
    assert_eq!(state.voice, Voice::Fenrir);
    assert_eq!(state.language, "en-US");
    assert_eq!(state.current_character_name.as_deref(), Some("a wise old dragon"));
    assert!(state
        .generated_avatar_url
        .as_deref()
        .is_some_and(|url| url.starts_with("data:image/png;base64,")));
}

#[tokio::test]
async fn test_failed_generation_changes_nothing() {
    let mut h = harness();
    h.ai.fail("generate_avatar");

    h.kibo.transform_character("a wise old dragon").await;

    let state = h.kibo.state();
    assert_eq!(state.avatar_style, AvatarStyle::Abstract);
    assert_eq!(state.voice, Voice::Zephyr);
    assert!(state.generated_avatar_url.is_none());
    assert!(state.messages.last().unwrap().text().contains("Sorry"));

    let events = h.drain();
    assert!(!events.iter().any(|e| matches!(e, KiboEvent::Persona(_))));
    let errors = events
        .iter()
        .filter(|e| matches!(e, KiboEvent::Notification(n) if n.kind == NotificationKind::Error))
        .count();
    assert_eq!(errors, 1);
}

#[tokio::test]
async fn test_failed_confirmation_changes_nothing() {
    let h = harness();
    h.ai.fail("chat");

    h.kibo.transform_character("Gojo").await;

    let state = h.kibo.state();
    assert_eq!(state.avatar_style, AvatarStyle::Abstract);
    assert_eq!(state.language, "en-US");
}

#[tokio::test]
async fn test_change_character_directive_from_conversation() {
    let h = harness();
    h.ai.push_chat(ChatReply {
        text: "Here I go!".into(),
        directives: vec![Directive::ChangeCharacter {
            name: "Satoru Gojo (JJK)".into(),
        }],
    });

    h.kibo.dispatch(Some("become gojo please".into()), None).await;

    let state = h.kibo.state();
    assert_eq!(state.avatar_style, AvatarStyle::GojoPreset);
    assert_eq!(state.voice, Voice::Puck);
    // One chat for the reply, one for the in-character confirmation.
    assert_eq!(h.ai.count("chat"), 2);
    assert!(!state.is_loading);
}

#[tokio::test]
async fn test_persona_persists_voice_and_style() {
    let h = harness();
    h.kibo.transform_character("anime girl").await;

    assert_eq!(
        h.storage.get(KEY_AVATAR_STYLE).unwrap(),
        Some(serde_json::json!("anime_girl"))
    );
    assert_eq!(h.storage.get(KEY_VOICE).unwrap(), Some(serde_json::json!("Kore")));
}

#[tokio::test]
async fn test_language_choice_survives_preset_round_trip() {
    let h = harness();
    h.kibo.set_language("fr-FR");
    h.kibo.transform_character("gojo").await;
    assert_eq!(h.kibo.state().language, JAPANESE);

    h.kibo.transform_character("kibo").await;
    let state = h.kibo.state();
    assert_eq!(state.language, "fr-FR");
    assert_eq!(state.avatar_style, AvatarStyle::Abstract);
}
