mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::*;
use kibo_core::capabilities::{ChatReply, Directive, NO_SUGGESTION};
use kibo_core::config::Config;
use kibo_core::events::KiboEvent;
use kibo_core::types::*;

async fn advance(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

#[tokio::test(start_paused = true)]
async fn test_focus_session_expires() {
    let mut h = harness();
    h.kibo.start_focus_session("write the report", 1).await;

    let state = h.kibo.state();
    assert!(state.is_focus_mode_active());
    assert_eq!(state.focus_session_task(), Some("write the report"));
    assert!(state.focus_session_end_time().is_some());
    assert!(h.kibo.focus_timer_armed());

    advance(61).await;

    let state = h.kibo.state();
    assert!(!state.is_focus_mode_active());
    assert!(state.focus_session_end_time().is_none());
    assert!(state.focus_session_task().is_none());
    let info = h.notifications(NotificationKind::Info);
    assert!(info.iter().any(|n| n.message.contains("write the report")));
}

#[tokio::test(start_paused = true)]
async fn test_deactivation_clears_focus_and_cancels_timer() {
    let mut h = harness();
    h.kibo.start_focus_session("deep work", 25).await;
    assert!(h.kibo.focus_timer_armed());
    h.drain();

    h.kibo.set_active(false).await;

    let state = h.kibo.state();
    assert!(!state.is_kibo_active);
    assert!(!state.is_focus_mode_active());
    assert!(state.focus_session_end_time().is_none());
    assert!(!h.kibo.focus_timer_armed());

    advance(26 * 60).await;
    assert!(h.notifications(NotificationKind::Info).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_new_focus_session_replaces_old_timer() {
    let mut h = harness();
    h.kibo.start_focus_session("first", 1).await;
    h.kibo.start_focus_session("second", 5).await;
    h.drain();

    advance(120).await;
    let state = h.kibo.state();
    assert_eq!(state.focus_session_task(), Some("second"));
    assert!(h.notifications(NotificationKind::Info).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_reminder_poller_alerts_each_tick_until_completed() {
    let mut h = harness();
    let reminder = h
        .kibo
        .add_reminder("drink water", Utc::now() - chrono::Duration::seconds(1));
    h.kibo.start();
    h.drain();

    advance(11).await;
    assert_eq!(h.notifications(NotificationKind::Reminder).len(), 1);

    advance(10).await;
    assert_eq!(h.notifications(NotificationKind::Reminder).len(), 1);

    h.kibo.toggle_reminder(&reminder.id);
    advance(10).await;
    assert!(h.notifications(NotificationKind::Reminder).is_empty());
    h.kibo.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_deactivation_stops_reminder_poller() {
    let mut h = harness();
    h.kibo
        .add_reminder("call back", Utc::now() - chrono::Duration::seconds(1));
    h.kibo.start();
    h.kibo.set_active(false).await;
    h.drain();

    advance(60).await;
    assert!(h.notifications(NotificationKind::Reminder).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_idle_remark_after_silence() {
    let h = harness();
    h.kibo.start();

    advance(179).await;
    assert_eq!(h.ai.count("fun_fact"), 0);

    advance(2).await;
    assert_eq!(h.ai.count("fun_fact"), 1);
    let state = h.kibo.state();
    assert_eq!(state.messages.len(), 1);
    assert_eq!(state.messages[0].role, Role::Model);
    h.kibo.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_activity_restarts_idle_timer() {
    let h = harness();
    h.kibo.start();

    advance(100).await;
    h.kibo.dispatch(Some("hello".into()), None).await;

    advance(100).await;
    assert_eq!(h.ai.count("fun_fact"), 0);

    advance(90).await;
    assert_eq!(h.ai.count("fun_fact"), 1);
    h.kibo.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_idle_remark_skipped_when_busy() {
    let h = harness();
    h.kibo.start();
    h.kibo.store().update(|s| s.status = Status::Thinking);

    advance(181).await;
    assert_eq!(h.ai.count("fun_fact"), 0);
    h.kibo.shutdown();
}

fn proactive_config() -> Config {
    Config {
        idle_prompt_seconds: 3600,
        ..Config::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_proactive_suggestion_is_spoken() {
    let h = harness_with(proactive_config());
    h.ai.set_suggestion("You have an unsaved file open.");
    h.kibo.set_proactive_mode(true);

    advance(91).await;
    assert_eq!(h.ai.count("proactive_suggestion"), 1);
    assert_eq!(h.ai.count("text_to_speech"), 1);
    let state = h.kibo.state();
    assert_eq!(state.messages.len(), 1);
    assert_eq!(state.messages[0].text(), "You have an unsaved file open.");
    h.kibo.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_proactive_sentinel_stays_quiet() {
    let h = harness_with(proactive_config());
    h.ai.set_suggestion(NO_SUGGESTION);
    h.kibo.set_proactive_mode(true);

    advance(181).await;
    assert_eq!(h.ai.count("proactive_suggestion"), 2);
    assert!(h.kibo.state().messages.is_empty());
    h.kibo.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_proactive_failure_turns_mode_off() {
    let mut h = harness_with(proactive_config());
    h.ai.fail("proactive_suggestion");
    h.kibo.set_proactive_mode(true);

    advance(91).await;
    assert!(!h.kibo.state().is_proactive_mode);
    assert_eq!(h.notifications(NotificationKind::Error).len(), 1);

    advance(200).await;
    assert_eq!(h.ai.count("proactive_suggestion"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_proactive_screen_denied_is_actionable() {
    let mut h = harness_with(proactive_config());
    *h.devices.deny_screen.lock().unwrap() = true;
    h.kibo.set_proactive_mode(true);

    advance(91).await;
    assert!(!h.kibo.state().is_proactive_mode);
    let errors = h.notifications(NotificationKind::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("grant screen recording permission"));
}

#[tokio::test(start_paused = true)]
async fn test_proactive_skips_while_busy() {
    let h = harness_with(proactive_config());
    h.ai.set_suggestion("Try a shortcut.");
    h.kibo.set_proactive_mode(true);
    h.kibo.store().update(|s| s.is_loading = true);

    advance(91).await;
    assert_eq!(h.ai.count("proactive_suggestion"), 0);
    assert!(h.kibo.state().is_proactive_mode);
    h.kibo.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_notification_slot_auto_dismisses_latest_only() {
    let mut h = harness();
    h.kibo.notify(NotificationKind::Info, "first");
    advance(5).await;
    h.kibo.notify(NotificationKind::Info, "second");

    advance(6).await;
    let current = h.kibo.state().notification;
    assert_eq!(current.map(|n| n.message), Some("second".to_string()));

    advance(5).await;
    assert!(h.kibo.state().notification.is_none());
    assert!(h
        .drain()
        .iter()
        .any(|e| matches!(e, KiboEvent::NotificationCleared)));
}

#[tokio::test(start_paused = true)]
async fn test_reaction_clears_itself() {
    let h = harness();
    h.kibo.react(Reaction::Acknowledge);
    assert_eq!(h.kibo.state().reaction, Some(Reaction::Acknowledge));

    advance(2).await;
    assert!(h.kibo.state().reaction.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_proactive_off_mid_speech_returns_to_idle() {
    let h = harness_with_audio(proactive_config(), Arc::new(SlowAudio(Duration::from_secs(5))));
    h.ai.set_suggestion("Take a break!");
    h.kibo.set_proactive_mode(true);

    advance(91).await;
    assert_eq!(h.kibo.state().status, Status::Speaking);

    h.kibo.set_proactive_mode(false);
    advance(1).await;
    assert_eq!(h.kibo.state().status, Status::Idle);
    h.kibo.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_cancelling_focus_during_wrap_up_returns_to_idle() {
    let h = harness_with_audio(Config::default(), Arc::new(SlowAudio(Duration::from_secs(5))));
    h.kibo.start_focus_session("inbox zero", 1).await;
    assert_eq!(h.kibo.state().status, Status::Idle);

    // Expiry at 60s; the wrap-up is still playing a second later.
    advance(56).await;
    assert_eq!(h.kibo.state().status, Status::Speaking);

    h.kibo.cancel_focus_session();
    advance(1).await;
    assert_eq!(h.kibo.state().status, Status::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_focus_session_ignored_while_inactive() {
    let h = harness();
    h.kibo.set_active(false).await;

    h.kibo.start_focus_session("deep work", 25).await;
    assert!(!h.kibo.state().is_focus_mode_active());
    assert!(!h.kibo.focus_timer_armed());

    h.ai.push_chat(ChatReply {
        text: "Focus time!".into(),
        directives: vec![Directive::StartFocusSession {
            task: "taxes".into(),
            duration_minutes: 30,
        }],
    });
    h.kibo.dispatch(Some("help me focus".into()), None).await;

    let state = h.kibo.state();
    assert!(!state.is_focus_mode_active());
    assert!(state.focus_session_end_time().is_none());
    assert!(!h.kibo.focus_timer_armed());
}
