//! SessionStore — atomic read-modify-write over the session state, with
//! write-through persistence of the durable subset.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::state::*;
use crate::storage::KeyValueStore;

pub struct SessionStore {
    tx: watch::Sender<SessionState>,
    storage: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    /// Build the initial state from storage. Absent or malformed keys keep their defaults.
    pub fn load(storage: Arc<dyn KeyValueStore>, default_language: &str) -> Self {
        let mut state = SessionState::new(default_language);

        load_key(storage.as_ref(), KEY_REMINDERS, &mut state.reminders);
        load_key(storage.as_ref(), KEY_VOICE, &mut state.voice);
        load_key(storage.as_ref(), KEY_ANIMATION_PACK, &mut state.animation_pack);
        load_key(storage.as_ref(), KEY_AVATAR_STYLE, &mut state.avatar_style);
        load_key(storage.as_ref(), KEY_PROACTIVE_MODE, &mut state.is_proactive_mode);
        load_key(storage.as_ref(), KEY_LEARNED_FACTS, &mut state.learned_facts);
        load_key(storage.as_ref(), KEY_MOOD_HISTORY, &mut state.mood_history);
        load_key(storage.as_ref(), KEY_KIBO_ACTIVE, &mut state.is_kibo_active);
        load_key(storage.as_ref(), KEY_FLOATING_MODE, &mut state.is_floating_mode);

        // Reminder ids must stay unique even if the file was edited by hand.
        let mut seen = std::collections::HashSet::new();
        state.reminders.retain(|r| seen.insert(r.id.clone()));

        info!(
            "Loaded session: {} reminders, {} facts, {} mood entries",
            state.reminders.len(),
            state.learned_facts.len(),
            state.mood_history.len()
        );

        let (tx, _) = watch::channel(state);
        Self { tx, storage }
    }

    /// Snapshot of the current state.
    pub fn get(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    /// Read without cloning the whole state.
    pub fn read<R>(&self, f: impl FnOnce(&SessionState) -> R) -> R {
        f(&self.tx.borrow())
    }

    /// Apply `f` atomically; observers never see a half-applied change.
    /// `f` must not call back into the store.
    pub fn update<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut outcome = None;
        self.tx.send_modify(|state| {
            let before = PersistedFields::from_state(state);
            let result = f(state);
            let after = PersistedFields::from_state(state);
            let changed = if after == before {
                Vec::new()
            } else {
                after.changed_entries(&before, state)
            };
            outcome = Some((result, changed));
        });
        let (result, changed) = outcome.expect("send_modify always runs its closure");

        for (key, value) in changed {
            if let Err(e) = self.storage.set(key, &value) {
                error!("Failed to persist {}: {}", key, e);
            }
        }
        result
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }
}

fn load_key<T: DeserializeOwned>(storage: &dyn KeyValueStore, key: &str, slot: &mut T) {
    match storage.get(key) {
        Ok(Some(value)) => match serde_json::from_value(value) {
            Ok(v) => *slot = v,
            Err(e) => warn!("Ignoring malformed {}: {}", key, e),
        },
        Ok(None) => {}
        Err(e) => warn!("Failed to load {}: {}", key, e),
    }
}
