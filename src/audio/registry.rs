use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

use super::{session::Session, SessionKey};

/// Guild → session map. Creation and removal are always explicit.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionKey, Arc<Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: SessionKey) -> Option<Arc<Session>> {
        self.sessions.get(&key).map(|entry| entry.clone())
    }

    pub fn get_or_create<F>(&self, key: SessionKey, create: F) -> Arc<Session>
    where
        F: FnOnce() -> Arc<Session>,
    {
        self.sessions
            .entry(key)
            .or_insert_with(|| {
                info!("🆕 Sesión creada para guild {}", key);
                create()
            })
            .clone()
    }

    /// Removes `session` only if it is still the one registered under `key`.
    pub fn remove_if_same(&self, key: SessionKey, session: &Arc<Session>) -> bool {
        let removed = self
            .sessions
            .remove_if(&key, |_, current| Arc::ptr_eq(current, session))
            .is_some();
        if removed {
            info!("🗑️ Sesión eliminada para guild {}", key);
        }
        removed
    }

    /// Snapshot of the live sessions; the map is not locked while they are used.
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
