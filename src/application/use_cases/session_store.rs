use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, info};
use uuid::Uuid;

use crate::application::use_cases::session_flow::{PreviewLimits, SessionFlow};
use crate::infrastructure::csv::TableEncoder;
use crate::infrastructure::feather::TableDecoder;

struct SessionSlot {
    flow: Arc<Mutex<SessionFlow>>,
    last_seen: Instant,
}

/// One [`SessionFlow`] per browser session.
///
/// The registry lock is only held to look up a slot; each flow has its own
/// lock, so a slow decode never blocks other sessions.
pub struct SessionStore {
    sessions: Mutex<HashMap<Uuid, SessionSlot>>,
    decoder: Arc<dyn TableDecoder + Send + Sync>,
    encoder: Arc<dyn TableEncoder + Send + Sync>,
    limits: PreviewLimits,
    idle_timeout: Duration,
    max_sessions: usize,
}

impl SessionStore {
    pub fn new(
        decoder: Arc<dyn TableDecoder + Send + Sync>,
        encoder: Arc<dyn TableEncoder + Send + Sync>,
        limits: PreviewLimits,
        idle_timeout: Duration,
        max_sessions: usize,
    ) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            decoder,
            encoder,
            limits,
            idle_timeout,
            max_sessions: max_sessions.max(1),
        }
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<Uuid, SessionSlot>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn slot(&self, id: Uuid) -> Arc<Mutex<SessionFlow>> {
        let mut sessions = self.registry();
        let now = Instant::now();

        if let Some(slot) = sessions.get_mut(&id) {
            slot.last_seen = now;
            return slot.flow.clone();
        }

        let flow = Arc::new(Mutex::new(SessionFlow::new(
            self.decoder.clone(),
            self.encoder.clone(),
            self.limits,
        )));
        sessions.insert(
            id,
            SessionSlot {
                flow: flow.clone(),
                last_seen: now,
            },
        );
        debug!(session_id = %id, "Session created");

        while sessions.len() > self.max_sessions {
            let oldest = sessions
                .iter()
                .filter(|(key, _)| **key != id)
                .min_by_key(|(_, slot)| slot.last_seen)
                .map(|(key, _)| *key);
            match oldest {
                Some(key) => {
                    sessions.remove(&key);
                    info!(session_id = %key, "Session evicted (capacity)");
                }
                None => break,
            }
        }

        flow
    }

    /// Runs `f` against the session's flow, creating the session on first use.
    pub fn with_session<T>(&self, id: Uuid, f: impl FnOnce(&mut SessionFlow) -> T) -> T {
        let flow = self.slot(id);
        let mut guard = flow.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.registry().contains_key(&id)
    }

    pub fn remove(&self, id: Uuid) -> bool {
        self.registry().remove(&id).is_some()
    }

    /// Drops sessions idle longer than the timeout; returns how many.
    pub fn evict_idle(&self) -> usize {
        self.evict_idle_at(Instant::now())
    }

    fn evict_idle_at(&self, now: Instant) -> usize {
        let mut sessions = self.registry();
        let before = sessions.len();
        sessions.retain(|_, slot| now.saturating_duration_since(slot.last_seen) < self.idle_timeout);
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.registry().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::{SessionEvent, SessionState};
    use crate::domain::upload::UploadedFile;
    use crate::infrastructure::csv::CsvEncoder;
    use crate::infrastructure::feather::FeatherDecoder;

    fn store(max_sessions: usize) -> SessionStore {
        SessionStore::new(
            Arc::new(FeatherDecoder::new()),
            Arc::new(CsvEncoder::new()),
            PreviewLimits::default(),
            Duration::from_secs(60),
            max_sessions,
        )
    }

    #[test]
    fn test_sessions_are_isolated() {
        let store = store(8);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        store.with_session(a, |flow| {
            flow.handle(SessionEvent::FileSelected(UploadedFile::new(
                "x.feather",
                b"garbage".to_vec(),
            )))
            .map(|_| ())
        })
        .unwrap();

        let a_state = store.with_session(a, |flow| flow.state().name());
        let b_state = store.with_session(b, |flow| flow.state().name());
        assert_eq!(a_state, "error");
        assert_eq!(b_state, "idle");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let store = store(2);
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let third = Uuid::new_v4();

        store.with_session(first, |_| ());
        std::thread::sleep(Duration::from_millis(2));
        store.with_session(second, |_| ());
        std::thread::sleep(Duration::from_millis(2));
        store.with_session(first, |_| ());
        store.with_session(third, |_| ());

        assert_eq!(store.len(), 2);
        assert!(store.contains(first));
        assert!(!store.contains(second));
        assert!(store.contains(third));
    }

    #[test]
    fn test_idle_sessions_are_evicted() {
        let store = store(8);
        let id = Uuid::new_v4();
        store.with_session(id, |_| ());

        assert_eq!(store.evict_idle(), 0);
        let later = Instant::now() + Duration::from_secs(61);
        assert_eq!(store.evict_idle_at(later), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_forgets_session() {
        let store = store(8);
        let id = Uuid::new_v4();
        store.with_session(id, |_| ());
        assert!(store.remove(id));
        assert!(!store.remove(id));
        let fresh = store.with_session(id, |flow| matches!(flow.state(), SessionState::Idle));
        assert!(fresh);
    }
}
