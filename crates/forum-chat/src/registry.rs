use std::collections::HashMap;
use std::sync::Arc;

use forum_core::PeerId;
use parking_lot::Mutex;

use crate::session::PeerSession;

/// Registry of all live chat sessions, keyed by remote endpoint.
///
/// The lock is only held to update or walk the map. Nothing awaits while
/// holding it.
#[derive(Default)]
pub struct ConnectionRegistry {
    sessions: Mutex<HashMap<PeerId, Arc<PeerSession>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session under its own id, replacing whatever was there.
    /// The replaced session, if any, is handed back so the caller can shut
    /// it down.
    pub fn register(&self, session: Arc<PeerSession>) -> Option<Arc<PeerSession>> {
        self.sessions.lock().insert(session.id().clone(), session)
    }

    /// Remove a session by ID. Absent ids are ignored.
    pub fn unregister(&self, id: &PeerId) {
        self.sessions.lock().remove(id);
    }

    /// Remove `session` only if it is still the one registered under its id.
    /// A session that was displaced by a reconnect must not evict its
    /// replacement on the way out.
    pub fn unregister_session(&self, session: &PeerSession) -> bool {
        let mut sessions = self.sessions.lock();
        match sessions.get(session.id()) {
            Some(current) if current.connection_id() == session.connection_id() => {
                sessions.remove(session.id());
                true
            }
            _ => false,
        }
    }

    /// Call `f` for every registered session except `exclude`, under the
    /// registry lock. `f` must not block or touch the registry.
    pub fn for_each_except<F>(&self, exclude: &PeerId, mut f: F)
    where
        F: FnMut(&Arc<PeerSession>),
    {
        let sessions = self.sessions.lock();
        for (id, session) in sessions.iter() {
            if id != exclude {
                f(session);
            }
        }
    }

    pub fn get(&self, id: &PeerId) -> Option<Arc<PeerSession>> {
        self.sessions.lock().get(id).cloned()
    }

    pub fn contains(&self, id: &PeerId) -> bool {
        self.sessions.lock().contains_key(id)
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Ask every registered session to shut down. Each one unregisters
    /// itself as it goes.
    pub fn shutdown_all(&self) -> usize {
        let sessions: Vec<Arc<PeerSession>> = self.sessions.lock().values().cloned().collect();
        for session in &sessions {
            session.shutdown();
        }
        sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: &str) -> Arc<PeerSession> {
        PeerSession::new(PeerId::from_raw(id), 4).0
    }

    #[test]
    fn register_and_unregister() {
        let registry = ConnectionRegistry::new();
        assert!(registry.is_empty());

        registry.register(session("10.0.0.1:1"));
        registry.register(session("10.0.0.2:2"));
        assert_eq!(registry.len(), 2);

        registry.unregister(&PeerId::from_raw("10.0.0.1:1"));
        assert_eq!(registry.len(), 1);
        assert!(!registry.contains(&PeerId::from_raw("10.0.0.1:1")));
        assert!(registry.contains(&PeerId::from_raw("10.0.0.2:2")));
    }

    #[test]
    fn unregister_absent_is_noop() {
        let registry = ConnectionRegistry::new();
        registry.register(session("a:1"));

        registry.unregister(&PeerId::from_raw("ghost:0"));
        registry.unregister(&PeerId::from_raw("ghost:0"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn size_tracks_register_minus_present_unregister() {
        let registry = ConnectionRegistry::new();
        let mut expected = 0usize;

        for i in 0..20 {
            registry.register(session(&format!("h:{i}")));
            expected += 1;
        }
        // Every third id twice; the second removal must not count.
        for i in (0..20).step_by(3) {
            let id = PeerId::from_raw(format!("h:{i}"));
            if registry.contains(&id) {
                expected -= 1;
            }
            registry.unregister(&id);
            registry.unregister(&id);
        }
        assert_eq!(registry.len(), expected);
    }

    #[test]
    fn register_overwrites_and_returns_displaced() {
        let registry = ConnectionRegistry::new();
        let old = session("same:1");
        let new = session("same:1");

        assert!(registry.register(Arc::clone(&old)).is_none());
        let displaced = registry.register(Arc::clone(&new)).unwrap();

        assert_eq!(displaced.connection_id(), old.connection_id());
        assert_eq!(registry.len(), 1);
        let current = registry.get(&PeerId::from_raw("same:1")).unwrap();
        assert_eq!(current.connection_id(), new.connection_id());
    }

    #[test]
    fn unregister_session_ignores_stale_session() {
        let registry = ConnectionRegistry::new();
        let old = session("same:1");
        let new = session("same:1");
        registry.register(Arc::clone(&old));
        registry.register(Arc::clone(&new));

        assert!(!registry.unregister_session(&old));
        assert_eq!(registry.len(), 1);

        assert!(registry.unregister_session(&new));
        assert!(registry.is_empty());
    }

    #[test]
    fn for_each_except_skips_excluded() {
        let registry = ConnectionRegistry::new();
        for id in ["p1:1", "p2:2", "p3:3"] {
            registry.register(session(id));
        }

        let mut seen = Vec::new();
        registry.for_each_except(&PeerId::from_raw("p1:1"), |s| {
            seen.push(s.id().as_str().to_string());
        });
        seen.sort();
        assert_eq!(seen, vec!["p2:2", "p3:3"]);
    }

    #[test]
    fn for_each_except_unknown_visits_all() {
        let registry = ConnectionRegistry::new();
        registry.register(session("p1:1"));
        registry.register(session("p2:2"));

        let mut count = 0;
        registry.for_each_except(&PeerId::from_raw("nobody:0"), |_| count += 1);
        assert_eq!(count, 2);
    }

    #[test]
    fn shutdown_all_signals_every_session() {
        let registry = ConnectionRegistry::new();
        let a = session("a:1");
        let b = session("b:2");
        registry.register(Arc::clone(&a));
        registry.register(Arc::clone(&b));

        assert_eq!(registry.shutdown_all(), 2);
        assert!(a.shutdown_requested());
        assert!(b.shutdown_requested());
        // Signalled, not yet torn down: no loops are running here.
        assert_eq!(registry.len(), 2);
    }
}
