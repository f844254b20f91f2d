//! Registry of in-flight liveness sessions.
//!
//! Each authentication attempt gets its own isolated [`LivenessSession`] —
//! concurrent attempts never share counters. Sessions that go quiet are
//! evicted lazily on the next registry access, so an abandoned stream
//! cannot pin memory forever.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use liveface_core::LivenessSession;
use uuid::Uuid;

struct Slot {
    session: LivenessSession,
    last_seen: Instant,
}

pub struct SessionRegistry {
    idle_timeout: Duration,
    slots: Mutex<HashMap<Uuid, Slot>>,
}

impl SessionRegistry {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            idle_timeout,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Start a fresh session and return its id.
    pub fn create(&self) -> Uuid {
        let id = Uuid::new_v4();
        let mut slots = self.lock();
        Self::evict_stale(&mut slots, self.idle_timeout);
        slots.insert(
            id,
            Slot {
                session: LivenessSession::new(),
                last_seen: Instant::now(),
            },
        );
        tracing::debug!(session = %id, active = slots.len(), "liveness session created");
        id
    }

    /// Run `f` against the named session, refreshing its idle clock.
    /// Returns `None` for an unknown (or already evicted) id.
    pub fn with_session<T>(&self, id: &Uuid, f: impl FnOnce(&mut LivenessSession) -> T) -> Option<T> {
        let mut slots = self.lock();
        Self::evict_stale(&mut slots, self.idle_timeout);
        let slot = slots.get_mut(id)?;
        slot.last_seen = Instant::now();
        Some(f(&mut slot.session))
    }

    /// Drop a session. Returns whether it existed.
    pub fn remove(&self, id: &Uuid) -> bool {
        self.lock().remove(id).is_some()
    }

    pub fn active(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Slot>> {
        // A poisoned lock only means a panic mid-update of somebody else's
        // session; the map itself stays usable.
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn evict_stale(slots: &mut HashMap<Uuid, Slot>, idle_timeout: Duration) {
        let now = Instant::now();
        slots.retain(|id, slot| {
            let keep = now.duration_since(slot.last_seen) < idle_timeout;
            if !keep {
                tracing::debug!(session = %id, "evicting idle liveness session");
            }
            keep
        });
    }
}
