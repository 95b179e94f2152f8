use crate::metrics::{counters, gauges};
use dashmap::mapref::entry::Entry;
use dashmap::mapref::one::{Ref, RefMut};
use dashmap::DashMap;
use sigrelay_common::{Pin, Role, ServerMessage};
use tokio::sync::mpsc;

/// Process-unique identifier assigned to each accepted connection.
pub type ConnId = u64;

/// Handle held in a session slot, used to send text frames to a connection.
#[derive(Clone, Debug)]
pub struct PeerHandle {
    /// Identifier of the connection this handle delivers to.
    pub id: ConnId,
    /// Sender half of the connection's outbound queue.
    pub tx: mpsc::Sender<String>,
}

impl PeerHandle {
    /// Wrap the outbound queue of connection `id`.
    #[must_use]
    pub fn new(id: ConnId, tx: mpsc::Sender<String>) -> Self {
        Self { id, tx }
    }

    /// Whether the connection task still drains this handle's queue.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Queue `msg` for delivery without waiting.
    ///
    /// Returns `false` if the message was dropped because the queue is full
    /// or the connection has gone away.
    pub fn deliver(&self, msg: &ServerMessage) -> bool {
        let text = match msg.to_text() {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(conn = self.id, kind = msg.kind(), "failed to encode message: {}", e);
                return false;
            }
        };
        match self.tx.try_send(text) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                counters::messages_dropped_total("queue_full");
                tracing::debug!(conn = self.id, kind = msg.kind(), "outbound queue full, dropping");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                counters::messages_dropped_total("closed");
                false
            }
        }
    }
}

/// Paired-connection state for a single pin.
#[derive(Debug, Default)]
pub struct Session {
    /// Camera slot.
    pub camera: Option<PeerHandle>,
    /// Dashboard slot.
    pub dashboard: Option<PeerHandle>,
}

impl Session {
    /// The handle in `role`'s slot, open or not.
    #[must_use]
    pub fn slot(&self, role: Role) -> Option<&PeerHandle> {
        match role {
            Role::Camera => self.camera.as_ref(),
            Role::Dashboard => self.dashboard.as_ref(),
        }
    }

    fn slot_mut(&mut self, role: Role) -> &mut Option<PeerHandle> {
        match role {
            Role::Camera => &mut self.camera,
            Role::Dashboard => &mut self.dashboard,
        }
    }

    /// The handle in `role`'s slot if its connection is still open.
    #[must_use]
    pub fn open_peer(&self, role: Role) -> Option<&PeerHandle> {
        self.slot(role).filter(|handle| handle.is_open())
    }

    /// Put `handle` in `role`'s slot, returning whatever it replaced.
    pub fn occupy(&mut self, role: Role, handle: PeerHandle) -> Option<PeerHandle> {
        self.slot_mut(role).replace(handle)
    }

    /// Returns `true` if both slots are absent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.camera.is_none() && self.dashboard.is_none()
    }
}

/// Concurrent pin → session table.
///
/// Each method locks only the shard holding the pin. A guard returned by
/// [`get_or_create`](Self::get_or_create), [`get`](Self::get) or
/// [`clear_slot`](Self::clear_slot) keeps that pin's session locked until it
/// is dropped, so callers must not touch the registry again while holding one.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<Pin, Session>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Return the session for `pin`, creating an empty one if absent.
    pub fn get_or_create(&self, pin: &str) -> RefMut<'_, Pin, Session> {
        match self.sessions.entry(pin.to_owned()) {
            Entry::Occupied(entry) => entry.into_ref(),
            Entry::Vacant(entry) => {
                gauges::inc_sessions_active();
                tracing::debug!(pin, "session created");
                entry.insert(Session::default())
            }
        }
    }

    /// Read-only lookup; never creates.
    #[must_use]
    pub fn get(&self, pin: &str) -> Option<Ref<'_, Pin, Session>> {
        self.sessions.get(pin)
    }

    /// Clear `role`'s slot of `pin` if `holder` still occupies it.
    ///
    /// On success the session stays locked in the returned guard so the
    /// caller can notify the remaining peer before anyone else sees the
    /// cleared slot. Returns `None` if the session is gone or the slot is
    /// empty or held by another connection.
    pub fn clear_slot(
        &self,
        pin: &str,
        role: Role,
        holder: ConnId,
    ) -> Option<RefMut<'_, Pin, Session>> {
        let mut session = self.sessions.get_mut(pin)?;
        let slot = session.slot_mut(role);
        if slot.as_ref().is_some_and(|handle| handle.id == holder) {
            *slot = None;
            Some(session)
        } else {
            None
        }
    }

    /// Remove `pin`'s session if both slots are absent.
    ///
    /// Idempotent. Returns `true` only when this call removed the entry.
    pub fn try_collect(&self, pin: &str) -> bool {
        let removed = self
            .sessions
            .remove_if(pin, |_, session| session.is_empty())
            .is_some();
        if removed {
            gauges::dec_sessions_active();
            tracing::debug!(pin, "session collected");
        }
        removed
    }

    /// Returns `true` if a session exists for `pin`.
    #[must_use]
    pub fn contains(&self, pin: &str) -> bool {
        self.sessions.contains_key(pin)
    }

    /// Pins whose camera connection is currently open, sorted.
    #[must_use]
    pub fn camera_pins(&self) -> Vec<Pin> {
        let mut pins: Vec<Pin> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().open_peer(Role::Camera).is_some())
            .map(|entry| entry.key().clone())
            .collect();
        pins.sort();
        pins
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if no session is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_handle(id: ConnId) -> (PeerHandle, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(4);
        (PeerHandle::new(id, tx), rx)
    }

    #[test]
    fn get_or_create_creates_empty_session_once() {
        let registry = SessionRegistry::new();
        assert!(registry.is_empty());

        assert!(registry.get_or_create("123").is_empty());
        assert_eq!(registry.len(), 1);

        let (handle, _rx) = make_handle(1);
        registry.get_or_create("123").occupy(Role::Camera, handle);

        let session = registry.get_or_create("123");
        assert_eq!(session.camera.as_ref().map(|h| h.id), Some(1));
        drop(session);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn get_on_missing_pin_returns_none_and_does_not_create() {
        let registry = SessionRegistry::new();
        assert!(registry.get("nope").is_none());
        assert!(!registry.contains("nope"));
        assert!(registry.is_empty());
    }

    #[test]
    fn pins_are_case_sensitive() {
        let registry = SessionRegistry::new();
        drop(registry.get_or_create("abc"));
        assert!(registry.get("ABC").is_none());
        assert!(registry.get("abc").is_some());
    }

    #[test]
    fn occupy_returns_replaced_handle() {
        let mut session = Session::default();
        let (first, _rx1) = make_handle(1);
        let (second, _rx2) = make_handle(2);

        assert!(session.occupy(Role::Dashboard, first).is_none());
        let old = session.occupy(Role::Dashboard, second);
        assert_eq!(old.map(|h| h.id), Some(1));
        assert_eq!(session.dashboard.as_ref().map(|h| h.id), Some(2));
    }

    #[test]
    fn open_peer_ignores_closed_handles() {
        let mut session = Session::default();
        let (handle, rx) = make_handle(1);
        session.occupy(Role::Camera, handle);
        assert!(session.open_peer(Role::Camera).is_some());

        drop(rx);
        assert!(session.slot(Role::Camera).is_some());
        assert!(session.open_peer(Role::Camera).is_none());
    }

    #[test]
    fn clear_slot_requires_matching_holder() {
        let registry = SessionRegistry::new();
        let (handle, _rx) = make_handle(7);
        registry.get_or_create("p").occupy(Role::Camera, handle);

        assert!(registry.clear_slot("p", Role::Camera, 8).is_none());
        assert!(registry.get("p").unwrap().camera.is_some());

        assert!(registry.clear_slot("p", Role::Dashboard, 7).is_none());

        let session = registry.clear_slot("p", Role::Camera, 7).unwrap();
        assert!(session.camera.is_none());
    }

    #[test]
    fn clear_slot_on_missing_pin_is_noop() {
        let registry = SessionRegistry::new();
        assert!(registry.clear_slot("ghost", Role::Dashboard, 1).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn try_collect_keeps_occupied_sessions() {
        let registry = SessionRegistry::new();
        let (handle, _rx) = make_handle(1);
        registry.get_or_create("p").occupy(Role::Dashboard, handle);

        assert!(!registry.try_collect("p"));
        assert!(registry.contains("p"));
    }

    #[test]
    fn try_collect_removes_empty_session_and_is_idempotent() {
        let registry = SessionRegistry::new();
        let (handle, _rx) = make_handle(1);
        registry.get_or_create("p").occupy(Role::Camera, handle);

        drop(registry.clear_slot("p", Role::Camera, 1));
        assert!(registry.try_collect("p"));
        assert!(!registry.contains("p"));
        assert!(!registry.try_collect("p"));
        assert!(!registry.try_collect("never-existed"));
    }

    #[test]
    fn camera_pins_lists_only_open_cameras() {
        let registry = SessionRegistry::new();
        let (cam_b, _rx_b) = make_handle(1);
        let (cam_a, _rx_a) = make_handle(2);
        let (cam_closed, rx_closed) = make_handle(3);
        let (dash, _rx_d) = make_handle(4);

        registry.get_or_create("b").occupy(Role::Camera, cam_b);
        registry.get_or_create("a").occupy(Role::Camera, cam_a);
        registry.get_or_create("c").occupy(Role::Camera, cam_closed);
        registry.get_or_create("d").occupy(Role::Dashboard, dash);
        drop(rx_closed);

        assert_eq!(registry.camera_pins(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn deliver_queues_serialized_message() {
        let (handle, mut rx) = make_handle(1);
        assert!(handle.deliver(&ServerMessage::CameraOffline {
            pin: "9".to_string()
        }));
        let text = rx.recv().await.unwrap();
        assert_eq!(
            ServerMessage::from_text(&text).unwrap(),
            ServerMessage::CameraOffline {
                pin: "9".to_string()
            }
        );
    }

    #[test]
    fn deliver_drops_when_full_or_closed() {
        let (tx, rx) = mpsc::channel(1);
        let handle = PeerHandle::new(1, tx);
        let msg = ServerMessage::error("x");

        assert!(handle.deliver(&msg));
        assert!(!handle.deliver(&msg));

        drop(rx);
        assert!(!handle.is_open());
        assert!(!handle.deliver(&msg));
    }
}
