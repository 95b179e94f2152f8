use crate::registry::{ConnId, PeerHandle};
use sigrelay_common::{Pin, Role, ServerMessage};

/// Role and pin a connection registered with. Fixed for the connection's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Role taken by the connection.
    pub role: Role,
    /// Pin the connection registered under.
    pub pin: Pin,
}

/// Per-connection state tracked for the lifetime of one connection.
#[derive(Debug)]
pub struct ConnContext {
    handle: PeerHandle,
    registration: Option<Registration>,
}

impl ConnContext {
    /// Start tracking a freshly accepted, unregistered connection.
    #[must_use]
    pub fn new(handle: PeerHandle) -> Self {
        Self {
            handle,
            registration: None,
        }
    }

    /// Connection identifier.
    #[must_use]
    pub fn id(&self) -> ConnId {
        self.handle.id
    }

    /// Handle other connections use to reach this one.
    #[must_use]
    pub fn handle(&self) -> &PeerHandle {
        &self.handle
    }

    /// The registration, if the connection has registered.
    #[must_use]
    pub fn registration(&self) -> Option<&Registration> {
        self.registration.as_ref()
    }

    /// Assigned role, if registered.
    #[must_use]
    pub fn role(&self) -> Option<Role> {
        self.registration.as_ref().map(|r| r.role)
    }

    /// Record the registration. Only the first call takes effect.
    pub(crate) fn register(&mut self, role: Role, pin: Pin) -> bool {
        if self.registration.is_some() {
            return false;
        }
        self.registration = Some(Registration { role, pin });
        true
    }

    /// Send `msg` back to this connection.
    pub fn reply(&self, msg: &ServerMessage) -> bool {
        self.handle.deliver(msg)
    }
}
