//! Signaling protocol: registration and relay decisions for one inbound message.
//!
//! Every handler performs its registry read-modify-write under a single
//! session guard and only queues outbound messages, so it never waits.

use crate::context::ConnContext;
use crate::metrics::counters;
use crate::registry::SessionRegistry;
use sigrelay_common::{ClientMessage, DecodeError, Pin, Role, ServerMessage};
use tracing::{debug, info};

/// Signaling payloads the relay forwards between the paired peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayKind {
    /// Session description offer.
    Offer,
    /// Session description answer.
    Answer,
    /// ICE candidate.
    Ice,
}

impl RelayKind {
    /// Which slot receives this payload when sent by `sender`.
    ///
    /// The topology is fixed: offers go to the dashboard, answers go to the
    /// camera, candidates go to whichever side did not send them.
    #[must_use]
    pub const fn target(self, sender: Role) -> Role {
        match self {
            Self::Offer => Role::Dashboard,
            Self::Answer => Role::Camera,
            Self::Ice => sender.peer(),
        }
    }

    /// Whether the target connection must still be open, rather than merely
    /// referenced by the session.
    #[must_use]
    pub const fn requires_open_peer(self) -> bool {
        matches!(self, Self::Ice)
    }

    /// Metric label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::Ice => "ice",
        }
    }
}

/// Decode a text frame and handle it.
///
/// Decode failures are answered with an `error` message to the sender only.
pub fn handle_text(registry: &SessionRegistry, ctx: &mut ConnContext, text: &str) {
    match ClientMessage::parse(text) {
        Ok(msg) => handle_message(registry, ctx, msg),
        Err(e) => reject(ctx, &e),
    }
}

/// Answer an undecodable frame.
pub fn reject(ctx: &ConnContext, err: &DecodeError) {
    let kind = match err {
        DecodeError::InvalidJson => "invalid_json",
        DecodeError::UnknownType(_) => "unknown_type",
    };
    counters::protocol_errors_total(kind);
    debug!(conn = ctx.id(), "protocol error: {}", err);
    ctx.reply(&ServerMessage::from(err.clone()));
}

/// Apply one decoded message from `ctx`'s connection.
pub fn handle_message(registry: &SessionRegistry, ctx: &mut ConnContext, msg: ClientMessage) {
    match msg {
        ClientMessage::CameraRegister { pin } => register_camera(registry, ctx, pin),
        ClientMessage::DashboardJoin { pin } => join_dashboard(registry, ctx, pin),
        ClientMessage::Offer { offer } => {
            relay(registry, ctx, RelayKind::Offer, &ServerMessage::Offer { offer });
        }
        ClientMessage::Answer { answer } => {
            relay(registry, ctx, RelayKind::Answer, &ServerMessage::Answer { answer });
        }
        ClientMessage::Ice { candidate } => {
            relay(registry, ctx, RelayKind::Ice, &ServerMessage::Ice { candidate });
        }
    }
}

/// Refuse a second registration on the same connection.
fn already_registered(ctx: &ConnContext, role: Role) -> bool {
    let Some(existing) = ctx.registration() else {
        return false;
    };
    counters::registrations_total(role.as_str(), "duplicate");
    debug!(
        conn = ctx.id(),
        role = %existing.role,
        pin = %existing.pin,
        "registration on an already registered connection"
    );
    ctx.reply(&ServerMessage::error(format!(
        "Connection already registered as {}",
        existing.role
    )));
    true
}

fn register_camera(registry: &SessionRegistry, ctx: &mut ConnContext, pin: Pin) {
    if already_registered(ctx, Role::Camera) {
        return;
    }

    let mut session = registry.get_or_create(&pin);
    if let Some(holder) = session.open_peer(Role::Camera) {
        counters::registrations_total("camera", "conflict");
        info!(conn = ctx.id(), holder = holder.id, pin = %pin, "camera pin already taken");
        ctx.reply(&ServerMessage::error(format!(
            "Camera already registered for pin {pin}"
        )));
        return;
    }

    session.occupy(Role::Camera, ctx.handle().clone());
    ctx.register(Role::Camera, pin.clone());
    counters::registrations_total("camera", "ok");
    debug!(conn = ctx.id(), pin = %pin, "camera registered");

    ctx.reply(&ServerMessage::CameraRegistered { pin: pin.clone() });
    if let Some(dashboard) = session.open_peer(Role::Dashboard) {
        dashboard.deliver(&ServerMessage::CameraOnline { pin });
    }
}

fn join_dashboard(registry: &SessionRegistry, ctx: &mut ConnContext, pin: Pin) {
    if already_registered(ctx, Role::Dashboard) {
        return;
    }

    let mut session = registry.get_or_create(&pin);
    // The previous dashboard, if any, keeps its connection but stops receiving.
    if let Some(previous) = session.occupy(Role::Dashboard, ctx.handle().clone()) {
        debug!(conn = ctx.id(), replaced = previous.id, pin = %pin, "dashboard slot replaced");
    }
    ctx.register(Role::Dashboard, pin.clone());
    counters::registrations_total("dashboard", "ok");
    debug!(conn = ctx.id(), pin = %pin, "dashboard joined");

    match session.open_peer(Role::Camera) {
        Some(camera) => {
            ctx.reply(&ServerMessage::CameraOnline { pin: pin.clone() });
            camera.deliver(&ServerMessage::DashboardReady { pin });
        }
        None => {
            ctx.reply(&ServerMessage::CameraOffline { pin });
        }
    }
}

/// Forward a signaling payload to the sender's paired peer.
///
/// Misses (unregistered sender, no session, no peer) are dropped silently.
fn relay(registry: &SessionRegistry, ctx: &ConnContext, kind: RelayKind, msg: &ServerMessage) {
    let Some(reg) = ctx.registration() else {
        counters::messages_dropped_total("unregistered");
        return;
    };
    let Some(session) = registry.get(&reg.pin) else {
        counters::messages_dropped_total("no_session");
        return;
    };

    let target = kind.target(reg.role);
    let peer = if kind.requires_open_peer() {
        session.open_peer(target)
    } else {
        session.slot(target)
    };

    match peer {
        Some(peer) => {
            if peer.deliver(msg) {
                counters::messages_relayed_total(kind.as_str());
            }
        }
        None => {
            counters::messages_dropped_total("no_peer");
            debug!(conn = ctx.id(), pin = %reg.pin, kind = kind.as_str(), %target, "no peer to relay to");
        }
    }
}
