//! Connection teardown: releases a closed connection's session slot.

use crate::context::ConnContext;
use crate::error::SignalError;
use crate::registry::SessionRegistry;
use sigrelay_common::{Role, ServerMessage};
use tracing::debug;

/// Handle the close of `ctx`'s connection. Must run exactly once per connection.
///
/// Clears the slot the connection registered into (if it still holds it),
/// tells an open dashboard when its camera left, then collects the session
/// if it is now empty. A connection that never registered touches nothing.
pub fn on_close(registry: &SessionRegistry, ctx: &ConnContext) {
    let Some(reg) = ctx.registration() else {
        debug!(conn = ctx.id(), "unregistered connection closed");
        return;
    };

    if let Some(session) = registry.clear_slot(&reg.pin, reg.role, ctx.id()) {
        debug!(conn = ctx.id(), role = %reg.role, pin = %reg.pin, "slot released");
        // Dashboard departures are not announced to the camera.
        if reg.role == Role::Camera {
            if let Some(dashboard) = session.open_peer(Role::Dashboard) {
                dashboard.deliver(&ServerMessage::CameraOffline {
                    pin: reg.pin.clone(),
                });
            }
        }
    }

    registry.try_collect(&reg.pin);
}

/// Report a transport failure. Cleanup is left to [`on_close`].
pub fn on_transport_error(ctx: &ConnContext, err: &SignalError) {
    match ctx.registration() {
        Some(reg) => debug!(
            conn = ctx.id(),
            role = %reg.role,
            pin = %reg.pin,
            "transport error: {}",
            err
        ),
        None => debug!(conn = ctx.id(), "transport error: {}", err),
    }
}
