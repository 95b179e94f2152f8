//! Metric names and recording helpers.
//!
//! Without an installed recorder these calls are no-ops, so library code and
//! tests can record unconditionally.

/// Connection and session gauges.
pub mod gauges {
    /// Increment the active connections gauge.
    pub fn inc_connections_active() {
        metrics::gauge!("sigrelay_connections_active").increment(1.0);
    }

    /// Decrement the active connections gauge.
    pub fn dec_connections_active() {
        metrics::gauge!("sigrelay_connections_active").decrement(1.0);
    }

    /// Increment the live sessions gauge.
    pub fn inc_sessions_active() {
        metrics::gauge!("sigrelay_sessions_active").increment(1.0);
    }

    /// Decrement the live sessions gauge.
    pub fn dec_sessions_active() {
        metrics::gauge!("sigrelay_sessions_active").decrement(1.0);
    }
}

/// Event counters.
pub mod counters {
    /// Record a registration attempt for `role` with the given outcome.
    pub fn registrations_total(role: &'static str, status: &'static str) {
        metrics::counter!("sigrelay_registrations_total", "role" => role, "status" => status)
            .increment(1);
    }

    /// Increment the relayed-messages counter for a message kind.
    pub fn messages_relayed_total(kind: &'static str) {
        metrics::counter!("sigrelay_messages_relayed_total", "kind" => kind).increment(1);
    }

    /// Increment the dropped-messages counter with the given reason label.
    pub fn messages_dropped_total(reason: &'static str) {
        metrics::counter!("sigrelay_messages_dropped_total", "reason" => reason).increment(1);
    }

    /// Increment the protocol error counter.
    pub fn protocol_errors_total(kind: &'static str) {
        metrics::counter!("sigrelay_protocol_errors_total", "kind" => kind).increment(1);
    }
}
