use axum::http::HeaderValue;
use clap::Parser;
use std::net::SocketAddr;

/// Origin value that permits every cross-origin caller.
pub const ANY_ORIGIN: &str = "*";

/// CLI arguments for the signaling server.
#[derive(Parser, Debug, Clone)]
#[command(name = "sigrelay")]
#[command(about = "Pin-based WebRTC signaling relay")]
#[command(version)]
pub struct Args {
    /// Socket address the WebSocket listener binds to.
    #[arg(long, default_value = "0.0.0.0:8080", env = "SIGRELAY_LISTEN")]
    pub listen: SocketAddr,
    /// Socket address for the health, introspection and metrics endpoint.
    #[arg(long, default_value = "0.0.0.0:8081", env = "SIGRELAY_HTTP_ADDR")]
    pub http_addr: SocketAddr,
    /// Permitted cross-origin value (`*` for any).
    #[arg(long, default_value = ANY_ORIGIN, env = "SIGRELAY_CORS_ORIGIN")]
    pub cors_origin: String,
    /// Maximum total concurrent connections.
    #[arg(long, default_value = "10000", env = "SIGRELAY_MAX_CONNS")]
    pub max_conns: usize,
    /// Largest accepted inbound WebSocket message in bytes.
    #[arg(long, default_value = "65536", env = "SIGRELAY_MAX_MESSAGE_SIZE")]
    pub max_message_size: usize,
    /// Interval between keepalive pings in seconds.
    #[arg(long, default_value = "30", env = "SIGRELAY_PING_INTERVAL")]
    pub ping_interval: u64,
    /// Per-connection outbound queue length.
    #[arg(long, default_value = "256", env = "SIGRELAY_OUTBOUND_QUEUE")]
    pub outbound_queue: usize,
}

/// Runtime configuration derived from [`Args`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address the WebSocket listener binds to.
    pub listen: SocketAddr,
    /// Socket address for the health, introspection and metrics endpoint.
    pub http_addr: SocketAddr,
    /// Permitted cross-origin value (`*` for any).
    pub cors_origin: String,
    /// Maximum total concurrent connections.
    pub max_conns: usize,
    /// Largest accepted inbound WebSocket message in bytes.
    pub max_message_size: usize,
    /// Interval between keepalive pings in seconds.
    pub ping_interval: u64,
    /// Per-connection outbound queue length.
    pub outbound_queue: usize,
}

impl ServerConfig {
    /// Validates the configuration values are within acceptable bounds.
    /// Returns Ok(()) if valid, Err with description otherwise.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_conns == 0 {
            return Err("max_conns must be greater than 0".to_string());
        }
        if self.max_conns > 1_000_000 {
            return Err("max_conns exceeds reasonable limit (1,000,000)".to_string());
        }

        const MAX_ALLOWED_MESSAGE: usize = 16 * 1024 * 1024;
        if self.max_message_size == 0 {
            return Err("max_message_size must be greater than 0".to_string());
        }
        if self.max_message_size > MAX_ALLOWED_MESSAGE {
            return Err(format!(
                "max_message_size exceeds maximum allowed ({} bytes)",
                MAX_ALLOWED_MESSAGE
            ));
        }

        if self.ping_interval == 0 {
            return Err("ping_interval must be greater than 0".to_string());
        }
        if self.ping_interval > 3600 {
            return Err("ping_interval exceeds reasonable limit (3600 seconds)".to_string());
        }

        if self.outbound_queue == 0 {
            return Err("outbound_queue must be greater than 0".to_string());
        }
        if self.outbound_queue > 65_536 {
            return Err("outbound_queue exceeds reasonable limit (65536)".to_string());
        }

        if self.cors_origin.is_empty() {
            return Err("cors_origin must not be empty".to_string());
        }
        if self.cors_origin != ANY_ORIGIN && HeaderValue::from_str(&self.cors_origin).is_err() {
            return Err("cors_origin is not a valid header value".to_string());
        }
        Ok(())
    }

    /// Whether a WebSocket upgrade carrying `origin` may proceed.
    ///
    /// Requests without an `Origin` header (native clients) are always allowed.
    #[must_use]
    pub fn origin_permitted(&self, origin: Option<&str>) -> bool {
        match origin {
            None => true,
            Some(_) if self.cors_origin == ANY_ORIGIN => true,
            Some(origin) => origin == self.cors_origin,
        }
    }
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            listen: args.listen,
            http_addr: args.http_addr,
            cors_origin: args.cors_origin,
            max_conns: args.max_conns,
            max_message_size: args.max_message_size,
            ping_interval: args.ping_interval,
            outbound_queue: args.outbound_queue,
        }
    }
}
