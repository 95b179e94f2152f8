#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use sigrelay::config::ServerConfig;
use sigrelay::server::ServerState;
use sigrelay_common::ServerMessage;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

pub fn test_config(listen: SocketAddr) -> ServerConfig {
    ServerConfig {
        listen,
        http_addr: "127.0.0.1:0".parse().unwrap(),
        cors_origin: "*".to_string(),
        max_conns: 1000,
        max_message_size: 65_536,
        ping_interval: 30,
        outbound_queue: 64,
    }
}

type Ws = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

pub struct TestClient {
    pub ws_tx: futures_util::stream::SplitSink<Ws, Message>,
    pub ws_rx: futures_util::stream::SplitStream<Ws>,
}

impl TestClient {
    pub async fn connect(addr: &SocketAddr) -> Self {
        let url = format!("ws://{addr}");
        let (ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        let (ws_tx, ws_rx) = ws.split();
        Self { ws_tx, ws_rx }
    }

    pub async fn send_text(&mut self, text: &str) {
        self.ws_tx
            .send(Message::Text(text.to_string()))
            .await
            .unwrap();
    }

    pub async fn send_json(&mut self, value: Value) {
        self.send_text(&value.to_string()).await;
    }

    pub async fn register_camera(&mut self, pin: &str) -> ServerMessage {
        self.send_json(json!({"type": "camera:register", "pin": pin}))
            .await;
        self.recv().await
    }

    pub async fn join_dashboard(&mut self, pin: &str) -> ServerMessage {
        self.send_json(json!({"type": "dashboard:join", "pin": pin}))
            .await;
        self.recv().await
    }

    pub async fn recv(&mut self) -> ServerMessage {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), self.ws_rx.next())
                .await
                .expect("timeout waiting for message")
                .unwrap()
                .unwrap();
            match msg {
                Message::Text(text) => return ServerMessage::from_text(&text).unwrap(),
                Message::Ping(_) | Message::Pong(_) => {}
                other => panic!("expected text message, got {other:?}"),
            }
        }
    }

    pub async fn recv_timeout(&mut self, timeout: Duration) -> Option<ServerMessage> {
        tokio::time::timeout(timeout, self.recv()).await.ok()
    }

    /// Assert nothing arrives within a short window.
    pub async fn expect_silence(&mut self) {
        if let Some(msg) = self.recv_timeout(Duration::from_millis(200)).await {
            panic!("expected no message, got {msg:?}");
        }
    }

    pub async fn close(mut self) {
        let _ = self.ws_tx.send(Message::Close(None)).await;
        let _ = self.ws_tx.close().await;
    }
}

pub async fn start_server_with_config(
    configure: impl FnOnce(&mut ServerConfig),
) -> (SocketAddr, Arc<ServerState>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let mut config = test_config(addr);
    configure(&mut config);
    let state = Arc::new(ServerState::new(config));

    let state_clone = state.clone();
    tokio::spawn(async move {
        if let Err(e) = sigrelay::run(listener, state_clone).await {
            eprintln!("server error in test: {e}");
        }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;

    (addr, state)
}

pub async fn start_server() -> (SocketAddr, Arc<ServerState>) {
    start_server_with_config(|_| {}).await
}

/// Poll `cond` until it holds or two seconds pass.
pub async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
