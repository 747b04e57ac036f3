//! Bridge from the engine's event socket to the host bus.
//!
//! One persistent websocket subscription per gateway instance. Each JSON text
//! frame is a task/item byte-count message; the bridge sums the items and
//! republishes the aggregate under the frame's own `type` discriminator, so
//! new engine event kinds flow through without code changes.
//!
//! There is no automatic reconnect: when the socket drops, the subscription
//! is over. The gap is deliberate surface area — observe it through
//! [`BridgeHandle::state`] instead of waiting on a silent stream.

use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use warden_events::Bus;
use warden_protocol::{aggregate_progress, TaskEventMessage};

use crate::config::EngineConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BridgeState {
    Connected,
    Disconnected,
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("event socket connect failed: {0}")]
    Connect(String),
}

/// A live event subscription. Dropping the handle leaves the reader running;
/// call [`shutdown`](Self::shutdown) to end it.
pub struct BridgeHandle {
    state_rx: watch::Receiver<BridgeState>,
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

impl BridgeHandle {
    /// Observe the subscription state; flips to `Disconnected` exactly once,
    /// when the socket closes or errors.
    pub fn state(&self) -> watch::Receiver<BridgeState> {
        self.state_rx.clone()
    }

    pub fn is_connected(&self) -> bool {
        *self.state_rx.borrow() == BridgeState::Connected
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

pub struct EventBridge;

impl EventBridge {
    /// Open the socket and start republishing frames onto `bus`.
    pub async fn connect(config: &EngineConfig, bus: Bus) -> Result<BridgeHandle, BridgeError> {
        let url = config.socket_url();
        let (stream, _response) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|err| BridgeError::Connect(err.to_string()))?;
        info!(target: "warden::bridge", url = %url, "event socket connected");

        let (state_tx, state_rx) = watch::channel(BridgeState::Connected);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_reader(stream, bus, state_tx, cancel.clone()));
        Ok(BridgeHandle {
            state_rx,
            cancel,
            task,
        })
    }
}

async fn run_reader(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    bus: Bus,
    state_tx: watch::Sender<BridgeState>,
    cancel: CancellationToken,
) {
    let (_write, mut read) = stream.split();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(target: "warden::bridge", "event reader cancelled");
                break;
            }
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => handle_frame(&bus, &text),
                Some(Ok(Message::Close(_))) | None => {
                    warn!(target: "warden::bridge", "event socket closed by engine");
                    break;
                }
                Some(Ok(_)) => {
                    // Ping/pong and binary frames carry no task data.
                }
                Some(Err(err)) => {
                    warn!(target: "warden::bridge", error = %err, "event socket failed");
                    break;
                }
            }
        }
    }
    let _ = state_tx.send(BridgeState::Disconnected);
}

fn handle_frame(bus: &Bus, text: &str) {
    match serde_json::from_str::<TaskEventMessage>(text) {
        Ok(message) => {
            let event = aggregate_progress(&message.task);
            bus.publish(&message.kind, &event);
        }
        Err(err) => {
            debug!(target: "warden::bridge", error = %err, "ignoring unparseable event frame");
        }
    }
}
