//! Bridge between a streaming heart-rate feed and the [`SharedStore`].
//!
//! A [`StreamTransport`] opens the connection and turns it into a stream of
//! [`TransportEvent`]s. [`StreamAdapter::activate`] drives that stream on a
//! tokio task for exactly one streaming epoch and hands back a
//! [`StreamSubscription`] that owns the task. Dropping or closing the
//! subscription tears the connection down.

use std::{pin::Pin, sync::Arc};

use futures_util::{
    future::{self, BoxFuture},
    stream, Stream, StreamExt,
};
use serde::Deserialize;
use serde_json::Value;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::{PulseError, Result, SharedStore, StreamEpoch, UpdateOutcome};

/// Something that happened on an open connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Raw payload of one inbound message.
    Message(String),
    /// The transport reported an error; no more events will follow.
    Failed(String),
    /// The remote end closed the connection.
    Closed,
}

pub type EventStream = Pin<Box<dyn Stream<Item = TransportEvent> + Send>>;

/// Opens connections to a heart-rate feed.
pub trait StreamTransport: Send + Sync + 'static {
    /// Establishes a connection. Failing to connect is reported as
    /// [`PulseError::Connectivity`].
    fn connect(&self) -> BoxFuture<'static, Result<EventStream>>;
}

/// Why an inbound payload was dropped.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("payload is not a JSON object: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("payload has no heartRate field")]
    MissingHeartRate,
    #[error("heartRate is not a number: {0}")]
    NotNumeric(Value),
    #[error("heartRate is not a whole number: {0}")]
    NotInteger(serde_json::Number),
}

#[derive(Debug, Deserialize)]
struct HeartRatePayload {
    #[serde(rename = "heartRate", default)]
    heart_rate: Option<Value>,
}

/// Extracts the `heartRate` field from a JSON payload.
///
/// Floats are accepted only when they carry no fractional part.
pub fn decode_heart_rate(payload: &str) -> std::result::Result<i64, DecodeError> {
    let payload: HeartRatePayload = serde_json::from_str(payload)?;
    let number = match payload.heart_rate {
        None | Some(Value::Null) => return Err(DecodeError::MissingHeartRate),
        Some(Value::Number(number)) => number,
        Some(other) => return Err(DecodeError::NotNumeric(other)),
    };

    if let Some(bpm) = number.as_i64() {
        return Ok(bpm);
    }
    match number.as_f64() {
        Some(float) if float.fract() == 0.0 && float.abs() < i64::MAX as f64 => Ok(float as i64),
        _ => Err(DecodeError::NotInteger(number)),
    }
}

/// WebSocket feed client.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: String,
}

impl WebSocketTransport {
    /// Creates a client for a `ws://` feed URL. Nothing is opened until
    /// [`StreamTransport::connect`] is called.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl StreamTransport for WebSocketTransport {
    fn connect(&self) -> BoxFuture<'static, Result<EventStream>> {
        let url = self.url.clone();
        Box::pin(async move {
            let (socket, _response) = connect_async(url.as_str())
                .await
                .map_err(|err| PulseError::Connectivity(format!("{url}: {err}")))?;
            tracing::info!(%url, "stream connected");

            let events = socket
                .filter_map(|frame| {
                    future::ready(match frame {
                        Ok(Message::Text(text)) => Some(TransportEvent::Message(text.to_string())),
                        Ok(Message::Binary(bytes)) => Some(TransportEvent::Message(
                            String::from_utf8_lossy(&bytes).into_owned(),
                        )),
                        Ok(Message::Close(_)) => Some(TransportEvent::Closed),
                        Ok(_) => None,
                        Err(err) => Some(TransportEvent::Failed(err.to_string())),
                    })
                })
                .boxed();
            Ok(events)
        })
    }
}

/// In-process transport. Each `connect` call opens a fresh channel whose
/// sending half is handed to the paired [`ChannelFeed`].
#[derive(Debug)]
pub struct ChannelTransport {
    connections: mpsc::UnboundedSender<mpsc::UnboundedSender<TransportEvent>>,
}

/// Feed side of a [`ChannelTransport`].
#[derive(Debug)]
pub struct ChannelFeed {
    connections: mpsc::UnboundedReceiver<mpsc::UnboundedSender<TransportEvent>>,
}

impl ChannelTransport {
    /// Creates a connected transport/feed pair.
    pub fn pair() -> (Self, ChannelFeed) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { connections: tx }, ChannelFeed { connections: rx })
    }
}

impl StreamTransport for ChannelTransport {
    fn connect(&self) -> BoxFuture<'static, Result<EventStream>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let accepted = self.connections.send(tx).is_ok();
        Box::pin(async move {
            if !accepted {
                return Err(PulseError::Connectivity(
                    "feed is not accepting connections".to_string(),
                ));
            }
            let events = stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|event| (event, rx))
            });
            Ok(events.boxed())
        })
    }
}

impl ChannelFeed {
    /// Waits for the next client connection. Returns `None` once the
    /// transport is gone.
    pub async fn accept(&mut self) -> Option<mpsc::UnboundedSender<TransportEvent>> {
        self.connections.recv().await
    }
}

/// Starts streaming subscriptions.
#[derive(Debug, Clone, Copy)]
pub struct StreamAdapter;

impl StreamAdapter {
    /// Spawns the subscription for `epoch` on the current tokio runtime.
    pub fn activate(
        store: SharedStore,
        epoch: StreamEpoch,
        transport: Arc<dyn StreamTransport>,
    ) -> StreamSubscription {
        let task = tokio::spawn(run_subscription(store, epoch, transport));
        StreamSubscription {
            epoch,
            task: Some(task),
        }
    }
}

/// Owns the connection task of one streaming epoch.
#[derive(Debug)]
pub struct StreamSubscription {
    epoch: StreamEpoch,
    task: Option<JoinHandle<()>>,
}

impl StreamSubscription {
    /// Streaming epoch this subscription feeds.
    pub fn epoch(&self) -> StreamEpoch {
        self.epoch
    }

    /// Whether the connection task has already exited.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    /// Closes the connection. Calling it more than once is a no-op.
    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            tracing::info!(epoch = ?self.epoch, "closing stream subscription");
            task.abort();
        }
    }
}

impl Drop for StreamSubscription {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_subscription(
    store: SharedStore,
    epoch: StreamEpoch,
    transport: Arc<dyn StreamTransport>,
) {
    let mut events = match transport.connect().await {
        Ok(events) => events,
        Err(err) => {
            report_failure(&store, epoch, &err.to_string());
            return;
        }
    };

    while let Some(event) = events.next().await {
        match event {
            TransportEvent::Message(payload) => {
                let bpm = match decode_heart_rate(&payload) {
                    Ok(bpm) => bpm,
                    Err(err) => {
                        tracing::warn!(%err, %payload, "dropping stream message");
                        continue;
                    }
                };
                match store.apply_streamed(epoch, bpm) {
                    Ok(UpdateOutcome::Ignored) => return,
                    Ok(_) => {}
                    Err(err) => {
                        tracing::error!(%err, "stream could not update session");
                        return;
                    }
                }
            }
            TransportEvent::Failed(reason) => {
                report_failure(&store, epoch, &reason);
                return;
            }
            TransportEvent::Closed => break,
        }
    }

    report_failure(&store, epoch, "connection closed by server");
}

fn report_failure(store: &SharedStore, epoch: StreamEpoch, reason: &str) {
    match store.fail_stream(epoch) {
        Ok(true) => tracing::error!(reason, "stream failed, reverted to manual input"),
        Ok(false) => tracing::debug!(reason, "stale stream ended"),
        Err(err) => tracing::error!(%err, reason, "stream failure could not be recorded"),
    }
}
