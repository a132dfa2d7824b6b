//! Stand-in heart-rate feed for exercising streaming mode without a device.
//!
//! Every connected WebSocket client receives `{"heartRate": n}` at a fixed
//! interval, with `n` drawn uniformly from the accepted range.

use std::{net::SocketAddr, time::Duration};

use futures_util::{SinkExt, StreamExt};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::{
    net::{TcpListener, TcpStream},
    time::{self, MissedTickBehavior},
};
use tokio_tungstenite::{accept_async, tungstenite::Message};

use crate::{config::SimulatorConfig, Result, MAX_BPM, MIN_BPM};

pub fn random_heart_rate<R: Rng>(rng: &mut R) -> i64 {
    rng.gen_range(MIN_BPM..=MAX_BPM)
}

/// Binds `config.bind` and serves clients until the task is cancelled.
pub async fn serve(config: &SimulatorConfig) -> Result<()> {
    let listener = TcpListener::bind(&config.bind).await?;
    tracing::info!(addr = %listener.local_addr()?, interval_ms = config.interval_ms, "simulator listening");
    serve_listener(listener, config.interval()).await
}

pub async fn serve_listener(listener: TcpListener, interval: Duration) -> Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        tokio::spawn(handle_client(stream, peer, interval));
    }
}

async fn handle_client(stream: TcpStream, peer: SocketAddr, interval: Duration) {
    let mut socket = match accept_async(stream).await {
        Ok(socket) => socket,
        Err(err) => {
            tracing::warn!(%peer, %err, "websocket handshake failed");
            return;
        }
    };
    tracing::info!(%peer, "client connected");

    let mut rng = StdRng::from_entropy();
    let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let bpm = random_heart_rate(&mut rng);
                let payload = serde_json::json!({ "heartRate": bpm }).to_string();
                if let Err(err) = socket.send(Message::text(payload)).await {
                    tracing::debug!(%peer, %err, "send failed");
                    break;
                }
                tracing::debug!(%peer, bpm, "heart rate sent");
            }
            frame = socket.next() => match frame {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => {}
            },
        }
    }

    tracing::info!(%peer, "client disconnected");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::time::timeout;

    use super::*;
    use crate::{decode_heart_rate, classify, StreamTransport, TransportEvent, WebSocketTransport};

    #[test]
    fn random_rates_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1_000 {
            assert!(classify(random_heart_rate(&mut rng)).is_ok());
        }
    }

    #[tokio::test]
    async fn streams_decodable_heart_rates() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve_listener(listener, Duration::from_millis(20)));

        let transport: Arc<dyn StreamTransport> =
            Arc::new(WebSocketTransport::new(format!("ws://{addr}")));
        let mut events = transport.connect().await.unwrap();

        for _ in 0..3 {
            let event = timeout(Duration::from_secs(2), events.next())
                .await
                .expect("simulator should send in time")
                .expect("stream should stay open");
            let TransportEvent::Message(payload) = event else {
                panic!("unexpected event {event:?}");
            };
            let bpm = decode_heart_rate(&payload).unwrap();
            assert!((MIN_BPM..=MAX_BPM).contains(&bpm));
        }

        server.abort();
    }
}
