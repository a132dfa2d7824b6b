use std::time::Duration;

use pulse_monitor_core::{
    Band, ChannelTransport, ColorToken, Mode, Monitor, PresentationBinding, SessionState,
    TransportEvent, UpdateOutcome, CONNECTION_FAILED_MESSAGE,
};
use tokio::{sync::watch, time::timeout};

async fn wait_for(
    changes: &mut watch::Receiver<SessionState>,
    predicate: impl Fn(&SessionState) -> bool,
) -> SessionState {
    timeout(Duration::from_secs(2), changes.wait_for(|state| predicate(state)))
        .await
        .expect("state change should arrive in time")
        .expect("store should still be alive")
        .clone()
}

#[tokio::test]
async fn manual_then_streaming_then_fallback() {
    let (transport, mut feed) = ChannelTransport::pair();
    let mut binding = PresentationBinding::new(Monitor::new(transport));
    let mut changes = binding.changes();

    // Initial state.
    let params = binding.render().unwrap();
    assert_eq!(params.value_label, "Current Heart Rate: 70 BPM");
    assert_eq!(params.fill_color, ColorToken::Green);
    assert_eq!(params.error, None);

    // Out-of-range manual value.
    let outcome = binding.request_manual_update(25).unwrap();
    assert!(matches!(outcome, UpdateOutcome::Rejected(_)));
    let params = binding.render().unwrap();
    assert_eq!(params.value_label, "Current Heart Rate: 70 BPM");
    assert_eq!(
        params.error.as_deref(),
        Some("Heart rate must be between 26 and 250 BPM (current: 25)")
    );

    // Elevated boundary.
    binding.request_manual_update(111).unwrap();
    let params = binding.render().unwrap();
    assert_eq!(params.status_label, "Status: Elevated");
    assert_eq!(params.error, None);

    // Streaming takes over; manual input is ignored.
    binding.request_mode(Mode::Streaming).unwrap();
    let client = feed.accept().await.unwrap();
    client
        .send(TransportEvent::Message(r#"{"heartRate": 200}"#.into()))
        .unwrap();
    let state = wait_for(&mut changes, |state| state.value().bpm() == 200).await;
    assert_eq!(state.value().band(), Band::High);
    assert_eq!(
        binding.request_manual_update(80).unwrap(),
        UpdateOutcome::Ignored
    );

    // Connection drops: back to manual with a message.
    client.send(TransportEvent::Failed("reset".into())).unwrap();
    let state = wait_for(&mut changes, |state| state.mode() == Mode::Manual).await;
    assert_eq!(state.error(), Some(CONNECTION_FAILED_MESSAGE));
    assert_eq!(state.value().bpm(), 200);

    let _ = client.send(TransportEvent::Message(r#"{"heartRate": 90}"#.into()));
    tokio::task::yield_now().await;
    assert_eq!(binding.render().unwrap().value_label, "Current Heart Rate: 200 BPM");

    // Manual input works again and clears the connection message.
    binding.submit_text("64").unwrap();
    let params = binding.render().unwrap();
    assert_eq!(params.value_label, "Current Heart Rate: 64 BPM");
    assert_eq!(params.error, None);
    assert!(params.controls_enabled);
}
