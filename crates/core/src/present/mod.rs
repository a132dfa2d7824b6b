use std::num::IntErrorKind;

use serde::Serialize;
use tokio::sync::watch;

use crate::{ColorToken, Mode, Monitor, PulseError, Result, SessionState, UpdateOutcome, ValidatedValue};

/// Step sizes offered by the nudge buttons, in both directions.
pub const NUDGE_STEPS: [i64; 5] = [1, 2, 5, 10, 50];

/// Everything the rendering surface needs for one frame of the display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderParams {
    pub fill_color: ColorToken,
    pub beat_duration_seconds: f64,
    pub status_label: String,
    pub value_label: String,
    pub mode_label: String,
    pub controls_enabled: bool,
    pub error: Option<String>,
}

impl RenderParams {
    /// Derives the display parameters for `state`.
    pub fn from_state(state: &SessionState) -> Self {
        let value = state.value();
        let streaming = state.mode() == Mode::Streaming;
        Self {
            fill_color: value.color(),
            beat_duration_seconds: beat_duration_seconds(value),
            status_label: format!("Status: {}", value.band()),
            value_label: format!("Current Heart Rate: {} BPM", value.bpm()),
            mode_label: format!(
                "Server Heart Rate {}",
                if streaming { "(ON)" } else { "(OFF)" }
            ),
            controls_enabled: !streaming,
            error: state.error().map(str::to_owned),
        }
    }
}

/// Seconds per simulated beat. A [`ValidatedValue`] is never below the
/// minimum accepted rate, so the division is always defined.
pub fn beat_duration_seconds(value: ValidatedValue) -> f64 {
    let bpm = value.bpm();
    assert!(bpm > 0, "validated heart rate must be positive, got {bpm}");
    60.0 / bpm as f64
}

/// Entry points for the input widgets, plus derived render parameters.
#[derive(Debug)]
pub struct PresentationBinding {
    monitor: Monitor,
}

impl PresentationBinding {
    pub fn new(monitor: Monitor) -> Self {
        Self { monitor }
    }

    /// Render parameters for the current session state.
    pub fn render(&self) -> Result<RenderParams> {
        Ok(RenderParams::from_state(&self.monitor.store().snapshot()?))
    }

    /// Session state after every change; pair with [`RenderParams::from_state`].
    pub fn changes(&self) -> watch::Receiver<SessionState> {
        self.monitor.store().subscribe()
    }

    /// Forwards a manual value; ignored while streaming.
    pub fn request_manual_update(&self, bpm: i64) -> Result<UpdateOutcome> {
        self.monitor.update_manual(bpm)
    }

    /// Flips between manual and streaming input.
    pub fn request_mode_toggle(&mut self) -> Result<Mode> {
        self.monitor.toggle_mode()
    }

    pub fn request_mode(&mut self, mode: Mode) -> Result<()> {
        self.monitor.set_mode(mode)
    }

    /// Parses typed text as a base-10 integer. Text that does not parse is
    /// dropped here and never reaches the store. Numbers too large for `i64`
    /// saturate, so they surface as a range error instead of vanishing.
    pub fn submit_text(&self, text: &str) -> Result<Option<UpdateOutcome>> {
        let bpm = match text.trim().parse::<i64>() {
            Ok(bpm) => bpm,
            Err(err) if *err.kind() == IntErrorKind::PosOverflow => i64::MAX,
            Err(err) if *err.kind() == IntErrorKind::NegOverflow => i64::MIN,
            Err(_) => {
                tracing::debug!(text, "ignoring non-numeric input");
                return Ok(None);
            }
        };
        self.request_manual_update(bpm).map(Some)
    }

    /// Moves the current value by one of the [`NUDGE_STEPS`].
    pub fn nudge(&self, delta: i64) -> Result<UpdateOutcome> {
        if !delta.checked_abs().is_some_and(|step| NUDGE_STEPS.contains(&step)) {
            return Err(PulseError::msg(format!("unsupported nudge step {delta}")));
        }
        let current = self.monitor.store().snapshot()?.value().bpm();
        self.request_manual_update(current + delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{classify, ChannelTransport};

    fn binding() -> PresentationBinding {
        let (transport, _feed) = ChannelTransport::pair();
        PresentationBinding::new(Monitor::new(transport))
    }

    #[test]
    fn beat_duration_tracks_rate() {
        let at = |bpm| beat_duration_seconds(classify(bpm).unwrap());
        assert!((at(60) - 1.0).abs() < f64::EPSILON);
        assert!((at(120) - 0.5).abs() < f64::EPSILON);
        assert!(at(250) > 0.0);
    }

    #[test]
    fn initial_render() {
        let params = binding().render().unwrap();

        assert_eq!(params.fill_color, ColorToken::Green);
        assert!((params.beat_duration_seconds - 60.0 / 70.0).abs() < 1e-12);
        assert_eq!(params.status_label, "Status: Normal");
        assert_eq!(params.value_label, "Current Heart Rate: 70 BPM");
        assert_eq!(params.mode_label, "Server Heart Rate (OFF)");
        assert!(params.controls_enabled);
        assert_eq!(params.error, None);
    }

    #[test]
    fn non_numeric_text_never_reaches_store() {
        let binding = binding();
        let mut changes = binding.changes();
        changes.borrow_and_update();

        assert_eq!(binding.submit_text("abc").unwrap(), None);
        assert_eq!(binding.submit_text("").unwrap(), None);
        assert!(!changes.has_changed().unwrap());

        let outcome = binding.submit_text(" 150 ").unwrap();
        assert!(matches!(outcome, Some(UpdateOutcome::Applied(_))));
        let params = binding.render().unwrap();
        assert_eq!(params.status_label, "Status: Elevated");
        assert_eq!(params.fill_color, ColorToken::Amber);
    }

    #[test]
    fn nudges_apply_relative_to_current_value() {
        let binding = binding();

        binding.nudge(50).unwrap();
        binding.nudge(-2).unwrap();
        assert_eq!(binding.render().unwrap().value_label, "Current Heart Rate: 118 BPM");

        let outcome = binding.nudge(-50).unwrap();
        assert!(matches!(outcome, UpdateOutcome::Applied(_)));
        let outcome = binding.nudge(-50).unwrap();
        assert!(matches!(outcome, UpdateOutcome::Rejected(_)));

        let params = binding.render().unwrap();
        assert_eq!(params.value_label, "Current Heart Rate: 68 BPM");
        assert_eq!(
            params.error.as_deref(),
            Some("Heart rate must be between 26 and 250 BPM (current: 18)")
        );
    }

    #[test]
    fn rejects_unknown_nudge_steps() {
        assert!(binding().nudge(3).is_err());
        assert!(binding().nudge(0).is_err());
        assert!(binding().nudge(i64::MIN).is_err());
        assert!(binding().nudge(i64::MAX).is_err());
    }

    #[test]
    fn oversized_numbers_surface_range_error() {
        let binding = binding();

        let outcome = binding.submit_text("99999999999999999999").unwrap();
        assert!(matches!(outcome, Some(UpdateOutcome::Rejected(_))));
        let outcome = binding.submit_text("-99999999999999999999").unwrap();
        assert!(matches!(outcome, Some(UpdateOutcome::Rejected(_))));

        let params = binding.render().unwrap();
        assert_eq!(params.value_label, "Current Heart Rate: 70 BPM");
        assert!(params
            .error
            .as_deref()
            .is_some_and(|error| error.starts_with("Heart rate must be between 26 and 250 BPM")));
    }

    #[tokio::test]
    async fn streaming_disables_controls() {
        let (transport, _feed) = ChannelTransport::pair();
        let mut binding = PresentationBinding::new(Monitor::new(transport));

        assert_eq!(binding.request_mode_toggle().unwrap(), Mode::Streaming);
        let params = binding.render().unwrap();
        assert!(!params.controls_enabled);
        assert_eq!(params.mode_label, "Server Heart Rate (ON)");
        assert_eq!(
            binding.request_manual_update(100).unwrap(),
            UpdateOutcome::Ignored
        );

        binding.request_mode(Mode::Manual).unwrap();
        assert!(binding.render().unwrap().controls_enabled);
    }
}
