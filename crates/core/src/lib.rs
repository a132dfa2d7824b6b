//! Core library for the Pulse Monitor application.
//!
//! A heart rate arrives either from manual entry or from a streaming feed,
//! is validated and banded by [`classify`], stored in the single
//! [`SessionState`] owned by the [`store`], and turned into render
//! parameters by the [`present`] binding. The [`stream`] module bridges a
//! WebSocket feed into the store while streaming mode is active.

pub mod classify;
pub mod config;
pub mod error;
pub mod monitor;
pub mod present;
pub mod simulator;
pub mod store;
pub mod stream;

pub use classify::{classify, Band, ColorToken, RangeError, ValidatedValue, MAX_BPM, MIN_BPM};
pub use config::{AppConfig, SimulatorConfig, StreamConfig};
pub use error::{PulseError, Result};
pub use monitor::Monitor;
pub use present::{beat_duration_seconds, PresentationBinding, RenderParams, NUDGE_STEPS};
pub use store::{
    Mode, SessionState, SharedStore, StreamEpoch, UpdateOutcome, ValueStore,
    CONNECTION_FAILED_MESSAGE, INITIAL_BPM,
};
pub use stream::{
    decode_heart_rate, ChannelFeed, ChannelTransport, DecodeError, EventStream, StreamAdapter,
    StreamSubscription, StreamTransport, TransportEvent, WebSocketTransport,
};
