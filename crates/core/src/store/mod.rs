use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::watch;

use crate::{classify, PulseError, RangeError, Result, ValidatedValue};

/// Heart rate every session starts from.
pub const INITIAL_BPM: i64 = 70;

/// Message shown when the streaming feed drops and control reverts to manual.
pub const CONNECTION_FAILED_MESSAGE: &str = "Server connection failed. Switching to manual mode.";

/// Which producer is currently allowed to update the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Mode {
    Manual,
    Streaming,
}

impl Mode {
    /// The other mode.
    pub fn toggled(self) -> Self {
        match self {
            Mode::Manual => Mode::Streaming,
            Mode::Streaming => Mode::Manual,
        }
    }
}

/// Identifies one stay in [`Mode::Streaming`]. A new epoch is opened on every
/// transition into streaming, so values produced by an older subscription can
/// be told apart from current ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamEpoch(u64);

/// Snapshot of everything the display needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionState {
    value: ValidatedValue,
    mode: Mode,
    error: Option<String>,
}

impl SessionState {
    /// Last accepted heart rate.
    pub fn value(&self) -> ValidatedValue {
        self.value
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Message to show the user, if the last attempt failed.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        let value = match classify(INITIAL_BPM) {
            Ok(value) => value,
            Err(err) => unreachable!("initial heart rate must be valid: {err}"),
        };
        Self {
            value,
            mode: Mode::Manual,
            error: None,
        }
    }
}

/// What happened to a candidate value handed to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Value classified and replaced the current one.
    Applied(ValidatedValue),
    /// Value was out of range; the current one is kept and the error is set.
    Rejected(RangeError),
    /// Origin did not match the active mode (or the stream epoch is stale).
    Ignored,
}

/// Sole owner of the [`SessionState`]. Every mutation goes through
/// [`ValueStore::update`], [`ValueStore::set_mode`] or the streaming entry
/// points below.
#[derive(Debug, Default)]
pub struct ValueStore {
    state: SessionState,
    epoch: u64,
}

impl ValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current session state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Applies `bpm` if `origin` matches the active mode.
    pub fn update(&mut self, bpm: i64, origin: Mode) -> UpdateOutcome {
        if origin != self.state.mode {
            tracing::debug!(bpm, ?origin, mode = ?self.state.mode, "ignoring update from inactive source");
            return UpdateOutcome::Ignored;
        }

        match classify(bpm) {
            Ok(value) => {
                tracing::debug!(bpm, band = %value.band(), "heart rate accepted");
                self.state.value = value;
                self.state.error = None;
                UpdateOutcome::Applied(value)
            }
            Err(err) => {
                tracing::debug!(bpm, "heart rate rejected");
                self.state.error = Some(err.to_string());
                UpdateOutcome::Rejected(err)
            }
        }
    }

    /// Switches the active mode. Returns the epoch of the streaming session
    /// when the switch enters (or stays in) [`Mode::Streaming`].
    ///
    /// The error message is left untouched; only a later successful
    /// classification clears it.
    pub fn set_mode(&mut self, mode: Mode) -> Option<StreamEpoch> {
        if mode != self.state.mode {
            if mode == Mode::Streaming {
                self.epoch += 1;
            }
            tracing::info!(from = ?self.state.mode, to = ?mode, "input mode changed");
            self.state.mode = mode;
        }
        self.streaming_epoch()
    }

    /// Epoch of the current streaming session, if streaming.
    pub fn streaming_epoch(&self) -> Option<StreamEpoch> {
        match self.state.mode {
            Mode::Streaming => Some(StreamEpoch(self.epoch)),
            Mode::Manual => None,
        }
    }

    /// Applies a value delivered by the subscription opened for `epoch`.
    /// Late deliveries from a closed subscription are discarded.
    pub fn apply_streamed(&mut self, epoch: StreamEpoch, bpm: i64) -> UpdateOutcome {
        if self.streaming_epoch() != Some(epoch) {
            tracing::debug!(bpm, ?epoch, "discarding value from stale stream");
            return UpdateOutcome::Ignored;
        }
        self.update(bpm, Mode::Streaming)
    }

    /// Reverts to manual input after the subscription for `epoch` failed.
    /// Returns `false` when that subscription is no longer the active one.
    pub fn fail_stream(&mut self, epoch: StreamEpoch) -> bool {
        if self.streaming_epoch() != Some(epoch) {
            return false;
        }
        self.set_mode(Mode::Manual);
        self.state.error = Some(CONNECTION_FAILED_MESSAGE.to_string());
        true
    }
}

/// Thread-safe handle over a [`ValueStore`].
///
/// A single mutex guards the whole aggregate. Every change is published on a
/// watch channel while the lock is still held, so subscribers observe states
/// in mutation order.
#[derive(Clone)]
pub struct SharedStore {
    inner: Arc<Mutex<ValueStore>>,
    changes: Arc<watch::Sender<SessionState>>,
}

impl SharedStore {
    pub fn new() -> Self {
        let store = ValueStore::new();
        let (changes, _) = watch::channel(store.state().clone());
        Self {
            inner: Arc::new(Mutex::new(store)),
            changes: Arc::new(changes),
        }
    }

    /// Copy of the current session state.
    pub fn snapshot(&self) -> Result<SessionState> {
        Ok(self.lock()?.state().clone())
    }

    /// Receiver that yields the session state after every change.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.changes.subscribe()
    }

    /// Locked form of [`ValueStore::update`].
    pub fn update(&self, bpm: i64, origin: Mode) -> Result<UpdateOutcome> {
        self.mutate(|store| store.update(bpm, origin))
    }

    /// Locked form of [`ValueStore::set_mode`].
    pub fn set_mode(&self, mode: Mode) -> Result<Option<StreamEpoch>> {
        self.mutate(|store| store.set_mode(mode))
    }

    /// Locked form of [`ValueStore::apply_streamed`].
    pub fn apply_streamed(&self, epoch: StreamEpoch, bpm: i64) -> Result<UpdateOutcome> {
        self.mutate(|store| store.apply_streamed(epoch, bpm))
    }

    /// Locked form of [`ValueStore::fail_stream`].
    pub fn fail_stream(&self, epoch: StreamEpoch) -> Result<bool> {
        self.mutate(|store| store.fail_stream(epoch))
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut ValueStore) -> R) -> Result<R> {
        let mut store = self.lock()?;
        let result = f(&mut *store);
        let next = store.state();
        self.changes.send_if_modified(|current| {
            if *current == *next {
                false
            } else {
                *current = next.clone();
                true
            }
        });
        Ok(result)
    }

    fn lock(&self) -> Result<MutexGuard<'_, ValueStore>> {
        self.inner
            .lock()
            .map_err(|_| PulseError::msg("session state has been poisoned"))
    }
}

impl Default for SharedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SharedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedStore").finish()
    }
}
