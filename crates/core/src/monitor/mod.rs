use std::sync::Arc;

use crate::{
    Mode, Result, SharedStore, StreamAdapter, StreamSubscription, StreamTransport, UpdateOutcome,
};

/// Session controller. Keeps the streaming subscription in step with the
/// store's mode: entering [`Mode::Streaming`] opens a subscription, leaving it
/// closes the subscription before `set_mode` returns.
///
/// Entering streaming spawns onto the ambient tokio runtime.
pub struct Monitor {
    store: SharedStore,
    transport: Arc<dyn StreamTransport>,
    subscription: Option<StreamSubscription>,
}

impl Monitor {
    pub fn new(transport: impl StreamTransport) -> Self {
        Self::with_store(SharedStore::new(), Arc::new(transport))
    }

    pub fn with_store(store: SharedStore, transport: Arc<dyn StreamTransport>) -> Self {
        Self {
            store,
            transport,
            subscription: None,
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Forwards a manual-origin value; ignored while streaming.
    pub fn update_manual(&self, bpm: i64) -> Result<UpdateOutcome> {
        self.store.update(bpm, Mode::Manual)
    }

    pub fn set_mode(&mut self, mode: Mode) -> Result<()> {
        let epoch = self.store.set_mode(mode)?;

        let Some(epoch) = epoch else {
            if let Some(mut subscription) = self.subscription.take() {
                subscription.close();
            }
            return Ok(());
        };

        let live = self
            .subscription
            .as_ref()
            .is_some_and(|sub| sub.epoch() == epoch && !sub.is_finished());
        if !live {
            self.subscription = Some(StreamAdapter::activate(
                self.store.clone(),
                epoch,
                self.transport.clone(),
            ));
        }
        Ok(())
    }

    /// Flips between manual and streaming input, returning the new mode.
    ///
    /// The current mode is read from the store, so a stream that already
    /// failed back to manual is reopened by the next toggle.
    pub fn toggle_mode(&mut self) -> Result<Mode> {
        let next = self.store.snapshot()?.mode().toggled();
        self.set_mode(next)?;
        Ok(next)
    }
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("store", &self.store)
            .field("subscription", &self.subscription)
            .finish()
    }
}
