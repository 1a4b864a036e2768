use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

use crate::types::BeaconSighting;

/// Snapshot of the observed beacons, shared between writer and readers
pub type BeaconSnapshot = Arc<Vec<BeaconSighting>>;

/// Observable list of the most recently ranged beacons
///
/// Cloning yields another writer handle onto the same state. Readers obtain a
/// [`BeaconListView`] through [`BeaconList::subscribe`].
#[derive(Debug, Clone)]
pub struct BeaconList {
    sender: Arc<watch::Sender<BeaconSnapshot>>,
}

impl BeaconList {
    /// Create an empty list
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Replace the whole list with a new batch
    ///
    /// The batch is stored as delivered: no merging, sorting or deduplication.
    pub fn replace_with(&self, batch: Vec<BeaconSighting>) {
        debug!("Replacing beacon list with {} sighting(s)", batch.len());
        self.sender.send_replace(Arc::new(batch));
    }

    /// Current contents of the list
    #[must_use]
    pub fn snapshot(&self) -> BeaconSnapshot {
        Arc::clone(&self.sender.borrow())
    }

    /// Number of beacons currently listed
    #[must_use]
    pub fn len(&self) -> usize {
        self.sender.borrow().len()
    }

    /// Whether no beacon is currently listed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sender.borrow().is_empty()
    }

    /// Read-only view that is notified on every replacement
    #[must_use]
    pub fn subscribe(&self) -> BeaconListView {
        BeaconListView {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for BeaconList {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only, change-notifying view of a [`BeaconList`]
#[derive(Debug, Clone)]
pub struct BeaconListView {
    receiver: watch::Receiver<BeaconSnapshot>,
}

impl BeaconListView {
    /// Current contents, marking them as seen
    #[must_use]
    pub fn current(&mut self) -> BeaconSnapshot {
        Arc::clone(&self.receiver.borrow_and_update())
    }

    /// Wait until the list is replaced
    ///
    /// Returns `false` once every writer handle has been dropped and no unseen
    /// update remains.
    pub async fn changed(&mut self) -> bool {
        self.receiver.changed().await.is_ok()
    }
}
