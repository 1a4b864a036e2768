use std::time::Duration;
use tokio::{task::JoinHandle, time::timeout};
use tracing::{debug, error, info, warn};

use crate::{
    beacons::BeaconList,
    ble::{BatchReceiver, ScanBackend},
    error::{BeaconError, Result},
    protocol::BeaconParser,
    types::{BeaconSighting, Region, ScanParams},
};

/// Apply one ranging batch to the list
///
/// Non-empty batches replace the list wholesale. Empty batches are ignored,
/// so beacons stay listed until a later non-empty batch omits them.
/// Returns whether the list was replaced.
pub fn apply_batch(beacons: &BeaconList, batch: Vec<BeaconSighting>) -> bool {
    if batch.is_empty() {
        return false;
    }
    beacons.replace_with(batch);
    true
}

/// Subscriber task feeding a ranging batch stream into a [`BeaconList`]
///
/// Dropping the subscription cancels the task.
#[derive(Debug)]
pub struct RangingSubscription {
    task: JoinHandle<()>,
}

impl RangingSubscription {
    /// Spawn the subscriber on the current runtime
    #[must_use]
    pub fn spawn(mut batches: BatchReceiver, beacons: BeaconList) -> Self {
        let task = tokio::spawn(async move {
            while let Some(batch) = batches.recv().await {
                if !apply_batch(&beacons, batch) {
                    debug!("Empty ranging batch ignored");
                }
            }
            debug!("Ranging batch stream closed");
        });

        Self { task }
    }

    /// Whether the subscriber is still consuming batches
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop consuming batches
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for RangingSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Beacon ranging session over an injected scanning backend
///
/// The session owns its backend. [`BeaconSession::bind`] connects it and, once
/// connected, starts ranging every beacon and forwards batches into the
/// shared [`BeaconList`]. [`BeaconSession::unbind`] releases everything and is
/// safe to call at any time.
///
/// # Examples
///
/// ```no_run
/// use eddyscan::{BeaconList, BeaconParser, BeaconSession, BtleplugBackend, ScanParams};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let params = ScanParams::default();
///     let beacons = BeaconList::new();
///
///     let mut session = BeaconSession::new(
///         BtleplugBackend::new(params.clone()),
///         params,
///         beacons.clone(),
///     );
///     session.add_parser(BeaconParser::eddystone_uid()?);
///     session.bind().await?;
///
///     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
///     println!("{} beacon(s) in range", beacons.len());
///
///     session.unbind().await;
///     Ok(())
/// }
/// ```
pub struct BeaconSession<B: ScanBackend> {
    backend: B,
    params: ScanParams,
    parsers: Vec<BeaconParser>,
    beacons: BeaconList,
    subscription: Option<RangingSubscription>,
    bound: bool,
}

impl<B: ScanBackend> BeaconSession<B> {
    /// Create an unbound session writing into `beacons`
    #[must_use]
    pub const fn new(backend: B, params: ScanParams, beacons: BeaconList) -> Self {
        Self {
            backend,
            params,
            parsers: Vec::new(),
            beacons,
            subscription: None,
            bound: false,
        }
    }

    /// Register a beacon layout; takes effect on the next bind
    pub fn add_parser(&mut self, parser: BeaconParser) {
        info!("Registered beacon layout {}", parser.layout());
        self.parsers.push(parser);
    }

    /// Registered beacon layouts
    #[must_use]
    pub fn parsers(&self) -> &[BeaconParser] {
        &self.parsers
    }

    /// The list this session writes into
    #[must_use]
    pub const fn beacons(&self) -> &BeaconList {
        &self.beacons
    }

    /// The scanning backend
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Whether the backend is bound
    #[must_use]
    pub const fn is_bound(&self) -> bool {
        self.bound
    }

    /// Whether batches are currently being consumed
    #[must_use]
    pub fn is_ranging(&self) -> bool {
        self.subscription
            .as_ref()
            .is_some_and(RangingSubscription::is_active)
    }

    /// Bind the backend and start ranging once connected
    ///
    /// A failure to start ranging is logged and otherwise ignored: the call
    /// still succeeds and the list keeps its contents.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::Timeout`] if the backend does not bind within
    /// `bind_timeout_ms`, or the backend's own bind error.
    pub async fn bind(&mut self) -> Result<()> {
        if self.bound {
            debug!("Beacon session already bound");
            return Ok(());
        }

        let timeout_ms = self.params.bind_timeout_ms;
        timeout(
            Duration::from_millis(timeout_ms),
            self.backend.bind(&self.parsers),
        )
        .await
        .map_err(|_| BeaconError::Timeout { timeout_ms })??;

        self.bound = true;
        info!("Beacon service connected");

        self.on_service_connect().await;
        Ok(())
    }

    async fn on_service_connect(&mut self) {
        let region = Region::all_beacons();

        match self.backend.start_ranging(&region).await {
            Ok(batches) => {
                self.subscription = Some(RangingSubscription::spawn(
                    batches,
                    self.beacons.clone(),
                ));
            }
            Err(e) => error!("Failed to start ranging beacons in {region}: {e}"),
        }
    }

    /// Cancel the subscriber and release the backend
    ///
    /// Never fails; backend errors are logged.
    pub async fn unbind(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel();
        }

        if let Err(e) = self.backend.unbind().await {
            warn!("Failed to unbind beacon service: {e}");
        }

        if self.bound {
            info!("Beacon service unbound");
        }
        self.bound = false;
    }
}
