use std::{future::Future, io::Write};
use tracing::{error, info, warn};

use crate::{
    beacons::BeaconList,
    ble::ScanBackend,
    error::Result,
    permission::{request_scan_permission, PermissionGate, PermissionStatus},
    protocol::BeaconParser,
    session::BeaconSession,
    types::ScanParams,
    view,
};

/// Application root: owns the beacon list and the ranging session
pub struct App<B: ScanBackend> {
    session: BeaconSession<B>,
    beacons: BeaconList,
    params: ScanParams,
}

impl<B: ScanBackend> App<B> {
    /// Build the application around a scanning backend
    ///
    /// The session is created with the Eddystone UID layout registered.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BeaconError::InvalidLayout`] if the built-in layout
    /// fails to parse.
    pub fn new(backend: B, params: ScanParams) -> Result<Self> {
        let beacons = BeaconList::new();
        let mut session = BeaconSession::new(backend, params.clone(), beacons.clone());
        session.add_parser(BeaconParser::eddystone_uid()?);

        Ok(Self {
            session,
            beacons,
            params,
        })
    }

    /// The observable beacon list
    #[must_use]
    pub const fn beacons(&self) -> &BeaconList {
        &self.beacons
    }

    /// The ranging session
    #[must_use]
    pub const fn session(&self) -> &BeaconSession<B> {
        &self.session
    }

    /// Check the permission and bind the session
    ///
    /// Nothing here is fatal: a failed bind leaves the list empty and the
    /// application running.
    pub async fn start(&mut self, gate: &dyn PermissionGate) {
        request_scan_permission(gate);

        if self.params.require_permission && gate.check() != PermissionStatus::Granted {
            warn!("Bluetooth scanning permission not granted, not starting beacon session");
            return;
        }

        if let Err(e) = self.session.bind().await {
            error!("Failed to bind beacon session: {e}");
        }
    }

    /// Release the session
    pub async fn stop(&mut self) {
        self.session.unbind().await;
    }

    /// Start, render the list to `out` until `shutdown` resolves, then stop
    ///
    /// # Errors
    ///
    /// Returns [`crate::BeaconError::Io`] if rendering fails. The session is
    /// released in every case.
    pub async fn run<W, F>(
        mut self,
        gate: &dyn PermissionGate,
        out: W,
        shutdown: F,
    ) -> Result<()>
    where
        W: Write,
        F: Future<Output = ()>,
    {
        self.start(gate).await;

        let rendered = tokio::select! {
            result = view::run(self.beacons.subscribe(), out) => result,
            () = shutdown => {
                info!("Shutdown requested");
                Ok(())
            }
        };

        self.stop().await;
        rendered
    }
}
