#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

//! # eddyscan
//!
//! Live scanner for Eddystone UID beacons over Bluetooth Low Energy.
//!
//! The crate keeps one observable list of the beacons seen in the latest
//! ranging cycle and renders it as text whenever it changes:
//!
//! - **Permission gate**: one check of the OS permission BLE scanning needs,
//!   requested once if missing and never awaited
//! - **Beacon session**: binds a scanning backend, registers the beacon
//!   layouts and ranges every beacon in range
//! - **Scanning backend**: [`btleplug`] scan that decodes service-data
//!   advertisements and emits one batch per ranging cycle
//! - **Beacon list and view**: each non-empty batch replaces the list, empty
//!   batches leave it alone
//!
//! ## Quick Start
//!
//! ```no_run
//! use eddyscan::{App, BtleplugBackend, PlatformPermission, ScanParams};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let params = ScanParams::default();
//!     let app = App::new(BtleplugBackend::new(params.clone()), params)?;
//!
//!     let shutdown = async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     };
//!     app.run(&PlatformPermission, std::io::stdout(), shutdown).await?;
//!     Ok(())
//! }
//! ```

/// Application root wiring permission, session and view
pub mod app;
/// Observable list of ranged beacons
pub mod beacons;
/// Scanning backends
pub mod ble;
/// Error types and handling
pub mod error;
/// OS permission check
pub mod permission;
/// Beacon layout parsing and frame decoding
pub mod protocol;
/// Beacon ranging session
pub mod session;
/// Type definitions and data structures
pub mod types;
/// Text rendering of the beacon list
pub mod view;

// Re-export the main types for convenient usage
pub use app::App;
pub use beacons::{BeaconList, BeaconListView, BeaconSnapshot};
pub use ble::{BatchReceiver, BtleplugBackend, ScanBackend};
pub use error::{BeaconError, Result};
pub use permission::{PermissionGate, PermissionStatus, PlatformPermission};
pub use protocol::{BeaconParser, EDDYSTONE_SERVICE_UUID16, EDDYSTONE_UID_LAYOUT};
pub use session::{BeaconSession, RangingSubscription};
pub use types::{BeaconSighting, Identifier, Region, ScanParams};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
