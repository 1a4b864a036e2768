use std::io::Write;
use tracing::debug;

use crate::{beacons::BeaconListView, error::Result, types::BeaconSighting};

/// Heading printed above the beacon lines
pub const HEADING: &str = "Detected Beacons:";

/// Line shown when no beacon is listed
pub const PLACEHOLDER: &str = "No beacons detected.";

/// One line per sighting, or the placeholder when there are none
#[must_use]
pub fn render_lines(beacons: &[BeaconSighting]) -> Vec<String> {
    if beacons.is_empty() {
        return vec![PLACEHOLDER.to_string()];
    }

    beacons
        .iter()
        .map(|beacon| format!("Beacon: {}, RSSI: {}", beacon.identifier(), beacon.rssi))
        .collect()
}

/// Full screen: heading followed by the beacon lines
#[must_use]
pub fn render_screen(beacons: &[BeaconSighting]) -> String {
    let mut screen = String::from(HEADING);
    screen.push('\n');
    for line in render_lines(beacons) {
        screen.push_str(&line);
        screen.push('\n');
    }
    screen
}

/// Render the list now and again after every replacement
///
/// Returns once the list has no writers left.
///
/// # Errors
///
/// Returns [`crate::BeaconError::Io`] if writing to `out` fails.
pub async fn run<W: Write>(mut view: BeaconListView, mut out: W) -> Result<()> {
    loop {
        let beacons = view.current();
        debug!("Rendering {} beacon(s)", beacons.len());
        writeln!(out, "{}", render_screen(&beacons))?;
        out.flush()?;

        if !view.changed().await {
            return Ok(());
        }
    }
}
