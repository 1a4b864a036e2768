use crate::error::{BeaconError, Result};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// Opaque beacon identifier as carried in the advertisement
///
/// Text form depends on the length: two bytes print as a decimal integer,
/// sixteen bytes as a UUID, anything else as `0x` followed by lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier(Vec<u8>);

impl Identifier {
    /// Create an identifier from raw bytes
    #[must_use]
    pub const fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Raw identifier bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Identifier length in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the identifier carries no bytes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.len() {
            2 => write!(f, "{}", u16::from_be_bytes([self.0[0], self.0[1]])),
            16 => match Uuid::from_slice(&self.0) {
                Ok(uuid) => write!(f, "{uuid}"),
                Err(_) => write!(f, "0x{}", hex::encode(&self.0)),
            },
            _ => write!(f, "0x{}", hex::encode(&self.0)),
        }
    }
}

impl FromStr for Identifier {
    type Err = BeaconError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();

        if let Some(digits) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            let padded = if digits.len() % 2 == 1 {
                format!("0{digits}")
            } else {
                digits.to_string()
            };
            return hex::decode(padded)
                .map(Self)
                .map_err(|e| BeaconError::ParseError(format!("Invalid hex identifier {s}: {e}")));
        }

        if s.contains('-') {
            return Uuid::parse_str(s)
                .map(|uuid| Self(uuid.as_bytes().to_vec()))
                .map_err(|e| BeaconError::ParseError(format!("Invalid UUID identifier {s}: {e}")));
        }

        s.parse::<u16>()
            .map(|value| Self(value.to_be_bytes().to_vec()))
            .map_err(|_| BeaconError::ParseError(format!("Unrecognized identifier: {s}")))
    }
}

/// One beacon seen during a ranging cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconSighting {
    /// Identifier fields in layout order
    pub identifiers: Vec<Identifier>,
    /// Received signal strength in dBm
    pub rssi: i16,
    /// Calibrated transmit power in dBm
    pub tx_power: i16,
    /// Decoded data fields
    pub data_fields: Vec<u64>,
    /// 16-bit service UUID the frame was advertised under
    pub service_uuid: Option<u16>,
    /// Bluetooth address of the advertiser
    pub address: Option<String>,
}

impl BeaconSighting {
    /// Create a sighting with identifiers and signal strength only
    #[must_use]
    pub const fn new(identifiers: Vec<Identifier>, rssi: i16) -> Self {
        Self {
            identifiers,
            rssi,
            tx_power: 0,
            data_fields: Vec::new(),
            service_uuid: None,
            address: None,
        }
    }

    /// First identifier (the Eddystone namespace)
    #[must_use]
    pub fn id1(&self) -> Option<&Identifier> {
        self.identifiers.first()
    }

    /// Second identifier (the Eddystone instance)
    #[must_use]
    pub fn id2(&self) -> Option<&Identifier> {
        self.identifiers.get(1)
    }

    /// Third identifier
    #[must_use]
    pub fn id3(&self) -> Option<&Identifier> {
        self.identifiers.get(2)
    }

    /// Display token for this beacon, taken from the first identifier
    #[must_use]
    pub fn identifier(&self) -> String {
        self.id1().map_or_else(String::new, ToString::to_string)
    }
}

/// Identifier filter selecting which beacons a ranging session reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    /// Unique name of the region
    pub unique_id: String,
    /// Positional identifier filters; `None` matches anything
    pub identifiers: Vec<Option<Identifier>>,
}

impl Region {
    /// Create a region with up to three identifier filters
    #[must_use]
    pub fn new(
        unique_id: impl Into<String>,
        id1: Option<Identifier>,
        id2: Option<Identifier>,
        id3: Option<Identifier>,
    ) -> Self {
        Self {
            unique_id: unique_id.into(),
            identifiers: vec![id1, id2, id3],
        }
    }

    /// Region without filters, matching every beacon
    #[must_use]
    pub fn all_beacons() -> Self {
        Self::new("all-beacons-region", None, None, None)
    }

    /// Whether a sighting falls inside this region
    #[must_use]
    pub fn matches(&self, sighting: &BeaconSighting) -> bool {
        self.identifiers
            .iter()
            .enumerate()
            .all(|(index, filter)| match filter {
                Some(expected) => sighting.identifiers.get(index) == Some(expected),
                None => true,
            })
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.unique_id)?;
        for (index, filter) in self.identifiers.iter().enumerate() {
            match filter {
                Some(id) => write!(f, " id{}: {id}", index + 1)?,
                None => write!(f, " id{}: *", index + 1)?,
            }
        }
        Ok(())
    }
}

/// Scanning parameters
#[derive(Debug, Clone)]
pub struct ScanParams {
    /// Length of one ranging cycle in milliseconds; one batch is emitted per cycle
    pub scan_period_ms: u64,
    /// Backend bind timeout in milliseconds
    pub bind_timeout_ms: u64,
    /// Index of the Bluetooth adapter to scan with
    pub adapter_index: usize,
    /// Number of undelivered batches buffered before the ranging task waits
    pub batch_capacity: usize,
    /// Skip binding unless the permission gate reports a grant
    pub require_permission: bool,
}

impl Default for ScanParams {
    fn default() -> Self {
        Self {
            scan_period_ms: 1_100,
            bind_timeout_ms: 10_000,
            adapter_index: 0,
            batch_capacity: 16,
            require_permission: false,
        }
    }
}
