use crate::{
    error::{BeaconError, Result},
    types::{BeaconSighting, Identifier},
};
use bytes::{Buf, BufMut, BytesMut};
use uuid::Uuid;

/// Layout of an Eddystone UID frame inside the `0xFEAA` service data
///
/// - Bytes 0-1: service UUID `0xFEAA` (little-endian)
/// - Byte 2: frame type, `0x00` for UID
/// - Byte 3: calibrated TX power at 0 m; `-41` converts it to the 1 m reference
/// - Bytes 4-13: 10-byte namespace (id1)
/// - Bytes 14-19: 6-byte instance (id2)
pub const EDDYSTONE_UID_LAYOUT: &str = "s:0-1=feaa,m:2-2=00,p:3-3:-41,i:4-13,i:14-19";

/// 16-bit service UUID assigned to Eddystone
pub const EDDYSTONE_SERVICE_UUID16: u16 = 0xFEAA;

/// Bluetooth Base UUID `00000000-0000-1000-8000-00805F9B34FB`
const BLUETOOTH_BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5F9B_34FB;

/// Expand a 16-bit service UUID onto the Bluetooth Base UUID
#[must_use]
pub const fn service_uuid_from_u16(short: u16) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | ((short as u128) << 96))
}

/// Recover the 16-bit form of a UUID built on the Bluetooth Base UUID
#[must_use]
pub fn service_uuid_to_u16(uuid: Uuid) -> Option<u16> {
    let value = uuid.as_u128();
    let short = (value >> 96) & 0xFFFF_FFFF;
    if value & !(0xFFFF_FFFF << 96) != BLUETOOTH_BASE_UUID || short > u128::from(u16::MAX) {
        return None;
    }
    u16::try_from(short).ok()
}

/// Highest byte offset a layout may address; advertisement payloads are
/// far shorter than this
const MAX_FIELD_OFFSET: usize = 255;

/// Inclusive byte range of one layout field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRange {
    /// First byte offset
    pub start: usize,
    /// Last byte offset (inclusive)
    pub end: usize,
    /// Field is stored least-significant byte first
    pub little_endian: bool,
}

impl FieldRange {
    fn parse(spec: &str, term: &str) -> Result<Self> {
        let (spec, little_endian) = spec
            .strip_suffix('l')
            .map_or((spec, false), |stripped| (stripped, true));

        let (start, end) = spec
            .split_once('-')
            .ok_or_else(|| BeaconError::InvalidLayout(format!("missing range in {term}")))?;
        let start: usize = start
            .parse()
            .map_err(|_| BeaconError::InvalidLayout(format!("bad start offset in {term}")))?;
        let end: usize = end
            .parse()
            .map_err(|_| BeaconError::InvalidLayout(format!("bad end offset in {term}")))?;

        if end < start {
            return Err(BeaconError::InvalidLayout(format!(
                "end before start in {term}"
            )));
        }
        if end > MAX_FIELD_OFFSET {
            return Err(BeaconError::InvalidLayout(format!(
                "offset beyond {MAX_FIELD_OFFSET} in {term}"
            )));
        }

        Ok(Self {
            start,
            end,
            little_endian,
        })
    }

    /// Field length in bytes
    #[must_use]
    pub const fn len(&self) -> usize {
        self.end - self.start + 1
    }

    /// Always false; a range covers at least one byte
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    fn slice<'a>(&self, frame: &'a [u8]) -> &'a [u8] {
        &frame[self.start..=self.end]
    }
}

/// Decoder for one beacon advertisement layout
///
/// Layouts use the comma-separated term syntax popularised by the AltBeacon
/// library:
///
/// - `s:a-b=hex` service UUID the frame must carry (little-endian in the frame)
/// - `m:a-b=hex` bytes the frame must match exactly
/// - `p:a-b[:corr]` signed TX power byte(s), `corr` dBm added on decode
/// - `i:a-b[l]` identifier field
/// - `d:a-b[l]` unsigned data field of at most 8 bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeaconParser {
    layout: String,
    service_uuid: Option<(FieldRange, u16)>,
    matcher: Option<(FieldRange, Vec<u8>)>,
    power: Option<(FieldRange, i16)>,
    identifiers: Vec<FieldRange>,
    data_fields: Vec<FieldRange>,
}

impl BeaconParser {
    /// Parse a layout string
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::InvalidLayout`] if a term is malformed, a field
    /// has an unsupported size, or the layout declares no identifier.
    pub fn from_layout(layout: &str) -> Result<Self> {
        let mut parser = Self {
            layout: layout.to_string(),
            service_uuid: None,
            matcher: None,
            power: None,
            identifiers: Vec::new(),
            data_fields: Vec::new(),
        };

        for term in layout.split(',').map(str::trim) {
            let (kind, rest) = term
                .split_once(':')
                .ok_or_else(|| BeaconError::InvalidLayout(format!("malformed term '{term}'")))?;

            match kind {
                "s" => {
                    let (range, value) = split_value(rest, term)?;
                    let range = FieldRange::parse(range, term)?;
                    if range.len() != 2 {
                        return Err(BeaconError::InvalidLayout(format!(
                            "service UUID must span 2 bytes in {term}"
                        )));
                    }
                    let uuid = u16::from_str_radix(value, 16).map_err(|_| {
                        BeaconError::InvalidLayout(format!("bad service UUID in {term}"))
                    })?;
                    parser.service_uuid = Some((range, uuid));
                }
                "m" => {
                    let (range, value) = split_value(rest, term)?;
                    let range = FieldRange::parse(range, term)?;
                    let expected = hex::decode(value).map_err(|_| {
                        BeaconError::InvalidLayout(format!("bad matcher bytes in {term}"))
                    })?;
                    if expected.len() != range.len() {
                        return Err(BeaconError::InvalidLayout(format!(
                            "matcher length differs from range in {term}"
                        )));
                    }
                    parser.matcher = Some((range, expected));
                }
                "p" => {
                    let (range, correction) = match rest.split_once(':') {
                        Some((range, correction)) => {
                            let correction: i16 = correction.parse().map_err(|_| {
                                BeaconError::InvalidLayout(format!("bad power correction in {term}"))
                            })?;
                            (range, correction)
                        }
                        None => (rest, 0),
                    };
                    let range = FieldRange::parse(range, term)?;
                    if range.len() > 2 {
                        return Err(BeaconError::InvalidLayout(format!(
                            "power field wider than 2 bytes in {term}"
                        )));
                    }
                    parser.power = Some((range, correction));
                }
                "i" => parser.identifiers.push(FieldRange::parse(rest, term)?),
                "d" => {
                    let range = FieldRange::parse(rest, term)?;
                    if range.len() > 8 {
                        return Err(BeaconError::InvalidLayout(format!(
                            "data field wider than 8 bytes in {term}"
                        )));
                    }
                    parser.data_fields.push(range);
                }
                other => {
                    return Err(BeaconError::InvalidLayout(format!(
                        "unknown term type '{other}' in {term}"
                    )));
                }
            }
        }

        if parser.identifiers.is_empty() {
            return Err(BeaconError::InvalidLayout(format!(
                "no identifier fields in '{layout}'"
            )));
        }

        Ok(parser)
    }

    /// Parser for Eddystone UID frames
    ///
    /// # Errors
    ///
    /// Never fails in practice; the layout constant is well-formed.
    pub fn eddystone_uid() -> Result<Self> {
        Self::from_layout(EDDYSTONE_UID_LAYOUT)
    }

    /// The layout string this parser was built from
    #[must_use]
    pub fn layout(&self) -> &str {
        &self.layout
    }

    /// 16-bit service UUID this layout expects, if any
    #[must_use]
    pub fn service_uuid16(&self) -> Option<u16> {
        self.service_uuid.map(|(_, uuid)| uuid)
    }

    /// Decode a service-data advertisement
    ///
    /// The frame is rebuilt as it appears on air (16-bit UUID little-endian,
    /// then the service data) so layout offsets line up.
    #[must_use]
    pub fn decode_service_data(
        &self,
        service_uuid: Uuid,
        data: &[u8],
        rssi: i16,
    ) -> Option<BeaconSighting> {
        let short = service_uuid_to_u16(service_uuid)?;

        let mut frame = BytesMut::with_capacity(2 + data.len());
        frame.put_u16_le(short);
        frame.extend_from_slice(data);

        let mut sighting = self.decode_frame(&frame, rssi)?;
        sighting.service_uuid = Some(short);
        Some(sighting)
    }

    /// Decode a raw frame laid out according to this parser
    #[must_use]
    pub fn decode_frame(&self, frame: &[u8], rssi: i16) -> Option<BeaconSighting> {
        if frame.len() < self.min_frame_len() {
            return None;
        }

        if let Some((range, expected)) = self.service_uuid {
            let mut buf = range.slice(frame);
            if buf.get_u16_le() != expected {
                return None;
            }
        }

        if let Some((range, expected)) = &self.matcher {
            if range.slice(frame) != expected.as_slice() {
                return None;
            }
        }

        let tx_power = self.power.map_or(0, |(range, correction)| {
            let mut buf = range.slice(frame);
            let raw = match (range.len(), range.little_endian) {
                (1, _) => i16::from(buf.get_i8()),
                (_, true) => buf.get_i16_le(),
                (_, false) => buf.get_i16(),
            };
            raw.saturating_add(correction)
        });

        let identifiers = self
            .identifiers
            .iter()
            .map(|range| {
                let mut bytes = range.slice(frame).to_vec();
                if range.little_endian {
                    bytes.reverse();
                }
                Identifier::from_bytes(bytes)
            })
            .collect();

        let data_fields = self
            .data_fields
            .iter()
            .map(|range| {
                let mut buf = range.slice(frame);
                if range.little_endian {
                    buf.get_uint_le(range.len())
                } else {
                    buf.get_uint(range.len())
                }
            })
            .collect();

        Some(BeaconSighting {
            identifiers,
            rssi,
            tx_power,
            data_fields,
            service_uuid: self.service_uuid16(),
            address: None,
        })
    }

    fn min_frame_len(&self) -> usize {
        let fixed = [
            self.service_uuid.map(|(range, _)| range),
            self.matcher.as_ref().map(|(range, _)| *range),
            self.power.map(|(range, _)| range),
        ];

        fixed
            .into_iter()
            .flatten()
            .chain(self.identifiers.iter().copied())
            .chain(self.data_fields.iter().copied())
            .map(|range| range.end + 1)
            .max()
            .unwrap_or(0)
    }
}

fn split_value<'a>(rest: &'a str, term: &str) -> Result<(&'a str, &'a str)> {
    rest.split_once('=')
        .ok_or_else(|| BeaconError::InvalidLayout(format!("missing value in {term}")))
}
