use async_trait::async_trait;
use btleplug::{
    api::{Central, CentralEvent, Manager as _, Peripheral as _, PeripheralProperties, ScanFilter},
    platform::{Adapter, Manager, PeripheralId},
};
use futures::stream::{BoxStream, Stream, StreamExt};
use std::{
    collections::HashMap, fmt::Debug, hash::Hash, pin::Pin, sync::Arc, time::Duration,
};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    error::{BeaconError, Result},
    protocol::{service_uuid_from_u16, BeaconParser},
    types::{BeaconSighting, Region, ScanParams},
};

/// Receiving end of a ranging session; one batch per ranging cycle
pub type BatchReceiver = mpsc::Receiver<Vec<BeaconSighting>>;

/// A source of beacon batches
///
/// Implementations bind to some scanning facility, decode advertisements with
/// the registered parsers and deliver every sighting inside the ranged region
/// once per cycle, including empty batches.
#[async_trait]
pub trait ScanBackend: Send {
    /// Connect to the scanning facility and register the beacon layouts
    async fn bind(&mut self, parsers: &[BeaconParser]) -> Result<()>;

    /// Start ranging `region`, returning the batch stream
    async fn start_ranging(&mut self, region: &Region) -> Result<BatchReceiver>;

    /// Release the scanning facility; ranging stops with it
    ///
    /// Must be safe to call when not bound.
    async fn unbind(&mut self) -> Result<()>;
}

/// Scanning backend on top of the platform Bluetooth stack
pub struct BtleplugBackend {
    params: ScanParams,
    manager: Option<Manager>,
    central: Option<Adapter>,
    parsers: Arc<Vec<BeaconParser>>,
    ranging: Option<JoinHandle<()>>,
}

impl BtleplugBackend {
    /// Create an unbound backend
    #[must_use]
    pub fn new(params: ScanParams) -> Self {
        Self {
            params,
            manager: None,
            central: None,
            parsers: Arc::new(Vec::new()),
            ranging: None,
        }
    }

    /// Whether an adapter is currently held
    #[must_use]
    pub const fn is_bound(&self) -> bool {
        self.central.is_some()
    }

    fn scan_filter(&self) -> ScanFilter {
        let mut services: Vec<Uuid> = self
            .parsers
            .iter()
            .filter_map(BeaconParser::service_uuid16)
            .map(service_uuid_from_u16)
            .collect();
        services.sort_unstable();
        services.dedup();

        ScanFilter { services }
    }
}

#[async_trait]
impl ScanBackend for BtleplugBackend {
    async fn bind(&mut self, parsers: &[BeaconParser]) -> Result<()> {
        info!("Binding to Bluetooth adapter {}", self.params.adapter_index);

        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;
        let central = adapters
            .into_iter()
            .nth(self.params.adapter_index)
            .ok_or(BeaconError::AdapterNotFound)?;

        match central.adapter_info().await {
            Ok(adapter_info) => info!("Bound to adapter: {adapter_info}"),
            Err(e) => debug!("Adapter info unavailable: {e}"),
        }

        self.parsers = Arc::new(parsers.to_vec());
        self.central = Some(central);
        self.manager = Some(manager);
        Ok(())
    }

    async fn start_ranging(&mut self, region: &Region) -> Result<BatchReceiver> {
        let central = self.central.clone().ok_or(BeaconError::NotBound)?;

        if let Some(previous) = self.ranging.take() {
            previous.abort();
        }

        let events = central
            .events()
            .await
            .map_err(|e| BeaconError::RangingFailed(format!("event stream unavailable: {e}")))?;

        central
            .start_scan(self.scan_filter())
            .await
            .map_err(|e| BeaconError::RangingFailed(format!("scan did not start: {e}")))?;

        info!("Ranging beacons in region {region}");

        let (sender, receiver) = mpsc::channel(self.params.batch_capacity.max(1));
        let task = tokio::spawn(run_ranging_cycles(
            advertisements(central, events),
            Arc::clone(&self.parsers),
            region.clone(),
            Duration::from_millis(self.params.scan_period_ms),
            sender,
        ));
        self.ranging = Some(task);

        Ok(receiver)
    }

    async fn unbind(&mut self) -> Result<()> {
        if let Some(task) = self.ranging.take() {
            task.abort();
        }

        if let Some(central) = self.central.take() {
            if let Err(e) = central.stop_scan().await {
                warn!("Failed to stop scan while unbinding: {e}");
            }
            info!("Unbound from Bluetooth adapter");
        }

        self.manager = None;
        Ok(())
    }
}

impl Drop for BtleplugBackend {
    fn drop(&mut self) {
        if let Some(task) = self.ranging.take() {
            task.abort();
        }
    }
}

/// Shortest ranging cycle; tokio's interval rejects a zero period
const MIN_SCAN_PERIOD: Duration = Duration::from_millis(1);

/// Service data from one advertiser, with the signal it was received at
#[derive(Debug)]
struct Advertisement<K> {
    advertiser: K,
    rssi: i16,
    address: String,
    service_data: HashMap<Uuid, Vec<u8>>,
}

/// Turn adapter events into advertisements carrying their RSSI
fn advertisements(
    central: Adapter,
    events: Pin<Box<dyn Stream<Item = CentralEvent> + Send>>,
) -> BoxStream<'static, Advertisement<PeripheralId>> {
    events
        .filter_map(move |event| {
            let central = central.clone();
            async move {
                match event {
                    CentralEvent::ServiceDataAdvertisement { id, service_data } => {
                        lookup_advertisement(&central, id, service_data).await
                    }
                    _ => None,
                }
            }
        })
        .boxed()
}

async fn lookup_advertisement(
    central: &Adapter,
    id: PeripheralId,
    service_data: HashMap<Uuid, Vec<u8>>,
) -> Option<Advertisement<PeripheralId>> {
    let properties = match central.peripheral(&id).await {
        Ok(peripheral) => peripheral.properties().await.unwrap_or_else(|e| {
            debug!("Properties unavailable for {id:?}: {e}");
            None
        }),
        Err(e) => {
            debug!("Peripheral lookup failed for {id:?}: {e}");
            None
        }
    };

    with_reported_rssi(id, properties, service_data)
}

/// Attach the reported RSSI to an advertisement
///
/// Without an RSSI the advertisement is skipped for this cycle.
fn with_reported_rssi<K: Debug>(
    advertiser: K,
    properties: Option<PeripheralProperties>,
    service_data: HashMap<Uuid, Vec<u8>>,
) -> Option<Advertisement<K>> {
    let Some((rssi, address)) = properties
        .and_then(|properties| properties.rssi.map(|rssi| (rssi, properties.address)))
    else {
        debug!("No RSSI reported for {advertiser:?}, skipping advertisement");
        return None;
    };

    Some(Advertisement {
        advertiser,
        rssi,
        address: address.to_string(),
        service_data,
    })
}

/// Collect sightings for one scan period, emit them, repeat
async fn run_ranging_cycles<K, S>(
    mut advertisements: S,
    parsers: Arc<Vec<BeaconParser>>,
    region: Region,
    period: Duration,
    batches: mpsc::Sender<Vec<BeaconSighting>>,
) where
    K: Eq + Hash,
    S: Stream<Item = Advertisement<K>> + Unpin,
{
    let mut cycle = interval(period.max(MIN_SCAN_PERIOD));
    cycle.set_missed_tick_behavior(MissedTickBehavior::Delay);
    cycle.tick().await;

    let mut seen: HashMap<K, BeaconSighting> = HashMap::new();

    loop {
        tokio::select! {
            _ = cycle.tick() => {
                let batch: Vec<BeaconSighting> = seen.drain().map(|(_, sighting)| sighting).collect();
                debug!("Ranging cycle complete: {} beacon(s)", batch.len());

                if batches.send(batch).await.is_err() {
                    info!("Ranging subscriber dropped, ending ranging");
                    break;
                }
            }
            advertisement = advertisements.next() => match advertisement {
                Some(Advertisement { advertiser, rssi, address, service_data }) => {
                    if let Some(mut sighting) = decode_advertisement(&parsers, &region, &service_data, rssi) {
                        sighting.address = Some(address);
                        debug!("Beacon {} RSSI {}", sighting.identifier(), sighting.rssi);
                        seen.insert(advertiser, sighting);
                    }
                }
                None => {
                    warn!("Adapter event stream ended, ending ranging");
                    break;
                }
            }
        }
    }
}

/// Decode one service-data advertisement with the first matching parser
///
/// Sightings outside `region` are dropped.
#[must_use]
pub fn decode_advertisement(
    parsers: &[BeaconParser],
    region: &Region,
    service_data: &HashMap<Uuid, Vec<u8>>,
    rssi: i16,
) -> Option<BeaconSighting> {
    service_data.iter().find_map(|(uuid, data)| {
        parsers
            .iter()
            .find_map(|parser| parser.decode_service_data(*uuid, data, rssi))
            .filter(|sighting| region.matches(sighting))
    })
}
