use async_trait::async_trait;
use eddyscan::{
    App, BatchReceiver, BeaconError, BeaconList, BeaconParser, BeaconSession, BeaconSighting,
    PermissionGate, PermissionStatus, Region, Result, ScanBackend, ScanParams,
};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::{sync::mpsc, time::timeout};
use tokio_test::assert_ok;

/// Backend fed by the test through an mpsc sender
#[derive(Default)]
struct ChannelBackend {
    batches: Option<BatchReceiver>,
    fail_bind: bool,
    fail_ranging: bool,
    bind_delay: Option<Duration>,
    registered_layouts: Arc<Mutex<Vec<String>>>,
    ranged_regions: Arc<Mutex<Vec<Region>>>,
    unbinds: Arc<AtomicUsize>,
}

impl ChannelBackend {
    fn with_feed() -> (Self, mpsc::Sender<Vec<BeaconSighting>>) {
        let (sender, receiver) = mpsc::channel(8);
        let backend = Self {
            batches: Some(receiver),
            ..Self::default()
        };
        (backend, sender)
    }
}

#[async_trait]
impl ScanBackend for ChannelBackend {
    async fn bind(&mut self, parsers: &[BeaconParser]) -> Result<()> {
        if let Some(delay) = self.bind_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_bind {
            return Err(BeaconError::AdapterNotFound);
        }
        self.registered_layouts
            .lock()
            .unwrap()
            .extend(parsers.iter().map(|p| p.layout().to_string()));
        Ok(())
    }

    async fn start_ranging(&mut self, region: &Region) -> Result<BatchReceiver> {
        self.ranged_regions.lock().unwrap().push(region.clone());
        if self.fail_ranging {
            return Err(BeaconError::RangingFailed("service unavailable".to_string()));
        }
        self.batches.take().ok_or(BeaconError::NotBound)
    }

    async fn unbind(&mut self) -> Result<()> {
        self.unbinds.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct DeniedGate;

impl PermissionGate for DeniedGate {
    fn check(&self) -> PermissionStatus {
        PermissionStatus::Denied
    }

    fn request(&self) {}
}

struct GrantedGate;

impl PermissionGate for GrantedGate {
    fn check(&self) -> PermissionStatus {
        PermissionStatus::Granted
    }

    fn request(&self) {}
}

fn sighting(id1: &str, rssi: i16) -> BeaconSighting {
    BeaconSighting::new(vec![id1.parse().unwrap()], rssi)
}

fn session_with(backend: ChannelBackend, beacons: &BeaconList) -> BeaconSession<ChannelBackend> {
    let mut session = BeaconSession::new(backend, ScanParams::default(), beacons.clone());
    session.add_parser(BeaconParser::eddystone_uid().unwrap());
    session
}

async fn wait_until_idle(session: &BeaconSession<ChannelBackend>) {
    timeout(Duration::from_secs(2), async {
        while session.is_ranging() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("ranging subscriber did not finish");
}

#[tokio::test]
async fn test_bind_registers_layout_and_ranges_all_beacons() {
    let (backend, _feed) = ChannelBackend::with_feed();
    let layouts = Arc::clone(&backend.registered_layouts);
    let regions = Arc::clone(&backend.ranged_regions);
    let beacons = BeaconList::new();

    let mut session = session_with(backend, &beacons);
    assert_ok!(session.bind().await);

    assert!(session.is_bound());
    assert!(session.is_ranging());
    assert_eq!(
        layouts.lock().unwrap().as_slice(),
        &[eddyscan::EDDYSTONE_UID_LAYOUT.to_string()]
    );
    assert_eq!(regions.lock().unwrap().as_slice(), &[Region::all_beacons()]);

    session.unbind().await;
}

#[tokio::test]
async fn test_list_tracks_latest_nonempty_batch() {
    let (backend, feed) = ChannelBackend::with_feed();
    let beacons = BeaconList::new();
    let mut session = session_with(backend, &beacons);
    assert_ok!(session.bind().await);

    let first = vec![sighting("0x01", -60), sighting("0x02", -70)];
    let second = vec![sighting("0x03", -80)];

    feed.send(first).await.unwrap();
    feed.send(Vec::new()).await.unwrap();
    feed.send(second.clone()).await.unwrap();
    feed.send(Vec::new()).await.unwrap();
    drop(feed);

    wait_until_idle(&session).await;
    assert_eq!(beacons.snapshot().as_slice(), second.as_slice());

    session.unbind().await;
}

#[tokio::test]
async fn test_empty_batch_keeps_vanished_beacons() {
    let (backend, feed) = ChannelBackend::with_feed();
    let beacons = BeaconList::new();
    let mut view = beacons.subscribe();
    let mut session = session_with(backend, &beacons);
    assert_ok!(session.bind().await);

    feed.send(vec![sighting("0xaa", -55)]).await.unwrap();
    assert!(view.changed().await);

    feed.send(Vec::new()).await.unwrap();
    drop(feed);
    wait_until_idle(&session).await;

    assert_eq!(beacons.snapshot().as_slice(), &[sighting("0xaa", -55)]);
    session.unbind().await;
}

#[tokio::test]
async fn test_ranging_failure_is_swallowed() {
    let (mut backend, feed) = ChannelBackend::with_feed();
    backend.fail_ranging = true;
    let beacons = BeaconList::new();
    beacons.replace_with(vec![sighting("0x0f", -90)]);

    let mut session = session_with(backend, &beacons);
    assert_ok!(session.bind().await);

    assert!(session.is_bound());
    assert!(!session.is_ranging());
    assert!(feed.send(vec![sighting("0x10", -40)]).await.is_ok());
    assert_eq!(beacons.snapshot().as_slice(), &[sighting("0x0f", -90)]);

    session.unbind().await;
}

#[tokio::test]
async fn test_unbind_without_bind_is_safe() {
    let backend = ChannelBackend::default();
    let unbinds = Arc::clone(&backend.unbinds);
    let beacons = BeaconList::new();

    let mut session = session_with(backend, &beacons);
    session.unbind().await;
    session.unbind().await;

    assert!(!session.is_bound());
    assert_eq!(unbinds.load(Ordering::SeqCst), 2);
    assert!(beacons.is_empty());
}

#[tokio::test]
async fn test_bind_failure_propagates() {
    let backend = ChannelBackend {
        fail_bind: true,
        ..ChannelBackend::default()
    };
    let beacons = BeaconList::new();
    let mut session = session_with(backend, &beacons);

    let result = session.bind().await;
    assert!(matches!(result, Err(BeaconError::AdapterNotFound)));
    assert!(!session.is_bound());
    assert!(!session.is_ranging());

    session.unbind().await;
}

#[tokio::test]
async fn test_bind_timeout() {
    let backend = ChannelBackend {
        bind_delay: Some(Duration::from_secs(5)),
        ..ChannelBackend::default()
    };
    let params = ScanParams {
        bind_timeout_ms: 20,
        ..ScanParams::default()
    };
    let mut session = BeaconSession::new(backend, params, BeaconList::new());

    let result = session.bind().await;
    assert!(matches!(result, Err(BeaconError::Timeout { timeout_ms: 20 })));
}

#[tokio::test]
async fn test_unbind_stops_forwarding() {
    let (backend, feed) = ChannelBackend::with_feed();
    let beacons = BeaconList::new();
    let mut session = session_with(backend, &beacons);
    assert_ok!(session.bind().await);

    session.unbind().await;
    assert!(!session.is_ranging());

    let _ = feed.send(vec![sighting("0x01", -60)]).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(beacons.is_empty());
}

#[tokio::test]
async fn test_app_renders_and_releases_session() {
    let (backend, feed) = ChannelBackend::with_feed();
    let unbinds = Arc::clone(&backend.unbinds);
    let app = App::new(backend, ScanParams::default()).unwrap();
    let mut view = app.beacons().subscribe();

    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
    let runner = tokio::spawn(async move {
        let mut out = Vec::new();
        let result = app
            .run(&GrantedGate, &mut out, async {
                let _ = stopped.await;
            })
            .await;
        result.map(|()| String::from_utf8(out).unwrap())
    });

    feed.send(vec![sighting("0x0a0b0c0d0e0f10111213", -60)])
        .await
        .unwrap();
    assert!(view.changed().await);
    tokio::time::sleep(Duration::from_millis(20)).await;

    stop.send(()).unwrap();
    let screen = runner.await.unwrap().unwrap();

    assert!(screen.starts_with("Detected Beacons:\nNo beacons detected.\n"));
    assert!(screen.contains("Beacon: 0x0a0b0c0d0e0f10111213, RSSI: -60"));
    assert_eq!(unbinds.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_app_keeps_running_when_permission_denied() {
    let (backend, _feed) = ChannelBackend::with_feed();
    let regions = Arc::clone(&backend.ranged_regions);
    let app = App::new(backend, ScanParams::default()).unwrap();

    let mut out = Vec::new();
    assert_ok!(app.run(&DeniedGate, &mut out, async {}).await);

    // Scanning is attempted regardless of the permission outcome
    assert_eq!(regions.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_app_requiring_permission_skips_bind() {
    let (backend, _feed) = ChannelBackend::with_feed();
    let regions = Arc::clone(&backend.ranged_regions);
    let params = ScanParams {
        require_permission: true,
        ..ScanParams::default()
    };
    let mut app = App::new(backend, params).unwrap();

    app.start(&DeniedGate).await;
    assert!(!app.session().is_bound());
    assert!(regions.lock().unwrap().is_empty());

    app.stop().await;
}
