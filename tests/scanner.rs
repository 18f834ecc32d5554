use std::time::{Duration, Instant};

use async_trait::async_trait;
use blescan::error::ErrorKind;
use blescan::*;

const BEACON: &[u8] = &[
    0x02, 0x01, 0x06, // flags
    0x05, 0x09, b'L', b'a', b'm', b'p', // complete local name
    0x03, 0x03, 0x0f, 0x18, // battery service
    0x05, 0xff, 0x4c, 0x00, 0x02, 0x15, // Apple manufacturer data
];

fn config() -> ScannerConfig {
    ScannerConfig {
        device_ttl: Duration::from_secs(30),
        sweep_interval: Duration::from_secs(5),
        notify_capacity: 8,
    }
}

async fn wait_for_count(registry: &DeviceRegistry, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while registry.count() != count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("registry never reached the expected size");
}

#[tokio::test]
async fn ingests_until_stopped_and_keeps_devices() {
    let (tx, source) = ChannelSource::new(64);
    let mut scanner = Scanner::new(source, config());
    let mut changes = scanner.subscribe().unwrap();
    assert!(scanner.subscribe().is_none());

    scanner.start().await.unwrap();
    assert!(scanner.is_running());

    let start = Instant::now();
    for i in 0..10u64 {
        let ts = start + Duration::from_millis(100 * i);
        tx.send(AdvertisingDevice::from_raw("AA:BB:CC:DD:EE:01", -55, BEACON, ts))
            .await
            .unwrap();
    }
    tx.send(AdvertisingDevice::from_raw("AA:BB:CC:DD:EE:02", -80, &[0x02, 0x01, 0x04], start))
        .await
        .unwrap();

    assert!(changes.changed().await);
    wait_for_count(scanner.registry(), 2).await;

    scanner.stop().await;
    assert!(!scanner.is_running());

    let lamp = scanner.registry().snapshot_one(&"AA:BB:CC:DD:EE:01".into()).unwrap();
    assert_eq!(lamp.display_name(), "Lamp");
    assert_eq!(lamp.adv_count, 10);
    assert_eq!(lamp.rssi_current, -55);
    assert_eq!(lamp.adv_interval, Some(Duration::from_millis(100)));
    assert_eq!(lamp.services, vec![Uuid::from_u16(0x180f)]);
    assert_eq!(lamp.manufacturer_name().as_deref(), Some("Apple, Inc."));
    assert_eq!(lamp.ad_types.iter().copied().collect::<Vec<_>>(), vec![0x01, 0x03, 0x09, 0xff]);
    assert!(lamp.raw_data_hex().is_some());

    // advertisements sent while stopped are picked up after a restart
    tx.send(AdvertisingDevice::from_raw("AA:BB:CC:DD:EE:03", -70, &[], start))
        .await
        .unwrap();
    assert_eq!(scanner.registry().count(), 2);

    scanner.start().await.unwrap();
    wait_for_count(scanner.registry(), 3).await;
    scanner.stop().await;
}

#[tokio::test]
async fn missing_rssi_is_dropped() {
    let (tx, source) = ChannelSource::new(8);
    let mut scanner = Scanner::new(source, config());
    scanner.start().await.unwrap();

    let now = Instant::now();
    tx.send(AdvertisingDevice::from_decoded("silent", None, AdvertisementData::default(), now))
        .await
        .unwrap();
    tx.send(AdvertisingDevice::from_decoded("loud", Some(-30), AdvertisementData::default(), now))
        .await
        .unwrap();

    wait_for_count(scanner.registry(), 1).await;
    scanner.stop().await;
    assert!(scanner.registry().contains(&"loud".into()));
    assert!(!scanner.registry().contains(&"silent".into()));
}

#[tokio::test]
async fn sweeper_evicts_while_scanning() {
    let (tx, source) = ChannelSource::new(8);
    let mut scanner = Scanner::new(
        source,
        ScannerConfig {
            device_ttl: Duration::from_millis(50),
            sweep_interval: Duration::from_millis(10),
            notify_capacity: 8,
        },
    );
    scanner.start().await.unwrap();

    tx.send(AdvertisingDevice::from_raw("gone", -60, &[], Instant::now()))
        .await
        .unwrap();
    wait_for_count(scanner.registry(), 1).await;
    wait_for_count(scanner.registry(), 0).await;

    scanner.stop().await;
}

async fn wait_until_stopped<S: AdvertisementSource>(scanner: &Scanner<S>) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while scanner.is_running() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("scanner kept running after its source ended");
}

#[tokio::test]
async fn ended_channel_stops_scanner_and_reports_exhaustion() {
    let (tx, source) = ChannelSource::new(8);
    let mut scanner = Scanner::new(source, config());
    scanner.start().await.unwrap();

    tx.send(AdvertisingDevice::from_raw("AA:BB:CC:DD:EE:01", -60, BEACON, Instant::now()))
        .await
        .unwrap();
    drop(tx);

    wait_until_stopped(&scanner).await;
    assert_eq!(scanner.registry().count(), 1);

    let err = scanner.start().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SourceExhausted);
    assert!(!scanner.is_running());
    assert_eq!(scanner.registry().count(), 1);
}

/// Delivers one advertisement per scan, then ends.
struct OneShot;

#[async_trait]
impl AdvertisementSource for OneShot {
    async fn scan(&self) -> Result<AdvertisementStream> {
        let adv = AdvertisingDevice::from_raw("AA:BB:CC:DD:EE:07", -65, BEACON, Instant::now());
        Ok(Box::pin(futures_lite::stream::once(adv)))
    }
}

#[tokio::test]
async fn ended_stream_can_be_restarted() {
    let mut scanner = Scanner::new(OneShot, config());

    scanner.start().await.unwrap();
    wait_until_stopped(&scanner).await;

    scanner.start().await.unwrap();
    wait_until_stopped(&scanner).await;

    let device = scanner.registry().snapshot_one(&"AA:BB:CC:DD:EE:07".into()).unwrap();
    assert_eq!(device.adv_count, 2);
    scanner.stop().await;
}

struct PoweredOff;

#[async_trait]
impl AdvertisementSource for PoweredOff {
    async fn scan(&self) -> Result<AdvertisementStream> {
        Err(Error::new(ErrorKind::AdapterUnavailable, None, "adapter is powered off"))
    }
}

#[tokio::test]
async fn source_failure_is_reported() {
    let mut scanner = Scanner::new(PoweredOff, config());
    let err = scanner.start().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AdapterUnavailable);
    assert!(!scanner.is_running());
    scanner.stop().await;
}
