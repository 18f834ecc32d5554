#![allow(clippy::let_unit_value)]

use blescan::*;
use futures_lite::StreamExt;

fn assert_send<T: Send>(t: T) -> T {
    t
}

fn assert_sync<T: Sync>(t: &T) -> &T {
    t
}

async fn check_source_apis<S: AdvertisementSource>(source: S) -> Result<Option<AdvertisingDevice>> {
    let stream: Result<AdvertisementStream> = assert_send(source.scan()).await;
    let adv: Option<AdvertisingDevice> = assert_send(stream?.next()).await;
    Ok(adv)
}

async fn check_scanner_apis<S: AdvertisementSource>(mut scanner: Scanner<S>) -> Result<Vec<Device>> {
    let changes: Option<ChangeReceiver> = scanner.subscribe();
    let _res: Result<()> = assert_send(scanner.start()).await;
    let _running: bool = scanner.is_running();

    let mut changes = changes.unwrap();
    let _changed: bool = assert_send(changes.changed()).await;
    let _changed: Option<()> = assert_send(changes.next()).await;
    let _drained: usize = changes.drain();

    let registry: &DeviceRegistry = assert_sync(&**scanner.registry());
    let devices: Vec<Device> = registry.snapshot_all();
    let _count: usize = registry.count();

    scanner.clear();
    let _stop: () = assert_send(scanner.stop()).await;

    Ok(devices)
}

async fn check_sweeper_apis(registry: std::sync::Arc<DeviceRegistry>) {
    let mut sweeper = EvictionSweeper::start(
        registry,
        std::time::Duration::from_secs(30),
        std::time::Duration::from_secs(5),
    );
    let _stop: () = assert_send(sweeper.stop()).await;
}

#[allow(unused)]
async fn check_apis() -> Result<()> {
    let (tx, source) = ChannelSource::new(16);
    let _adv: Option<AdvertisingDevice> = check_source_apis(source.clone()).await?;

    let scanner = Scanner::new(source, ScannerConfig::default());
    let registry = scanner.registry().clone();
    let _devices: Vec<Device> = check_scanner_apis(scanner).await?;
    check_sweeper_apis(registry).await;
    drop(tx);

    Ok(())
}

fn main() {}
