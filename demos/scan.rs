use std::error::Error;
use std::time::Instant;

use blescan::{BluezSource, DeviceFilter, DeviceStats, Scanner, ScannerConfig, SortKey};
use futures_lite::StreamExt;
use tracing::{info, metadata::LevelFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let source = BluezSource::new().await?;
    let mut scanner = Scanner::new(source, ScannerConfig::from_env());
    let mut changes = scanner.subscribe().ok_or("change receiver already taken")?;

    info!("starting scan");
    scanner.start().await?;
    info!("scan started");

    let filter = DeviceFilter {
        name_contains: std::env::args().nth(1),
        min_rssi: None,
    };

    while changes.next().await.is_some() {
        // a burst of advertisements collapses into one refresh
        changes.drain();

        let mut devices = filter.apply(scanner.registry().snapshot_all());
        SortKey::Rssi.sort(&mut devices);

        let now = Instant::now();
        for device in devices.iter().take(10) {
            let stats = DeviceStats::for_device(device, now);
            info!(
                "{:<24} {:>4} dBm avg {:>6.1} {:<9} {:>5} adv interval {:?} {}",
                device.display_name(),
                device.rssi_current,
                device.rssi_average,
                stats.signal,
                device.adv_count,
                device.adv_interval,
                device.manufacturer_name().unwrap_or_default(),
            );
        }
    }

    scanner.stop().await;
    Ok(())
}
