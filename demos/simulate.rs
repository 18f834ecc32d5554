//! Feeds synthetic advertisements through a scanner and prints the aggregated devices.

use std::error::Error;
use std::time::{Duration, Instant};

use blescan::{AdvertisingDevice, ChannelSource, Scanner, ScannerConfig, SortKey};
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

    let (tx, source) = ChannelSource::new(64);
    let mut scanner = Scanner::new(source, ScannerConfig::from_env());
    scanner.start().await?;

    let beacons: [(&str, &[u8]); 3] = [
        ("C4:7C:8D:6A:11:01", &[0x02, 0x01, 0x06, 0x05, 0xff, 0x4c, 0x00, 0x10, 0x05]),
        (
            "E8:9F:6D:22:31:02",
            &[0x02, 0x01, 0x06, 0x07, 0x09, b'S', b'e', b'n', b's', b'o', b'r', 0x04, 0x16, 0x0f, 0x18, 0x5a],
        ),
        ("F0:1D:BC:33:41:03", &[0x02, 0x01, 0x1a, 0x03, 0x19, 0xc1, 0x00, 0x02, 0x0a, 0xf8]),
    ];

    for round in 0..20i16 {
        for (i, (id, raw)) in beacons.iter().enumerate() {
            let rssi = -45 - 10 * i as i16 - round % 4;
            tx.send(AdvertisingDevice::from_raw(*id, rssi, raw, Instant::now())).await?;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    scanner.stop().await;

    let mut devices = scanner.registry().snapshot_all();
    SortKey::Rssi.sort(&mut devices);
    for device in &devices {
        info!(
            "{} rssi {} avg {:.1} count {} interval {:?} flags {} fields {:?}",
            device.display_name(),
            device.rssi_current,
            device.rssi_average,
            device.adv_count,
            device.adv_interval,
            device.flags_description().unwrap_or_else(|| "-".to_string()),
            device.ad_fields(),
        );
    }

    Ok(())
}
