use std::collections::BTreeSet;
use std::time::Instant;

use async_trait::async_trait;
use futures_lite::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::ErrorKind;
use crate::source::{AdvertisementSource, AdvertisementStream};
use crate::{AdvertisementData, AdvertisingDevice, DeviceId, Error, ManufacturerData, Result};

/// Buffered advertisements between the BlueZ event stream and the scanner
const EVENT_BUFFER: usize = 256;

impl From<::bluer::Error> for Error {
    fn from(err: ::bluer::Error) -> Self {
        Error::new(kind_from_bluer(&err), Some(Box::new(err)), String::new())
    }
}

fn kind_from_bluer(err: &::bluer::Error) -> ErrorKind {
    match err.kind {
        ::bluer::ErrorKind::NotReady => ErrorKind::AdapterUnavailable,
        ::bluer::ErrorKind::NotAuthorized | ::bluer::ErrorKind::NotPermitted => ErrorKind::NotAuthorized,
        ::bluer::ErrorKind::NotFound => ErrorKind::AdapterUnavailable,
        _ => ErrorKind::Other,
    }
}

/// Advertisements received through BlueZ.
///
/// BlueZ reports advertisements as property changes on its device objects, so every change to a discovered device is
/// delivered as one advertisement carrying the device's current properties.
#[derive(Debug, Clone)]
pub struct BluezSource {
    adapter: ::bluer::Adapter,
}

impl BluezSource {
    /// Opens the system's default Bluetooth adapter.
    pub async fn new() -> Result<Self> {
        let session = ::bluer::Session::new().await?;
        let adapter = session.default_adapter().await?;
        Ok(BluezSource { adapter })
    }

    /// Opens the adapter named `name`, e.g. `hci1`.
    pub async fn with_adapter_name(name: &str) -> Result<Self> {
        let session = ::bluer::Session::new().await?;
        let adapter = session.adapter(name)?;
        Ok(BluezSource { adapter })
    }
}

#[async_trait]
impl AdvertisementSource for BluezSource {
    async fn scan(&self) -> Result<AdvertisementStream> {
        if !self.adapter.is_powered().await? {
            return Err(Error::new(
                ErrorKind::AdapterUnavailable,
                None,
                format!("{} is powered off", self.adapter.name()),
            ));
        }

        let events = self.adapter.discover_devices_with_changes().await?;
        let adapter = self.adapter.clone();
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        tokio::spawn(async move {
            let mut events = std::pin::pin!(events);
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    event = events.next() => match event {
                        Some(::bluer::AdapterEvent::DeviceAdded(addr)) => {
                            let Ok(device) = adapter.device(addr) else {
                                continue;
                            };
                            let adv = advertising_device(&device).await;
                            if tx.send(adv).await.is_err() {
                                break;
                            }
                        }
                        Some(_) => (),
                        None => break,
                    }
                }
            }
            debug!("BlueZ discovery ended");
        });

        Ok(Box::pin(futures_lite::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|adv| (adv, rx))
        })))
    }
}

async fn advertising_device(device: &::bluer::Device) -> AdvertisingDevice {
    let received_at = Instant::now();
    let id = DeviceId::new(device.address().to_string());

    let rssi = device.rssi().await.ok().flatten();

    let local_name = device.name().await.ok().flatten().filter(|name| !name.is_empty());

    // BlueZ keys manufacturer data by company; take the lowest for a stable choice
    let manufacturer_data = device
        .manufacturer_data()
        .await
        .ok()
        .flatten()
        .and_then(|data| data.into_iter().min_by_key(|(company_id, _)| *company_id))
        .map(|(company_id, data)| ManufacturerData { company_id, data });

    let service_data = device.service_data().await.ok().flatten().unwrap_or_default();

    let mut services: Vec<_> = device
        .uuids()
        .await
        .ok()
        .flatten()
        .map_or(Vec::new(), |x| x.into_iter().collect());
    services.sort();

    let tx_power_level = device.tx_power().await.ok().flatten();
    let appearance = device.appearance().await.ok().flatten();
    let flags = device
        .advertising_flags()
        .await
        .ok()
        .and_then(|flags| flags.first().copied());

    // BlueZ doesn't expose the PDU type; named devices and devices with service data are usually connectable
    let is_connectable = local_name.is_some() || !service_data.is_empty();

    let mut adv_data = AdvertisementData {
        local_name,
        manufacturer_data,
        services,
        service_data,
        tx_power_level,
        flags,
        appearance,
        is_connectable,
        ad_types: Default::default(),
    };
    let passthrough = device.advertising_data().await.ok().flatten().unwrap_or_default();
    adv_data.ad_types = ad_types(&adv_data, passthrough.keys().copied());

    trace!(%id, ?rssi, "BlueZ advertisement");
    AdvertisingDevice::from_decoded(id, rssi, adv_data, received_at)
}

/// BlueZ parses the common AD types into properties and only passes the remaining ones through raw, so the codes
/// of a packet are those of the parsed fields plus the passthrough keys.
fn ad_types(adv_data: &AdvertisementData, passthrough: impl IntoIterator<Item = u8>) -> BTreeSet<u8> {
    let mut ad_types = adv_data.infer_ad_types();
    ad_types.extend(passthrough);
    ad_types
}
