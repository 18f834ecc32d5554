//! Advertisement sources.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_core::Stream;
use tokio::sync::{mpsc, Mutex};

use crate::error::ErrorKind;
use crate::{AdvertisingDevice, Error, Result};

/// A stream of received advertisements. Dropping it stops delivery.
pub type AdvertisementStream = Pin<Box<dyn Stream<Item = AdvertisingDevice> + Send + 'static>>;

/// Something that receives Bluetooth advertisements.
///
/// Implementations should tolerate partial information: any field other than the identity may be missing from an
/// individual advertisement.
#[async_trait]
pub trait AdvertisementSource: Send + Sync + 'static {
    /// Starts receiving advertisements.
    ///
    /// Fails if the radio can't be used (adapter missing or powered off, permission denied). Per-advertisement
    /// problems never surface as errors.
    async fn scan(&self) -> Result<AdvertisementStream>;
}

/// A source fed through a channel by the embedding program.
///
/// Useful when the program already owns a radio stack, and for tests. Every call to [`scan`][Self::scan] reads from
/// the same channel, so a stopped scanner can be started again. Once every sender is dropped and the queued
/// advertisements are consumed, scanning fails with [`ErrorKind::SourceExhausted`].
#[derive(Debug, Clone)]
pub struct ChannelSource {
    receiver: Arc<Mutex<mpsc::Receiver<AdvertisingDevice>>>,
}

impl ChannelSource {
    /// Creates a source buffering up to `capacity` advertisements, and the sender that feeds it.
    pub fn new(capacity: usize) -> (mpsc::Sender<AdvertisingDevice>, ChannelSource) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            sender,
            ChannelSource {
                receiver: Arc::new(Mutex::new(receiver)),
            },
        )
    }
}

#[async_trait]
impl AdvertisementSource for ChannelSource {
    async fn scan(&self) -> Result<AdvertisementStream> {
        {
            let guard = self.receiver.lock().await;
            if guard.is_closed() && guard.is_empty() {
                return Err(Error::new(ErrorKind::SourceExhausted, None, "every sender has been dropped"));
            }
        }

        let receiver = self.receiver.clone();
        Ok(Box::pin(futures_lite::stream::unfold(receiver, |receiver| async move {
            let next = receiver.lock().await.recv().await;
            next.map(|adv| (adv, receiver))
        })))
    }
}
