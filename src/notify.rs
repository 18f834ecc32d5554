//! Coalescing change notifications.
//!
//! Producers mark "something changed" without ever waiting for the consumer. A notification carries no payload: a
//! consumer that sees one re-reads the registry, so markers dropped while the queue is full lose nothing.

use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Semaphore;
use tracing::trace;

/// The sending half of a change notification queue.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    sender: mpsc::Sender<()>,
}

/// The receiving half of a change notification queue.
///
/// Also usable as a [`Stream`][futures_core::Stream] that yields `()` per pending notification and ends once every
/// [`ChangeNotifier`] is dropped.
#[derive(Debug)]
pub struct ChangeReceiver {
    receiver: mpsc::Receiver<()>,
}

impl ChangeNotifier {
    /// Creates a queue that holds at most `capacity` pending notifications. A capacity of zero is raised to one, and
    /// capacities beyond [`Semaphore::MAX_PERMITS`][tokio::sync::Semaphore::MAX_PERMITS] are lowered to it.
    pub fn new(capacity: usize) -> (ChangeNotifier, ChangeReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.clamp(1, Semaphore::MAX_PERMITS));
        (ChangeNotifier { sender }, ChangeReceiver { receiver })
    }

    /// Queues a notification unless the queue is full or the receiver is gone. Never blocks.
    ///
    /// Returns `true` if a notification was queued.
    pub fn notify(&self) -> bool {
        match self.sender.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) => {
                trace!("change notification coalesced");
                false
            }
            Err(TrySendError::Closed(())) => false,
        }
    }

    /// Returns `true` if the receiving half has been dropped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl ChangeReceiver {
    /// Waits for the next notification.
    ///
    /// Returns `false` once every [`ChangeNotifier`] has been dropped and no notifications remain.
    pub async fn changed(&mut self) -> bool {
        self.receiver.recv().await.is_some()
    }

    /// Takes one pending notification without waiting.
    pub fn try_changed(&mut self) -> bool {
        self.receiver.try_recv().is_ok()
    }

    /// Takes every pending notification and returns how many there were.
    pub fn drain(&mut self) -> usize {
        let mut count = 0;
        while self.receiver.try_recv().is_ok() {
            count += 1;
        }
        count
    }
}

impl futures_core::Stream for ChangeReceiver {
    type Item = ();

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<()>> {
        self.receiver.poll_recv(cx)
    }
}
