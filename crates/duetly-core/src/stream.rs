// ── Reactive model streams ──
//
// Subscription type for consuming object-model snapshots.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::model::ObjectModel;

/// A subscription to the object model.
///
/// Provides both point-in-time snapshot access and change notification via
/// `changed()` or by converting to a `Stream`.
pub struct ModelStream {
    current: Arc<ObjectModel>,
    receiver: watch::Receiver<Arc<ObjectModel>>,
}

impl ModelStream {
    pub(crate) fn new(receiver: watch::Receiver<Arc<ObjectModel>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// Snapshot captured at creation or at the last `changed()`.
    pub fn current(&self) -> &Arc<ObjectModel> {
        &self.current
    }

    /// Latest published snapshot.
    pub fn latest(&self) -> Arc<ObjectModel> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next published snapshot.
    /// Returns `None` once the connector has been dropped.
    pub async fn changed(&mut self) -> Option<Arc<ObjectModel>> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = snap.clone();
        Some(snap)
    }

    pub fn into_stream(self) -> ModelWatchStream {
        ModelWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter yielding each published snapshot, starting with the
/// current one.
pub struct ModelWatchStream {
    inner: WatchStream<Arc<ObjectModel>>,
}

impl Stream for ModelWatchStream {
    type Item = Arc<ObjectModel>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
