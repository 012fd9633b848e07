use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::ConnectivityProbe;

/// What the platform reports about the active network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetworkCapabilities {
    /// The active network claims internet capability.
    pub has_internet: bool,
    /// Internet access on that network was actually verified.
    pub validated: bool,
}

impl NetworkCapabilities {
    pub const NONE: Self = Self {
        has_internet: false,
        validated: false,
    };

    pub const VALIDATED: Self = Self {
        has_internet: true,
        validated: true,
    };

    /// A radio that is merely on does not count.
    pub fn is_usable(&self) -> bool {
        self.has_internet && self.validated
    }
}

/// Transitions buffered per subscriber before it has to resync.
const TRANSITION_BUFFER: usize = 32;

/// Current connectivity plus a live stream of changes.
///
/// Clone is cheap; all clones share one underlying status.
#[derive(Clone, Debug)]
pub struct ConnectivityMonitor {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    online: Mutex<bool>,
    transitions: broadcast::Sender<bool>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, bool> {
        self.online.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ConnectivityMonitor {
    pub fn new(initially_available: bool) -> Self {
        let (transitions, _) = broadcast::channel(TRANSITION_BUFFER);
        Self {
            inner: Arc::new(Inner {
                online: Mutex::new(initially_available),
                transitions,
            }),
        }
    }

    /// Point-in-time check.
    pub fn is_available(&self) -> bool {
        *self.inner.lock()
    }

    /// Record a platform connectivity callback.
    pub fn report(&self, capabilities: NetworkCapabilities) {
        let usable = capabilities.is_usable();
        let mut online = self.inner.lock();
        if *online == usable {
            debug!(online = usable, ?capabilities, "Connectivity unchanged");
            return;
        }
        *online = usable;
        // Sent under the lock so every subscriber sees transitions in order.
        let _ = self.inner.transitions.send(usable);
        info!(online = usable, "Connectivity changed");
    }

    pub fn set_available(&self, available: bool) {
        let capabilities = if available {
            NetworkCapabilities::VALIDATED
        } else {
            NetworkCapabilities::NONE
        };
        self.report(capabilities);
    }

    /// Live connectivity stream.
    ///
    /// Emits the state at the time of the call, then one element per
    /// transition reported afterwards, including short flaps. Consecutive
    /// identical states are never emitted twice.
    pub fn observe(&self) -> BoxStream<'static, bool> {
        let (current, rx) = {
            let online = self.inner.lock();
            (*online, self.inner.transitions.subscribe())
        };
        let inner = Arc::downgrade(&self.inner);

        stream::once(async move { current })
            .chain(stream::unfold((rx, current), move |(mut rx, last)| {
                let inner = Weak::clone(&inner);
                async move {
                    loop {
                        let next = match rx.recv().await {
                            Ok(online) => online,
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                warn!(skipped = skipped, "Connectivity observer fell behind, resyncing");
                                let inner = inner.upgrade()?;
                                let online = *inner.lock();
                                online
                            }
                            Err(broadcast::error::RecvError::Closed) => return None,
                        };
                        if next != last {
                            return Some((next, (rx, next)));
                        }
                    }
                }
            }))
            .boxed()
    }

    /// Poll `probe` every `interval` and report what it sees.
    pub fn spawn_probe(&self, probe: Arc<dyn ConnectivityProbe>, interval: Duration) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            loop {
                let capabilities = probe.probe().await;
                monitor.report(capabilities);
                tokio::time::sleep(interval).await;
            }
        })
    }
}
