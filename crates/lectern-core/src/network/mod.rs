//! Network reachability tracking.
//!
//! `ConnectivityMonitor` answers "is the network usable right now" and
//! publishes that answer as a live, de-duplicated stream. It is fed either
//! by platform callbacks via [`ConnectivityMonitor::report`] or by a
//! background [`ConnectivityProbe`] poller.

pub mod monitor;
pub mod probe;

pub use monitor::{ConnectivityMonitor, NetworkCapabilities};
pub use probe::{ConnectivityProbe, HttpProbe};
