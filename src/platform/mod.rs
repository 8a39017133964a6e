//! Collaborators of the background run
//!
//! This module provides the seams to the host system:
//! - Clock for scheduling and bounded waits
//! - Network monitor for reachability and meteredness
//! - Installed apps lookup
//! - Notifier for update reports and failures

mod clock;
mod installed;
mod network;
mod notifier;

pub use clock::{Clock, SystemClock};
pub use installed::{InstalledApps, InstalledAppsFile};
pub use network::{NetworkMonitor, ProbeNetworkMonitor};
pub use notifier::{LogNotifier, MessageKey, Notifier, UpdateReport};

use std::sync::Arc;

/// Host system collaborators of a run
#[derive(Clone)]
pub struct Host {
    pub clock: Arc<dyn Clock>,
    pub network: Arc<dyn NetworkMonitor>,
    pub installed: Arc<dyn InstalledApps>,
    pub notifier: Arc<dyn Notifier>,
}
