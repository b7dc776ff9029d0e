//! Scan-result snapshots.
//!
//! A completed scan is materialised into an immutable [`ScanSnapshot`]
//! behind an `Arc`. The manager's own slot holds one strong reference;
//! readers get clones and simply drop them when done, so a snapshot stays
//! readable after a newer scan has replaced it.

use embedded_svc::wifi::AccessPointInfo;

use crate::platform::Tick;

/// Hard cap on the number of records kept from one scan.
pub const MAX_SCAN_RECORDS: usize = 32;

/// Immutable view of one completed scan.
#[derive(Debug, Clone)]
pub struct ScanSnapshot {
    /// Manager tick at collection time.
    pub tstamp: Tick,
    pub records: Vec<AccessPointInfo>,
}

impl ScanSnapshot {
    /// Build a snapshot, truncating to [`MAX_SCAN_RECORDS`].
    #[must_use]
    pub fn new(tstamp: Tick, mut records: Vec<AccessPointInfo>) -> Self {
        records.truncate(MAX_SCAN_RECORDS);
        Self { tstamp, records }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
