//! Latched event flags shared between the event callback and the state
//! machine.
//!
//! The radio/IP event callback sets and clears these without taking the
//! config lock; the state machine reads a coherent snapshot at the start of
//! each step. Backed by a single `AtomicU32` so set/clear are wait-free.

use std::sync::atomic::{AtomicU32, Ordering};

use enumset::{EnumSet, EnumSetType};

/// One latched boolean per asynchronous condition.
#[derive(EnumSetType, Debug)]
pub enum Flag {
    /// Explicit wake-up request from the public API.
    Trigger,
    StaStart,
    StaConnected,
    StaGotIp,
    ApStart,
    /// A scan has been requested but not yet issued to the radio.
    ScanStart,
    /// A scan is in flight.
    ScanRunning,
    /// A scan finished and its results await collection.
    ScanDone,
    WpsSuccess,
    WpsFailed,
}

#[derive(Default)]
pub struct EventFlags(AtomicU32);

impl EventFlags {
    #[must_use]
    pub fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Set `flag`; returns `true` if the mask changed.
    pub fn set(&self, flag: Flag) -> bool {
        let bit = EnumSet::only(flag).as_u32();
        self.0.fetch_or(bit, Ordering::AcqRel) & bit == 0
    }

    /// Clear `flag`; returns `true` if the mask changed.
    pub fn clear(&self, flag: Flag) -> bool {
        let bit = EnumSet::only(flag).as_u32();
        self.0.fetch_and(!bit, Ordering::AcqRel) & bit != 0
    }

    #[must_use]
    pub fn contains(&self, flag: Flag) -> bool {
        self.snapshot().contains(flag)
    }

    /// Coherent view of the whole mask.
    #[must_use]
    pub fn snapshot(&self) -> EnumSet<Flag> {
        EnumSet::from_u32_truncated(self.0.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_clear_report_changes() {
        let flags = EventFlags::new();
        assert!(flags.set(Flag::StaConnected));
        assert!(!flags.set(Flag::StaConnected));
        assert!(flags.contains(Flag::StaConnected));
        assert!(flags.clear(Flag::StaConnected));
        assert!(!flags.clear(Flag::StaConnected));
        assert!(!flags.contains(Flag::StaConnected));
    }

    #[test]
    fn snapshot_is_a_coherent_mask() {
        let flags = EventFlags::new();
        flags.set(Flag::ScanStart);
        flags.set(Flag::Trigger);
        let snap = flags.snapshot();
        assert_eq!(snap, Flag::ScanStart | Flag::Trigger);
        // Later mutations do not affect an already-taken snapshot.
        flags.clear(Flag::ScanStart);
        assert!(snap.contains(Flag::ScanStart));
    }
}
