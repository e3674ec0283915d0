//! GPS time reference, kept in step with the monotonic clock.

/// GPS epoch time in milliseconds.
pub type GpsTimeMs = u64;

/// Seconds between the Unix epoch (1970) and the GPS epoch (1980-01-06).
pub const UNIX_GPS_EPOCH_DIFF: u64 = 315_964_800;

/// TAI runs a constant 19 seconds ahead of GPS time.
pub const TAI_GPS_OFFSET: u64 = 19;

/// A single-writer cache of the network-provided GPS time.
///
/// Writers store the GPS milliseconds together with the monotonic tick at
/// which they were captured; readers extrapolate from the current tick. A
/// zero value means the network has not provided time yet.
#[derive(Debug, Clone, Copy)]
pub struct GpsTimeRef {
    gps_ms: GpsTimeMs,
    captured_at_ms: u64,
}

impl GpsTimeRef {
    /// An unset reference.
    pub fn new() -> Self {
        Self {
            gps_ms: 0,
            captured_at_ms: 0,
        }
    }

    /// Stores `gps_ms` as captured at monotonic tick `now_ms`.
    pub fn set(&mut self, gps_ms: GpsTimeMs, now_ms: u64) {
        self.gps_ms = gps_ms;
        self.captured_at_ms = now_ms;
    }

    /// Current GPS time extrapolated to tick `now_ms`, or 0 when unset.
    pub fn get(&self, now_ms: u64) -> GpsTimeMs {
        if self.gps_ms == 0 {
            return 0;
        }
        self.gps_ms + now_ms.saturating_sub(self.captured_at_ms)
    }

    /// Whether a network time has been stored.
    pub fn is_set(&self) -> bool {
        self.gps_ms != 0
    }
}

impl Default for GpsTimeRef {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_reads_zero_regardless_of_tick() {
        let gps = GpsTimeRef::new();
        assert_eq!(gps.get(0), 0);
        assert_eq!(gps.get(123_456), 0);
        assert!(!gps.is_set());
    }

    #[test]
    fn reads_track_the_monotonic_clock() {
        let mut gps = GpsTimeRef::new();
        gps.set(1_000_000, 500);
        assert_eq!(gps.get(500), 1_000_000);
        assert_eq!(gps.get(1_500), 1_001_000);

        let earlier = gps.get(2_000);
        let later = gps.get(3_000);
        assert!(later > earlier);
    }

    #[test]
    fn rewrites_rebase_the_reference() {
        let mut gps = GpsTimeRef::new();
        gps.set(1_000_000, 0);
        gps.set(2_000_000, 10_000);
        assert_eq!(gps.get(10_000), 2_000_000);
    }
}
