use super::ReleaseAdjuster;

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Snaps implied release times onto a display refresh grid.
///
/// The grid is anchored at `origin_ns` with one slot every `interval_ns`.
/// Compositors latch frames on vsync boundaries, so the adjusted release
/// lands on the boundary nearest the requested time, which may be earlier
/// or later than requested by up to half an interval.
#[derive(Debug, Clone)]
pub struct VsyncAligned {
    interval_ns: i64,
    origin_ns: i64,
}

impl VsyncAligned {
    /// Grid from a refresh rate in Hz, anchored at `origin_ns`.
    pub fn from_refresh_rate(refresh_hz: f64, origin_ns: i64) -> Self {
        let interval_ns = (NANOS_PER_SEC as f64 / refresh_hz) as i64;
        Self::with_interval(interval_ns, origin_ns)
    }

    /// Grid with an explicit vsync interval in nanoseconds.
    pub fn with_interval(interval_ns: i64, origin_ns: i64) -> Self {
        Self {
            interval_ns: interval_ns.max(1),
            origin_ns,
        }
    }

    /// Vsync interval in nanoseconds.
    pub fn interval_ns(&self) -> i64 {
        self.interval_ns
    }

    fn snap(&self, release_ns: i64) -> i64 {
        let offset = release_ns - self.origin_ns;
        let slots = (offset + self.interval_ns / 2).div_euclid(self.interval_ns);
        self.origin_ns + slots * self.interval_ns
    }
}

impl ReleaseAdjuster for VsyncAligned {
    fn adjust_early_us(&mut self, early_us: i64, now_ns: i64) -> i64 {
        let release_ns = now_ns + early_us * 1_000;
        (self.snap(release_ns) - now_ns) / 1_000
    }
}
