//! Resident memory sampling for the bounded-listing tests.

/// Resident set size of this process, read from `/proc/self/status`.
///
/// `None` off Linux or when `/proc` is hidden by a sandbox.
pub fn resident_bytes() -> Option<u64> {
    if !cfg!(target_os = "linux") {
        return None;
    }
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let kib = status
        .lines()
        .find_map(|line| line.strip_prefix("VmRSS:"))?
        .split_whitespace()
        .next()?
        .parse::<u64>()
        .ok()?;
    Some(kib * 1024)
}

/// Tracks resident memory growth from a baseline taken at creation.
pub struct RssWatch {
    baseline: Option<u64>,
}

impl RssWatch {
    pub fn start() -> Self {
        Self {
            baseline: resident_bytes(),
        }
    }

    /// Growth since the baseline, or `None` when memory cannot be sampled.
    pub fn growth(&self) -> Option<u64> {
        let baseline = self.baseline?;
        Some(resident_bytes()?.saturating_sub(baseline))
    }

    /// Fail the test if growth exceeds `limit_mib`. Skipped when unsampled.
    pub fn assert_growth_below(&self, limit_mib: u64, what: &str) {
        if let Some(growth) = self.growth() {
            assert!(
                growth < limit_mib << 20,
                "{what} grew resident memory by {:.1} MiB, limit {limit_mib} MiB",
                growth as f64 / (1u64 << 20) as f64
            );
        }
    }
}
