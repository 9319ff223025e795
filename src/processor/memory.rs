//! Memory-aware concurrency sizing.

use std::sync::Mutex;

use sysinfo::System;

/// Source of the currently available system memory, in megabytes.
pub trait MemoryProbe: Send + Sync {
    fn available_mb(&self) -> f64;
}

/// Reads available memory from the OS through `sysinfo`.
pub struct SystemMemory {
    sys: Mutex<System>,
}

impl SystemMemory {
    pub fn new() -> Self {
        Self {
            sys: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SystemMemory {
    fn available_mb(&self) -> f64 {
        match self.sys.lock() {
            Ok(mut sys) => {
                sys.refresh_memory();
                sys.available_memory() as f64 / (1024.0 * 1024.0)
            }
            // A poisoned probe reads as no headroom, which yields min concurrency.
            Err(_) => 0.0,
        }
    }
}

/// Maps available memory onto a concurrency level between `min` and `max`.
pub struct MemoryManager {
    low_mb: f64,
    high_mb: f64,
    min_concurrency: usize,
    max_concurrency: usize,
    probe: Box<dyn MemoryProbe>,
}

impl MemoryManager {
    pub fn new(low_mb: u64, high_mb: u64, min_concurrency: usize, max_concurrency: usize) -> Self {
        Self::with_probe(
            low_mb,
            high_mb,
            min_concurrency,
            max_concurrency,
            Box::new(SystemMemory::new()),
        )
    }

    pub fn with_probe(
        low_mb: u64,
        high_mb: u64,
        min_concurrency: usize,
        max_concurrency: usize,
        probe: Box<dyn MemoryProbe>,
    ) -> Self {
        let min_concurrency = min_concurrency.max(1);
        Self {
            low_mb: low_mb as f64,
            high_mb: high_mb as f64,
            min_concurrency,
            max_concurrency: max_concurrency.max(min_concurrency),
            probe,
        }
    }

    pub fn available_memory(&self) -> f64 {
        self.probe.available_mb()
    }

    pub fn min_concurrency(&self) -> usize {
        self.min_concurrency
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Concurrency for the next batch, always within `[min, max]`.
    pub fn calculate_concurrency(&self) -> usize {
        self.concurrency_for(self.available_memory())
    }

    fn concurrency_for(&self, available: f64) -> usize {
        if !available.is_finite() || available < self.low_mb {
            return self.min_concurrency;
        }
        if available >= self.high_mb || self.high_mb <= self.low_mb {
            return self.max_concurrency;
        }
        let ratio = (available - self.low_mb) / (self.high_mb - self.low_mb);
        let span = (self.max_concurrency - self.min_concurrency) as f64;
        let level = (self.min_concurrency as f64 + ratio * span).floor() as usize;
        level.clamp(self.min_concurrency, self.max_concurrency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(f64);

    impl MemoryProbe for Fixed {
        fn available_mb(&self) -> f64 {
            self.0
        }
    }

    fn manager(available: f64) -> MemoryManager {
        MemoryManager::with_probe(400, 1600, 1, 8, Box::new(Fixed(available)))
    }

    #[test]
    fn below_low_threshold_is_min() {
        assert_eq!(manager(100.0).calculate_concurrency(), 1);
        assert_eq!(manager(399.9).calculate_concurrency(), 1);
    }

    #[test]
    fn at_or_above_high_threshold_is_max() {
        assert_eq!(manager(1600.0).calculate_concurrency(), 8);
        assert_eq!(manager(64_000.0).calculate_concurrency(), 8);
    }

    #[test]
    fn interpolates_between_thresholds() {
        // ratio 0.5 -> 1 + 3.5 = 4.5 -> 4
        assert_eq!(manager(1000.0).calculate_concurrency(), 4);
        assert_eq!(manager(400.0).calculate_concurrency(), 1);
        // ratio 0.999 -> 7.99 -> 7
        assert_eq!(manager(1598.8).calculate_concurrency(), 7);
    }

    #[test]
    fn equal_thresholds_do_not_divide_by_zero() {
        let m = MemoryManager::with_probe(500, 500, 2, 6, Box::new(Fixed(500.0)));
        assert_eq!(m.calculate_concurrency(), 6);
        let m = MemoryManager::with_probe(500, 500, 2, 6, Box::new(Fixed(499.0)));
        assert_eq!(m.calculate_concurrency(), 2);
    }

    #[test]
    fn inverted_thresholds_stay_in_range() {
        let m = MemoryManager::with_probe(1600, 400, 1, 8, Box::new(Fixed(1000.0)));
        let c = m.calculate_concurrency();
        assert!((1..=8).contains(&c));
    }

    #[test]
    fn bounds_are_sanitized() {
        let m = MemoryManager::with_probe(400, 1600, 0, 0, Box::new(Fixed(10.0)));
        assert_eq!(m.min_concurrency(), 1);
        assert_eq!(m.max_concurrency(), 1);
        assert_eq!(m.calculate_concurrency(), 1);
    }

    #[test]
    fn system_probe_reports_something() {
        assert!(SystemMemory::new().available_mb() >= 0.0);
    }
}
