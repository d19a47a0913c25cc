// src/stats/reporter.rs
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use sysinfo::{Components, System};

/// Snapshot of mining performance
#[derive(Debug, Clone, Default)]
pub struct MiningStats {
    /// Hashes computed since the reporter was created
    pub hashes_total: u64,
    /// Shares found since the reporter was created
    pub shares_found: u64,
    /// Sum of the difficulties of all found shares
    pub total_share_difficulty: u64,
    /// Hashes computed in the current window
    pub recent_hashes: u64,
    /// Hashrate of the current window (hashes per second)
    pub hashrate: f64,
    /// Hashrate since start (hashes per second)
    pub avg_hashrate: f64,
}

/// Statistics related to hardware performance
#[derive(Debug, Clone)]
pub struct HardwareStats {
    /// Current CPU usage percentage (0-100)
    pub cpu_usage: f32,
    /// Memory currently used by the system (in bytes)
    pub memory_used: u64,
    /// Current CPU temperature in Celsius
    pub temperature: f32,
}

/// Collects and reports mining and hardware statistics
///
/// Clones share the same counters, so workers can each hold one.
pub struct StatsReporter {
    stats: Arc<MiningStatsAtomic>,
    report_interval: Duration,
}

struct MiningStatsAtomic {
    hashes: AtomicU64,
    shares: AtomicU64,
    share_difficulty: AtomicU64,
    recent_hashes: AtomicU64,
    recent_start: Mutex<Instant>,
    start_time: Instant,
}

impl Clone for StatsReporter {
    fn clone(&self) -> Self {
        StatsReporter {
            stats: self.stats.clone(),
            report_interval: self.report_interval,
        }
    }
}

impl StatsReporter {
    /// Creates a new StatsReporter with the specified reporting interval
    ///
    /// # Arguments
    /// * `report_interval` - How often [`start_reporting`](Self::start_reporting) logs
    pub fn new(report_interval: Duration) -> Self {
        let now = Instant::now();
        StatsReporter {
            stats: Arc::new(MiningStatsAtomic {
                hashes: AtomicU64::new(0),
                shares: AtomicU64::new(0),
                share_difficulty: AtomicU64::new(0),
                recent_hashes: AtomicU64::new(0),
                recent_start: Mutex::new(now),
                start_time: now,
            }),
            report_interval,
        }
    }

    /// Adds completed hashes to both the total and the current window
    pub fn tally_hashes(&self, count: u64) {
        self.stats.hashes.fetch_add(count, Ordering::Relaxed);
        self.stats.recent_hashes.fetch_add(count, Ordering::Relaxed);
    }

    /// Records a found share of the given difficulty
    pub fn record_share(&self, difficulty: u64) {
        self.stats.shares.fetch_add(1, Ordering::Relaxed);
        self.stats
            .share_difficulty
            .fetch_add(difficulty, Ordering::Relaxed);
    }

    /// Starts a new hashrate window
    ///
    /// Called after reseeds and pool resizes, whose pauses would otherwise
    /// drag the reported hashrate down.
    pub fn reset_recent(&self) {
        let mut start = self
            .stats
            .recent_start
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.stats.recent_hashes.store(0, Ordering::Relaxed);
        *start = Instant::now();
    }

    /// Hashrate of the current window in hashes per second
    pub fn hashrate(&self) -> f64 {
        let start = *self
            .stats
            .recent_start
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let secs = start.elapsed().as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.stats.recent_hashes.load(Ordering::Relaxed) as f64 / secs
    }

    /// Gets the current mining statistics
    ///
    /// # Returns
    /// A snapshot of the current mining statistics
    pub fn get_stats(&self) -> MiningStats {
        let total_seconds = self.stats.start_time.elapsed().as_secs_f64();
        let hashes = self.stats.hashes.load(Ordering::Relaxed);

        MiningStats {
            hashes_total: hashes,
            shares_found: self.stats.shares.load(Ordering::Relaxed),
            total_share_difficulty: self.stats.share_difficulty.load(Ordering::Relaxed),
            recent_hashes: self.stats.recent_hashes.load(Ordering::Relaxed),
            hashrate: self.hashrate(),
            avg_hashrate: if total_seconds > 0.0 {
                hashes as f64 / total_seconds
            } else {
                0.0
            },
        }
    }

    /// Starts the periodic reporting of statistics
    ///
    /// This spawns a background thread that logs stats at the configured
    /// interval for the rest of the process lifetime.
    pub fn start_reporting(&self) -> JoinHandle<()> {
        let reporter = self.clone();

        std::thread::spawn(move || {
            let mut hardware = HardwareMonitor::new();
            loop {
                std::thread::sleep(reporter.report_interval);
                let mining_stats = reporter.get_stats();
                let hw_stats = hardware.sample();

                log::info!(
                    "Hashrate: {} | Shares: {} (difficulty {}) | CPU: {:.1}% | Temp: {:.1}°C",
                    fmt_hashrate(mining_stats.hashrate),
                    mining_stats.shares_found,
                    mining_stats.total_share_difficulty,
                    hw_stats.cpu_usage,
                    hw_stats.temperature
                );
            }
        })
    }
}

/// Samples CPU, memory and temperature through `sysinfo`
pub struct HardwareMonitor {
    system: System,
    components: Components,
}

impl HardwareMonitor {
    /// Creates a monitor with freshly enumerated components
    pub fn new() -> Self {
        HardwareMonitor {
            system: System::new_all(),
            components: Components::new_with_refreshed_list(),
        }
    }

    /// Refreshes system information and returns a snapshot
    pub fn sample(&mut self) -> HardwareStats {
        self.system.refresh_cpu_all();
        self.system.refresh_memory();
        self.components.refresh(true);

        let cpus = self.system.cpus();
        let cpu_usage = if cpus.is_empty() {
            0.0
        } else {
            cpus.iter().map(|c| c.cpu_usage()).sum::<f32>() / cpus.len() as f32
        };

        let temperature = self
            .components
            .iter()
            .find(|c| c.label().contains("CPU"))
            .and_then(|c| c.temperature())
            .unwrap_or(0.0);

        HardwareStats {
            cpu_usage,
            memory_used: self.system.used_memory(),
            temperature,
        }
    }
}

impl Default for HardwareMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Formats a hashrate with an H/s, kH/s or MH/s unit
pub fn fmt_hashrate(rate: f64) -> String {
    if rate >= 1e6 {
        format!("{:.2} MH/s", rate / 1e6)
    } else if rate >= 1e3 {
        format!("{:.2} kH/s", rate / 1e3)
    } else {
        format!("{:.2} H/s", rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_hashrates() {
        assert_eq!(fmt_hashrate(12.5), "12.50 H/s");
        assert_eq!(fmt_hashrate(1_234.0), "1.23 kH/s");
        assert_eq!(fmt_hashrate(2_500_000.0), "2.50 MH/s");
    }

    #[test]
    fn clones_share_counters() {
        let reporter = StatsReporter::new(Duration::from_secs(60));
        let clone = reporter.clone();
        clone.tally_hashes(10);
        reporter.tally_hashes(5);
        clone.record_share(100);
        reporter.record_share(50);

        let stats = reporter.get_stats();
        assert_eq!(stats.hashes_total, 15);
        assert_eq!(stats.recent_hashes, 15);
        assert_eq!(stats.shares_found, 2);
        assert_eq!(stats.total_share_difficulty, 150);
    }

    #[test]
    fn reset_recent_keeps_totals() {
        let reporter = StatsReporter::new(Duration::from_secs(60));
        reporter.tally_hashes(40);
        reporter.reset_recent();
        reporter.tally_hashes(2);

        let stats = reporter.get_stats();
        assert_eq!(stats.hashes_total, 42);
        assert_eq!(stats.recent_hashes, 2);
    }
}
