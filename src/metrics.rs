//! # Metrics — Host and Process Telemetry
//!
//! Resource sampling for the health monitor and the start-of-run banner, using
//! the [`sysinfo`] crate. Every reading degrades to zero on hosts sysinfo does
//! not support; nothing here is allowed to fail a search.
//!
//! ## Collected Metrics
//!
//! | Metric | Source | Unit |
//! |--------|--------|------|
//! | Process RSS | `Process::memory()` | bytes |
//! | Process CPU | `Process::cpu_usage()` | percent (per core, summed) |
//! | Host CPU usage | `System::global_cpu_usage()` | percent (0–100) |
//! | Memory used/total | `System::used_memory()` / `total_memory()` | GiB |
//! | Disk free/total | `Disks::new_with_refreshed_list()` | GiB |
//!
//! ## Heap Compaction
//!
//! [`compact_heap`] is the health monitor's corrective action: it asks the
//! mimalloc global allocator to purge freed pages back to the OS.

use serde::{Deserialize, Serialize};
use sysinfo::{Disks, Pid, ProcessRefreshKind, ProcessesToUpdate, System};

const GIB: f64 = 1_073_741_824.0;

/// Start-of-run host snapshot.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SystemStatus {
    pub cpu_usage_percent: f32,
    pub logical_cores: usize,
    pub memory_used_gb: f64,
    pub memory_total_gb: f64,
    pub memory_usage_percent: f32,
    pub disk_free_gb: f64,
    pub disk_total_gb: f64,
    pub disk_usage_percent: f32,
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

fn percent(used: f64, total: f64) -> f32 {
    if total > 0.0 {
        ((used / total * 1000.0).round() / 10.0) as f32
    } else {
        0.0
    }
}

impl SystemStatus {
    /// Refreshes CPU twice across sysinfo's minimum interval so usage is meaningful.
    pub fn collect() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_usage();
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        sys.refresh_cpu_usage();
        sys.refresh_memory();
        Self::from_system(&sys)
    }

    pub fn from_system(sys: &System) -> Self {
        let mem_total = sys.total_memory() as f64;
        let mem_used = sys.used_memory() as f64;

        let mut disk_total: u64 = 0;
        let mut disk_free: u64 = 0;
        for disk in Disks::new_with_refreshed_list().iter() {
            disk_total += disk.total_space();
            disk_free += disk.available_space();
        }
        let disk_total_f = disk_total as f64;
        let disk_free_f = disk_free as f64;

        SystemStatus {
            cpu_usage_percent: (sys.global_cpu_usage() * 10.0).round() / 10.0,
            logical_cores: sys.cpus().len(),
            memory_used_gb: round1(mem_used / GIB),
            memory_total_gb: round1(mem_total / GIB),
            memory_usage_percent: percent(mem_used, mem_total),
            disk_free_gb: round1(disk_free_f / GIB),
            disk_total_gb: round1(disk_total_f / GIB),
            disk_usage_percent: percent(disk_total_f - disk_free_f, disk_total_f),
        }
    }
}

/// Samples resident memory and CPU of the current process.
///
/// Owns its `System` so repeated CPU readings have a previous refresh to
/// diff against.
pub struct ProcessSampler {
    sys: System,
    pid: Option<Pid>,
}

impl ProcessSampler {
    pub fn new() -> Self {
        let pid = if sysinfo::IS_SUPPORTED_SYSTEM {
            sysinfo::get_current_pid().ok()
        } else {
            None
        };
        let mut sampler = ProcessSampler {
            sys: System::new(),
            pid,
        };
        sampler.refresh();
        sampler
    }

    fn refresh(&mut self) -> bool {
        let Some(pid) = self.pid else {
            return false;
        };
        self.sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory().with_cpu(),
        );
        true
    }

    /// `(rss_bytes, cpu_percent)`, zeros when unavailable.
    pub fn sample(&mut self) -> (u64, f32) {
        if !self.refresh() {
            return (0, 0.0);
        }
        match self.pid.and_then(|pid| self.sys.process(pid)) {
            Some(p) => (p.memory(), p.cpu_usage()),
            None => (0, 0.0),
        }
    }

    pub fn memory_bytes(&mut self) -> u64 {
        self.sample().0
    }
}

impl Default for ProcessSampler {
    fn default() -> Self {
        Self::new()
    }
}

/// Worker count when none is configured.
///
/// Uses every logical core, except on Windows where a full-width run starves
/// the desktop: `max(2, cores / 2 - 2)`.
pub fn default_worker_count() -> usize {
    let cores = rayon::current_num_threads().max(1);
    if cfg!(windows) {
        (cores / 2).saturating_sub(2).max(2)
    } else {
        cores
    }
}

/// Returns freed allocator pages to the OS.
pub fn compact_heap() {
    // SAFETY: mi_collect only walks mimalloc's own heap metadata and takes no pointers.
    unsafe { libmimalloc_sys::mi_collect(true) };
}

#[cfg(test)]
mod tests {
    //! Tests for host and process telemetry.
    //!
    //! Readings come from the real host, so assertions are range checks rather
    //! than exact values.

    use super::*;

    // ── Process Sampling ─────────────────────────────────────────

    /// On supported hosts a running test process has non-zero RSS.
    #[test]
    fn process_sampler_reports_memory() {
        let mut sampler = ProcessSampler::new();
        let (rss, cpu) = sampler.sample();
        if sysinfo::IS_SUPPORTED_SYSTEM {
            assert!(rss > 0, "RSS should be positive on a supported host");
        }
        assert!(cpu >= 0.0);
    }

    /// A sampler with no pid degrades to zeros instead of failing.
    #[test]
    fn sampler_without_pid_returns_zero() {
        let mut sampler = ProcessSampler {
            sys: System::new(),
            pid: None,
        };
        assert_eq!(sampler.sample(), (0, 0.0));
        assert_eq!(sampler.memory_bytes(), 0);
    }

    // ── Host Snapshot ────────────────────────────────────────────

    /// Percentages stay in range and used never exceeds total.
    #[test]
    fn system_status_ranges() {
        let s = SystemStatus::collect();
        assert!(s.memory_usage_percent >= 0.0 && s.memory_usage_percent <= 100.0);
        assert!(s.disk_usage_percent >= 0.0 && s.disk_usage_percent <= 100.0);
        assert!(s.memory_used_gb <= s.memory_total_gb);
        assert!(s.disk_free_gb <= s.disk_total_gb);
    }

    /// The banner is also emitted as JSON with `--json`.
    #[test]
    fn system_status_serde_roundtrip() {
        let s = SystemStatus {
            cpu_usage_percent: 12.5,
            logical_cores: 8,
            memory_used_gb: 3.2,
            memory_total_gb: 16.0,
            memory_usage_percent: 20.0,
            disk_free_gb: 100.0,
            disk_total_gb: 500.0,
            disk_usage_percent: 80.0,
        };
        let json = serde_json::to_string(&s).unwrap();
        let parsed: SystemStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.logical_cores, 8);
        assert_eq!(parsed.disk_total_gb, 500.0);
    }

    #[test]
    fn percent_handles_zero_total() {
        assert_eq!(percent(5.0, 0.0), 0.0);
        assert_eq!(percent(1.0, 3.0), 33.3);
    }

    // ── Workers and Heap ─────────────────────────────────────────

    #[test]
    fn default_worker_count_is_positive() {
        assert!(default_worker_count() >= 1);
    }

    /// Compaction must be callable at any time, from any thread.
    #[test]
    fn compact_heap_is_safe_to_call() {
        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(compact_heap))
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }
}
