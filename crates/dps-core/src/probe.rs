//! Resource signals for adaptive worker sizing.
//!
//! The allocator and progress aggregator read CPU, memory, and core-count
//! signals through the `ResourceProbe` trait so tests can pin them.

use std::sync::Mutex;
use sysinfo::System;

/// Supplies CPU utilization, memory usage, and core-count signals.
pub trait ResourceProbe: Send + Sync {
    /// Current system-wide CPU utilization, 0.0–100.0.
    fn cpu_usage_percent(&self) -> f64;
    /// Bytes of memory currently in use.
    fn memory_used_bytes(&self) -> u64;
    /// Total physical memory in bytes.
    fn memory_total_bytes(&self) -> u64;
    /// Logical CPU count available to the process.
    fn available_cpus(&self) -> usize;
}

/// Live probe backed by sysinfo. Refreshes on every read; reads are
/// infrequent (allocator at session creation, monitor ticks) so the
/// refresh cost is off the hot path.
pub struct SystemProbe {
    system: Mutex<System>,
}

impl SystemProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceProbe for SystemProbe {
    fn cpu_usage_percent(&self) -> f64 {
        let mut sys = match self.system.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        sys.refresh_cpu_usage();
        f64::from(sys.global_cpu_usage())
    }

    fn memory_used_bytes(&self) -> u64 {
        let mut sys = match self.system.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        sys.refresh_memory();
        sys.used_memory()
    }

    fn memory_total_bytes(&self) -> u64 {
        let mut sys = match self.system.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        sys.refresh_memory();
        sys.total_memory()
    }

    fn available_cpus(&self) -> usize {
        num_cpus::get()
    }
}

/// Fixed-value probe for tests and benchmarks.
#[derive(Debug, Clone)]
pub struct StaticProbe {
    pub cpu_percent: f64,
    pub memory_used: u64,
    pub memory_total: u64,
    pub cpus: usize,
}

impl StaticProbe {
    /// A quiet machine: low CPU, low memory pressure, `cpus` cores.
    pub fn idle(cpus: usize) -> Self {
        Self {
            cpu_percent: 5.0,
            memory_used: 1 << 30,
            memory_total: 16 << 30,
            cpus,
        }
    }
}

impl ResourceProbe for StaticProbe {
    fn cpu_usage_percent(&self) -> f64 {
        self.cpu_percent
    }

    fn memory_used_bytes(&self) -> u64 {
        self.memory_used
    }

    fn memory_total_bytes(&self) -> u64 {
        self.memory_total
    }

    fn available_cpus(&self) -> usize {
        self.cpus
    }
}
