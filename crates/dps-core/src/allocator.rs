//! Effective worker-count selection (adaptive and config caps).

use crate::config::SchedulerConfig;
use crate::probe::ResourceProbe;

/// Memory-pressure cutoff: above this used/total fraction the CPU allowance
/// is halved so the scheduler does not pile work onto a loaded machine.
const MEMORY_PRESSURE_FRACTION: f64 = 0.80;

/// Chooses the effective worker count for a batch of `total_units` units.
///
/// With adaptive sizing disabled this is simply the configured max. Enabled,
/// it is min(task count, cpu bound, memory bound, configured max), where the
/// cpu bound reserves one core for the host process and the memory bound
/// halves the core allowance under memory pressure. Always at least 1 and
/// never above `cfg.max_workers`.
pub fn effective_workers(
    total_units: u64,
    cfg: &SchedulerConfig,
    probe: &dyn ResourceProbe,
) -> usize {
    let configured_max = cfg.max_workers.max(1);
    if !cfg.adaptive_workers {
        return configured_max;
    }

    let units_per_task = cfg.units_per_task.max(1);
    let task_count = total_units.div_ceil(units_per_task).max(1) as usize;

    let cpus = probe.available_cpus().max(1);
    let cpu_bound = cpus.saturating_sub(1).max(1);

    let total_mem = probe.memory_total_bytes();
    let used_fraction = if total_mem == 0 {
        0.0
    } else {
        probe.memory_used_bytes() as f64 / total_mem as f64
    };
    let memory_bound = if used_fraction < MEMORY_PRESSURE_FRACTION {
        cpus
    } else {
        (cpus / 2).max(1)
    };

    task_count
        .min(cpu_bound)
        .min(memory_bound)
        .min(configured_max)
        .max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::StaticProbe;

    fn cfg(max_workers: usize, units_per_task: u64, adaptive: bool) -> SchedulerConfig {
        SchedulerConfig {
            max_workers,
            units_per_task,
            adaptive_workers: adaptive,
            ..SchedulerConfig::default()
        }
    }

    #[test]
    fn disabled_adaptive_returns_configured_max() {
        let probe = StaticProbe::idle(2);
        assert_eq!(effective_workers(1000, &cfg(8, 5, false), &probe), 8);
    }

    #[test]
    fn capped_by_task_count() {
        // 8 units at 3 per task -> 3 tasks; 4 cpus, low memory -> 3 workers
        let probe = StaticProbe::idle(4);
        assert_eq!(effective_workers(8, &cfg(4, 3, true), &probe), 3);
    }

    #[test]
    fn reserves_one_core() {
        let probe = StaticProbe::idle(4);
        // plenty of tasks: cpu bound (4-1=3) wins over max_workers=8
        assert_eq!(effective_workers(1000, &cfg(8, 5, true), &probe), 3);
    }

    #[test]
    fn memory_pressure_halves_core_allowance() {
        let probe = StaticProbe {
            cpu_percent: 10.0,
            memory_used: 15 << 30,
            memory_total: 16 << 30,
            cpus: 8,
        };
        // memory bound = 8/2 = 4, below cpu bound 7 and max 8
        assert_eq!(effective_workers(1000, &cfg(8, 5, true), &probe), 4);
    }

    #[test]
    fn memory_pressure_on_single_core_still_one() {
        let probe = StaticProbe {
            cpu_percent: 10.0,
            memory_used: 9 << 30,
            memory_total: 10 << 30,
            cpus: 1,
        };
        assert_eq!(effective_workers(1000, &cfg(4, 5, true), &probe), 1);
    }

    #[test]
    fn always_within_configured_bounds() {
        let probe = StaticProbe::idle(64);
        for total in [1u64, 5, 50, 5000] {
            for max in [1usize, 2, 7, 32] {
                let n = effective_workers(total, &cfg(max, 5, true), &probe);
                assert!(n >= 1 && n <= max, "total={total} max={max} got {n}");
            }
        }
    }

    #[test]
    fn single_task_gets_single_worker() {
        let probe = StaticProbe::idle(8);
        assert_eq!(effective_workers(3, &cfg(8, 10, true), &probe), 1);
    }
}
