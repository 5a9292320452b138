use crate::core::DemonPriority;
use std::time::Instant;

/// Counters accumulated over the lifetime of one solver.
#[derive(Clone, Debug, Default)]
pub struct Stats {
    /// Branches explored: one per applied and one per refuted decision.
    pub branches: u64,
    pub failures: u64,
    pub solutions: u64,
    pub restarts: u64,
    /// Demons executed, per priority bucket.
    pub demon_runs: [u64; DemonPriority::COUNT],
    start: Option<Instant>,
}

impl Stats {
    /// Starts the wall clock on the first search.
    pub(crate) fn start_clock(&mut self) {
        if self.start.is_none() {
            self.start = Some(Instant::now());
        }
    }

    /// Milliseconds elapsed since the first search started.
    pub fn wall_time_ms(&self) -> u64 {
        self.start.map(|s| s.elapsed().as_millis() as u64).unwrap_or(0)
    }

    pub fn demon_runs_total(&self) -> u64 {
        self.demon_runs.iter().sum()
    }
}

impl std::fmt::Display for Stats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "branches: {}, failures: {}, solutions: {}, restarts: {}, demons: {} (var: {}, normal: {}, delayed: {}), time: {}ms",
            self.branches,
            self.failures,
            self.solutions,
            self.restarts,
            self.demon_runs_total(),
            self.demon_runs[DemonPriority::Var.index()],
            self.demon_runs[DemonPriority::Normal.index()],
            self.demon_runs[DemonPriority::Delayed.index()],
            self.wall_time_ms(),
        )
    }
}
