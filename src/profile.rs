use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Per-section call counts and wall time.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct SectionStats {
    pub calls: u64,
    pub total: Duration,
}

/// Accumulates timings by section name. A disabled profiler runs closures
/// without measuring them.
#[derive(Debug, Default)]
pub struct Profiler {
    enabled: bool,
    sections: HashMap<&'static str, SectionStats>,
}

impl Profiler {
    pub fn new(enabled: bool) -> Self {
        Profiler {
            enabled,
            sections: HashMap::new(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn time<T>(&mut self, section: &'static str, f: impl FnOnce() -> T) -> T {
        if !self.enabled {
            return f();
        }
        let start = Instant::now();
        let result = f();
        let stats = self.sections.entry(section).or_default();
        stats.calls += 1;
        stats.total += start.elapsed();
        result
    }

    pub fn get(&self, section: &str) -> Option<SectionStats> {
        self.sections.get(section).copied()
    }

    /// Sections ordered by total time, slowest first.
    pub fn sorted(&self) -> Vec<(&'static str, SectionStats)> {
        let mut rows: Vec<_> = self.sections.iter().map(|(&name, &stats)| (name, stats)).collect();
        rows.sort_by(|a, b| b.1.total.cmp(&a.1.total).then(a.0.cmp(b.0)));
        rows
    }

    pub fn report(&self) -> String {
        let mut out = format!("{:<18} {:>8} {:>12} {:>12}\n", "section", "calls", "total ms", "per call ms");
        for (name, stats) in self.sorted() {
            let total_ms = stats.total.as_secs_f64() * 1000.0;
            let per_call = total_ms / stats.calls.max(1) as f64;
            out.push_str(&format!("{:<18} {:>8} {:>12.3} {:>12.4}\n", name, stats.calls, total_ms, per_call));
        }
        out
    }
}
