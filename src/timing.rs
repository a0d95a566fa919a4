//! Per-phase build timing.

use std::time::{Duration, Instant};

/// Prints how long a build phase took when finished.
pub struct Timer {
    phase: String,
    start: Instant,
}

impl Timer {
    pub fn start(phase: &str) -> Self {
        tracing::debug!("phase started: {}", phase);
        Self {
            phase: phase.to_string(),
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn finish(self) {
        println!("  [{}] {}", format_duration(self.elapsed()), self.phase);
    }
}

/// `42.0s` below a minute, `2.5m` above.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs >= 60.0 {
        format!("{:.1}m", secs / 60.0)
    } else {
        format!("{:.1}s", secs)
    }
}
