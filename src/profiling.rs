//! Timing of remote calls.
//!
//! Every round trip to the remote system is a blocking call that dominates
//! the run time, so each one is timed and logged at DEBUG together with the
//! time elapsed since program start.

use std::sync::OnceLock;
use std::time::Instant;

use tracing::debug;

/// Global start time, initialized when the program starts.
static START_TIME: OnceLock<Instant> = OnceLock::new();

/// Initialize the global start time. Call this at the very beginning of main().
pub fn init() {
    START_TIME.get_or_init(Instant::now);
}

/// Get elapsed time since program start in seconds.
pub fn elapsed_secs() -> f64 {
    START_TIME
        .get()
        .map(|start| start.elapsed().as_secs_f64())
        .unwrap_or(0.0)
}

/// Log a profiling event with elapsed time at DEBUG.
#[macro_export]
macro_rules! profile_log {
    ($($arg:tt)*) => {{
        tracing::debug!("[{:>8.3}s] {}", $crate::profiling::elapsed_secs(), format!($($arg)*));
    }};
}

/// Logs how long a labelled operation took when dropped.
#[derive(Debug)]
pub struct Timer {
    label: String,
    started: Instant,
}

impl Timer {
    pub fn start(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            started: Instant::now(),
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        debug!(
            "[{:>8.3}s] {} took {:.3}s",
            elapsed_secs(),
            self.label,
            self.elapsed_secs()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_is_monotonic() {
        init();
        let first = elapsed_secs();
        let timer = Timer::start("noop");
        assert!(elapsed_secs() >= first);
        assert!(timer.elapsed_secs() >= 0.0);
    }
}
