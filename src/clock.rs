use chrono::{DateTime, Utc};

/// Source of wall-clock time. Elapsed time is always derived by subtracting
/// instants read from here, never by counting ticks.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
