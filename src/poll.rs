use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Virtual clock whose `sleep` advances time instantly. Clones share one timeline.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += duration;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    // Measured from the first fetch.
    pub timeout: Duration,
}

impl PollSettings {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(90))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Polled<T> {
    pub value: T,
    /// Whether the predicate held for `value`. `false` means the budget ran out.
    pub satisfied: bool,
    pub attempts: usize,
    pub elapsed: Duration,
}

/// Fetch until `predicate` holds or `settings.timeout` has elapsed, returning
/// the last value either way. The final fetch happens at the deadline, never
/// before it. A fetch error ends the poll.
pub fn poll_until<T, E, F, P>(
    clock: &dyn Clock,
    settings: PollSettings,
    mut fetch: F,
    predicate: P,
) -> Result<Polled<T>, E>
where
    F: FnMut() -> Result<T, E>,
    P: Fn(&T) -> bool,
{
    let start = clock.now();
    let mut attempts = 0;

    loop {
        let value = fetch()?;
        attempts += 1;
        let elapsed = clock.now().saturating_duration_since(start);

        if predicate(&value) {
            return Ok(Polled { value, satisfied: true, attempts, elapsed });
        }
        if elapsed >= settings.timeout {
            return Ok(Polled { value, satisfied: false, attempts, elapsed });
        }

        clock.sleep(settings.interval.min(settings.timeout - elapsed));
    }
}
