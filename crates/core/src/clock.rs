use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};

/// Time source injected into every cache so staleness logic is testable.
///
/// Production code uses `Clock::system()`; tests construct a manual clock
/// with `Clock::fixed(..)` and move it forward with `advance`/`set`.
/// Cloning a manual clock shares the underlying instant, so a test can keep
/// a handle while the cache under test holds its own copy.
#[derive(Clone)]
pub enum Clock {
    System,
    Manual(Arc<Mutex<DateTime<Utc>>>),
}

impl Clock {
    pub fn system() -> Self {
        Clock::System
    }

    /// A manually driven clock starting at `start`.
    pub fn fixed(start: DateTime<Utc>) -> Self {
        Clock::Manual(Arc::new(Mutex::new(start)))
    }

    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Manual(t) => *t.lock().unwrap_or_else(|e| e.into_inner()),
        }
    }

    /// Move a manual clock forward. No-op on the system clock.
    pub fn advance(&self, by: Duration) {
        if let Clock::Manual(t) = self {
            let mut guard = t.lock().unwrap_or_else(|e| e.into_inner());
            *guard += by;
        }
    }

    /// Set a manual clock to an absolute instant. No-op on the system clock.
    pub fn set(&self, to: DateTime<Utc>) {
        if let Clock::Manual(t) = self {
            let mut guard = t.lock().unwrap_or_else(|e| e.into_inner());
            *guard = to;
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Clock::system()
    }
}

impl std::fmt::Debug for Clock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Clock::System => write!(f, "Clock::System"),
            Clock::Manual(t) => write!(
                f,
                "Clock::Manual({})",
                t.lock().unwrap_or_else(|e| e.into_inner())
            ),
        }
    }
}
