//! Query debouncing.
//!
//! Every submission bumps a generation counter and waits out the window;
//! only the submission that is still the latest when its window ends is
//! released. Earlier ones resolve to `None`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Default search debounce window.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    generation: AtomicU64,
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            generation: AtomicU64::new(0),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Wait out the window. Returns `Some(value)` if no newer submission
    /// arrived meanwhile.
    pub async fn submit<T>(&self, value: T) -> Option<T> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.window).await;
        (self.generation.load(Ordering::SeqCst) == generation).then_some(value)
    }
}
