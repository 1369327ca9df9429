use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// A single-flight guard: at most one holder at a time, later requests are refused.
///
/// Clones share the same flag, so a clone handed to another thread observes and blocks the same
/// operation.
#[derive(Clone, Debug, Default)]
pub struct SingleFlight {
    busy: Arc<AtomicBool>,
}

impl SingleFlight {
    /// Create a new idle guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to start an operation.
    ///
    /// # Returns
    ///
    /// A [`FlightGuard`] releasing the flag when dropped, or `None` if an operation is already
    /// in flight.
    pub fn try_acquire(&self) -> Option<FlightGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard {
                busy: self.busy.clone(),
            })
    }

    /// Whether an operation is currently in flight.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Releases its [`SingleFlight`] on drop.
#[derive(Debug)]
pub struct FlightGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
