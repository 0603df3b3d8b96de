//! Host port assignment
//!
//! Ports are handed out from a monotonically increasing counter and are
//! not reused within a run. Two concurrent claims never get the same port.
//! The pool knows nothing about live servers; the provisioner skips a
//! claimed port when the registry reports it taken.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::CoreError;

/// Monotonic pool of host ports
#[derive(Debug)]
pub struct PortPool {
    next: AtomicU32,
    end: u16,
}

impl PortPool {
    /// Pool covering `start..=end` (`end` defaults to the last valid port)
    #[must_use]
    pub fn new(start: u16, end: Option<u16>) -> Self {
        Self {
            next: AtomicU32::new(u32::from(start)),
            end: end.unwrap_or(u16::MAX),
        }
    }

    /// Pool that continues after every port in `in_use`
    #[must_use]
    pub fn resume_after(
        start: u16,
        end: Option<u16>,
        in_use: impl IntoIterator<Item = u16>,
    ) -> Self {
        let pool = Self::new(start, end);
        if let Some(highest) = in_use.into_iter().max() {
            pool.next
                .fetch_max(u32::from(highest) + 1, Ordering::SeqCst);
        }
        pool
    }

    /// Claim the next port
    ///
    /// # Errors
    ///
    /// Returns `CoreError::PortPoolExhausted` once the range is used up
    pub fn claim(&self) -> Result<u16, CoreError> {
        let port = self.next.fetch_add(1, Ordering::SeqCst);
        if port > u32::from(self.end) {
            return Err(CoreError::PortPoolExhausted);
        }
        u16::try_from(port).map_err(|_| CoreError::PortPoolExhausted)
    }
}
