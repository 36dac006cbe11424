//! Runtime-agnostic async utilities
//!
//! The orchestrator never names an executor directly. Timers used for
//! settle delays, retry pauses and deadlines come from here, backed by
//! whichever runtime feature is enabled (`smol` by default, `tokio` as an
//! alternative).
//!
//! # Examples
//!
//! ```no_run
//! use async_runtime_compat::prelude::*;
//! use std::time::Duration;
//!
//! # #[cfg(feature = "smol")]
//! smol::block_on(async {
//!     let result = timeout(Duration::from_secs(1), async { 42 }).await;
//!     assert_eq!(result.ok(), Some(42));
//! });
//! ```

#![warn(missing_docs)]

use std::time::Duration;

pub mod runtime_utils;

/// Error returned when a future did not complete before its deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elapsed {
    after: Duration,
}

impl Elapsed {
    pub(crate) fn new(after: Duration) -> Self {
        Self { after }
    }

    /// The budget that was exceeded
    pub fn after(&self) -> Duration {
        self.after
    }
}

impl std::fmt::Display for Elapsed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "deadline of {:?} elapsed", self.after)
    }
}

impl std::error::Error for Elapsed {}

/// Prelude for common imports
pub mod prelude {
    pub use crate::Elapsed;
    pub use crate::runtime_utils::{sleep, timeout};
}
