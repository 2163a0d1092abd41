//! Hybrid-logical timestamp type
//!
//! Every version in the store is identified by a `Timestamp`. Timestamps are
//! totally ordered by wall time first and the logical counter second, which
//! gives the "wall + logical" shape of a hybrid logical clock.
//!
//! ## Encoding
//!
//! - `wall` is nanoseconds since Unix epoch
//! - `logical` breaks ties between events with the same wall time
//! - The zero timestamp is reserved: it denotes the bare (meta) slot of a key
//!   and is never a valid version timestamp
//!
//! ## Usage
//!
//! ```
//! use strata_core::Timestamp;
//!
//! let ts = Timestamp::new(10, 0);
//! assert!(ts < ts.next());
//! assert!(ts.prev() < ts);
//! assert!(Timestamp::ZERO.is_empty());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Hybrid-logical timestamp
///
/// ## Invariants
///
/// - Ordering is lexicographic on `(wall, logical)`
/// - `Timestamp::ZERO` sorts before every other timestamp
/// - `Timestamp::MAX` sorts after every other timestamp
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Timestamp {
    /// Wall time in nanoseconds since Unix epoch
    pub wall: u64,
    /// Logical counter for events sharing a wall time
    pub logical: u32,
}

impl Timestamp {
    /// The empty timestamp
    pub const ZERO: Timestamp = Timestamp {
        wall: 0,
        logical: 0,
    };

    /// Maximum representable timestamp
    pub const MAX: Timestamp = Timestamp {
        wall: u64::MAX,
        logical: u32::MAX,
    };

    // =========================================================================
    // Constructors
    // =========================================================================

    /// Create a timestamp from its components
    #[inline]
    pub const fn new(wall: u64, logical: u32) -> Self {
        Timestamp { wall, logical }
    }

    /// Create a timestamp with a zero logical component
    #[inline]
    pub const fn from_wall(wall: u64) -> Self {
        Timestamp { wall, logical: 0 }
    }

    /// Create a timestamp for the current moment
    ///
    /// Returns the zero timestamp if the system clock is before Unix epoch.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp::from_wall(duration.as_nanos() as u64)
    }

    // =========================================================================
    // Ordering helpers
    // =========================================================================

    /// True for the reserved zero timestamp
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.wall == 0 && self.logical == 0
    }

    /// The smallest timestamp strictly greater than `self`
    ///
    /// Saturates at `Timestamp::MAX`.
    pub fn next(&self) -> Timestamp {
        if self.logical == u32::MAX {
            if self.wall == u64::MAX {
                return Timestamp::MAX;
            }
            Timestamp::new(self.wall + 1, 0)
        } else {
            Timestamp::new(self.wall, self.logical + 1)
        }
    }

    /// The largest timestamp strictly smaller than `self`
    ///
    /// Saturates at `Timestamp::ZERO`.
    pub fn prev(&self) -> Timestamp {
        if self.logical > 0 {
            Timestamp::new(self.wall, self.logical - 1)
        } else if self.wall > 0 {
            Timestamp::new(self.wall - 1, u32::MAX)
        } else {
            Timestamp::ZERO
        }
    }

    /// Larger of the two timestamps
    #[inline]
    pub fn forward(self, other: Timestamp) -> Timestamp {
        self.max(other)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09},{}", self.wall / 1_000_000_000, self.wall % 1_000_000_000, self.logical)
    }
}

impl From<u64> for Timestamp {
    fn from(wall: u64) -> Self {
        Timestamp::from_wall(wall)
    }
}
