//! Crash injection points for commit durability tests
//!
//! A crash point is armed on an engine and fires once, on the next commit
//! that reaches it. The commit then fails with `Error::InjectedFault`.
//!
//! # Crash Points
//!
//! - `BeforeLogAppend`: the batch is resolved but nothing is written. The
//!   commit is abandoned and the engine stays usable.
//! - `AfterLogAppend`: the batch is durable in the log but not yet applied in
//!   memory. This simulates a process crash: the engine is closed, and the
//!   batch reappears when the data directory is reopened.
//!
//! # Example
//!
//! ```ignore
//! use strata_storage::testing::CrashPoint;
//!
//! engine.arm_crash_point(CrashPoint::BeforeLogAppend);
//! assert!(engine.commit(batch).is_err());
//! ```

/// Where in the commit path a crash is injected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrashPoint {
    /// After merge resolution, before the log append
    BeforeLogAppend,
    /// After the log append, before the in-memory apply
    AfterLogAppend,
}

impl CrashPoint {
    /// All crash points
    pub fn all() -> Vec<CrashPoint> {
        vec![CrashPoint::BeforeLogAppend, CrashPoint::AfterLogAppend]
    }

    /// Get description of crash point
    pub fn description(&self) -> &'static str {
        match self {
            CrashPoint::BeforeLogAppend => "Crash before the batch reaches the log",
            CrashPoint::AfterLogAppend => "Crash after the log append, before apply",
        }
    }

    /// Whether the batch survives a reopen of a persistent engine
    pub fn batch_durable(&self) -> bool {
        matches!(self, CrashPoint::AfterLogAppend)
    }

    /// Whether the engine is unusable after the crash fires
    pub fn closes_engine(&self) -> bool {
        matches!(self, CrashPoint::AfterLogAppend)
    }
}
