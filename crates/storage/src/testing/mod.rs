//! Testing utilities for storage durability and crash recovery
//!
//! This module provides tools for testing the storage layer's resilience:
//!
//! - **Crash Points**: one-shot fault injection in the commit path
//! - **Corruption**: batch log damage simulation for recovery testing
//!
//! # Example
//!
//! ```ignore
//! use strata_storage::testing::{CrashPoint, LogCorruptionTester};
//!
//! engine.arm_crash_point(CrashPoint::AfterLogAppend);
//!
//! let tester = LogCorruptionTester::new("path/to/db");
//! tester.truncate_tail(5)?;
//! assert!(tester.verify_recovery()?.recovered);
//! ```

mod corruption;
mod crash_harness;

pub use corruption::{LogCorruptionTester, RecoveryVerification, TruncationResult};
pub use crash_harness::CrashPoint;
