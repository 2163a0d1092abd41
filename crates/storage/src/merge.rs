//! Engine-level merge hook
//!
//! A `Merge` record in a batch carries an operand rather than a value. At
//! commit the engine folds the pending operands of a key into its existing
//! value through the configured `MergeOperator` and stores the result. Merge
//! resolution happens before anything is written, so a failing operator
//! rejects the whole batch.

use strata_core::Result;

/// Combines merge operands with an existing value
pub trait MergeOperator: Send + Sync {
    /// Operator name, for diagnostics
    fn name(&self) -> &str;

    /// Fold `operands` (oldest first) into `existing`
    ///
    /// `existing` is `None` when the key is absent or was deleted earlier in
    /// the same batch.
    fn full_merge(&self, key: &[u8], existing: Option<&[u8]>, operands: &[Vec<u8>])
        -> Result<Vec<u8>>;
}
