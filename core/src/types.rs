//! Shared primitive types used across the ledger.

/// Surrogate primary key of any ledger table row.
pub type RowId = i64;

/// A signed credit quantity. Balances may go negative under an
/// over-sell, so this is never an unsigned type.
pub type Credits = i64;

/// Caller-supplied (or generated) key grouping the rows of one checkout.
pub type BundleId = String;
