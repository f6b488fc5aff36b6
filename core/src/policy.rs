//! Named policy choices for the two permissive behaviours of the ledger.

use serde::{Deserialize, Serialize};

/// What happens when a sale drives `remaining_credits` below zero.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OversellPolicy {
    /// The sale goes through and an `Oversold` warning is reported.
    #[default]
    Allow,
    /// The sale fails with `InsufficientCredits` and the transaction rolls back.
    Reject,
}

/// What happens when an adjustment targets a `(vendor, service)` pair
/// that has no credit balance row.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MissingBalancePolicy {
    /// Zero-row update; reported as a `MissingBalance` warning.
    #[default]
    Ignore,
    /// Raise `Consistency` and roll back.
    Fail,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerPolicy {
    #[serde(default)]
    pub oversell: OversellPolicy,
    #[serde(default)]
    pub missing_balance: MissingBalancePolicy,
}

impl LedgerPolicy {
    pub fn strict() -> Self {
        Self {
            oversell: OversellPolicy::Reject,
            missing_balance: MissingBalancePolicy::Fail,
        }
    }
}
