//! The ledger event log.
//!
//! RULE: Every ledger operation appends its events inside the same
//! transaction as the table changes they describe.
//! A rolled-back operation therefore leaves no event behind.

use crate::types::{BundleId, Credits, RowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Every event a ledger operation can record.
/// Variants are only ever appended; stored payloads must stay readable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    // ── Purchases ──────────────────────────────────
    PurchaseRecorded {
        transaction_id: RowId,
        vendor_id: RowId,
        service_name: String,
        credits: Credits,
    },
    PurchaseDeleted {
        transaction_id: RowId,
        vendor_id: RowId,
        service_name: String,
        credits: Credits,
    },

    // ── Sales ──────────────────────────────────────
    SaleCreated {
        subscription_id: RowId,
        customer_id: RowId,
        vendor_id: Option<RowId>,
        service_name: Option<String>,
        credits_used: Credits,
        bundle_id: Option<BundleId>,
    },
    SaleUpdated {
        subscription_id: RowId,
        old_credits: Credits,
        new_credits: Credits,
    },
    SaleDeleted {
        subscription_id: RowId,
        credits_used: Credits,
        bundle_id: Option<BundleId>,
    },

    // ── Bundles ────────────────────────────────────
    BundleDeleted {
        bundle_id: BundleId,
        line_items: usize,
    },
    BundleEdited {
        bundle_id: BundleId,
        added: usize,
        updated: usize,
        removed: usize,
    },

    // ── Balance anomalies ──────────────────────────
    BalanceMissing {
        vendor_id: RowId,
        service_name: String,
        remaining_delta: Credits,
    },
}

impl LedgerEvent {
    /// Stable string name, stored in the event_type column.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::PurchaseRecorded { .. } => "purchase_recorded",
            Self::PurchaseDeleted { .. } => "purchase_deleted",
            Self::SaleCreated { .. } => "sale_created",
            Self::SaleUpdated { .. } => "sale_updated",
            Self::SaleDeleted { .. } => "sale_deleted",
            Self::BundleDeleted { .. } => "bundle_deleted",
            Self::BundleEdited { .. } => "bundle_edited",
            Self::BalanceMissing { .. } => "balance_missing",
        }
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<RowId>,
    pub event_type: String,
    pub payload: String, // JSON-serialized LedgerEvent
    pub created_at: DateTime<Utc>,
}

impl EventLogEntry {
    pub fn decode(&self) -> serde_json::Result<LedgerEvent> {
        serde_json::from_str(&self.payload)
    }
}
