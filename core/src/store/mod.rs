//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Ledger operations call store methods on a `LedgerTx` handed to them by
//! `LedgerStore::with_transaction` and never execute SQL directly.
//! Writes are only reachable through a `LedgerTx`; `LedgerStore` itself
//! exposes read-only queries.

use crate::{
    error::{LedgerError, LedgerResult},
    types::{BundleId, Credits, RowId},
};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::cell::Cell;

mod balance;
mod business;
mod event_log;
mod reference;
mod subscription;
mod vendor_txn;

pub struct LedgerStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
    in_transaction: Cell<bool>,
}

/// An open `BEGIN IMMEDIATE` transaction. Only `with_transaction` creates one.
pub struct LedgerTx<'s> {
    tx: Transaction<'s>,
}

impl LedgerTx<'_> {
    fn conn(&self) -> &Connection {
        &self.tx
    }
}

/// Clears the in-transaction flag however the unit of work exits.
struct TxFlag<'a>(&'a Cell<bool>);

impl Drop for TxFlag<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl LedgerStore {
    pub fn open(path: &str) -> LedgerResult<Self> {
        let conn = Connection::open(path)?;
        let mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        if !mode.eq_ignore_ascii_case("wal") {
            log::warn!("{path}: journal_mode is '{mode}', WAL unavailable");
        }
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
            in_transaction: Cell::new(false),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> LedgerResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn,
            path: None,
            in_transaction: Cell::new(false),
        })
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Apply all schema migrations in order. Safe to re-run on an existing file.
    pub fn migrate(&self) -> LedgerResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_credit_ledger.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_business_transactions.sql"))?;
        Ok(())
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction.get()
    }

    /// Run `work` inside one exclusive transaction.
    ///
    /// `Ok` commits, `Err` rolls back and hands back the unit of work's own
    /// error. A failed rollback is logged and never replaces that error.
    /// Calling this again from inside `work` fails with `NestedTransaction`.
    pub fn with_transaction<T, F>(&self, work: F) -> LedgerResult<T>
    where
        F: FnOnce(&LedgerTx<'_>) -> LedgerResult<T>,
    {
        if self.in_transaction.replace(true) {
            return Err(LedgerError::NestedTransaction);
        }
        let _flag = TxFlag(&self.in_transaction);

        let tx = LedgerTx {
            tx: Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?,
        };
        log::debug!("BEGIN IMMEDIATE");

        match work(&tx) {
            Ok(value) => {
                tx.tx.commit()?;
                log::debug!("COMMIT");
                self.persist();
                Ok(value)
            }
            Err(err) => {
                match tx.tx.rollback() {
                    Ok(()) => log::debug!("ROLLBACK after: {err}"),
                    Err(rollback_err) => {
                        log::error!("ROLLBACK failed ({rollback_err}) after: {err}")
                    }
                }
                Err(err)
            }
        }
    }

    /// Push committed pages from the WAL into the main database file.
    /// The commit already happened, so a failure here is only logged.
    fn persist(&self) {
        if self.path.is_none() {
            return;
        }
        let checkpoint = self
            .conn
            .query_row("PRAGMA wal_checkpoint(PASSIVE)", [], |row| row.get::<_, i64>(0));
        match checkpoint {
            Ok(0) => {}
            Ok(_) => log::warn!("WAL checkpoint was blocked; data remains in the WAL"),
            Err(e) => log::warn!("WAL checkpoint failed after commit: {e}"),
        }
    }
}

// ── Row types ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreditBalanceRow {
    pub id: RowId,
    pub vendor_id: RowId,
    pub service_name: String,
    pub remaining_credits: Credits,
    pub total_purchased: Credits,
    pub total_used: Credits,
    pub updated_at: DateTime<Utc>,
}

impl CreditBalanceRow {
    /// `remaining == purchased - used`.
    pub fn is_conserved(&self) -> bool {
        self.remaining_credits == self.total_purchased - self.total_used
    }

    /// The row's totals after `delta`, or `None` if any of them would
    /// leave the `i64` range.
    pub fn checked_apply(&self, delta: BalanceDelta) -> Option<BalanceDelta> {
        Some(BalanceDelta {
            remaining: self.remaining_credits.checked_add(delta.remaining)?,
            purchased: self.total_purchased.checked_add(delta.purchased)?,
            used: self.total_used.checked_add(delta.used)?,
        })
    }
}

/// A balance row joined with its vendor's display name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreditBalanceView {
    #[serde(flatten)]
    pub balance: CreditBalanceRow,
    pub vendor_name: Option<String>,
}

/// Signed change to the three running totals of one balance row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceDelta {
    pub remaining: Credits,
    pub purchased: Credits,
    pub used: Credits,
}

impl BalanceDelta {
    pub fn purchase(credits: Credits) -> Self {
        Self {
            remaining: credits,
            purchased: credits,
            used: 0,
        }
    }

    /// Consumption; a negative amount gives credits back.
    pub fn consume(credits: Credits) -> Self {
        Self {
            remaining: -credits,
            purchased: 0,
            used: credits,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VendorTransactionRow {
    pub id: RowId,
    pub vendor_id: RowId,
    pub vendor_name: Option<String>,
    pub service_name: String,
    pub credits: Credits,
    pub price_usd: f64,
    pub purchase_date: NaiveDate,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubscriptionRow {
    pub id: RowId,
    pub customer_id: RowId,
    pub service_name: String,
    pub vendor_id: Option<RowId>,
    pub vendor_service_name: Option<String>,
    pub start_date: NaiveDate,
    pub expiry_date: Option<NaiveDate>,
    pub credits_used: Credits,
    pub amount_paid: f64,
    pub status: String,
    pub order_status: Option<String>,
    pub payment_status: Option<String>,
    pub payment_method: Option<String>,
    pub classification: Option<String>,
    pub bundle_id: Option<BundleId>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SubscriptionRow {
    /// The credit balance this sale draws on, if it draws on one.
    pub fn balance_key(&self) -> Option<(RowId, &str)> {
        match (self.vendor_id, self.vendor_service_name.as_deref()) {
            (Some(vendor_id), Some(service)) => Some((vendor_id, service)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VendorRow {
    pub id: RowId,
    pub name: String,
    pub contact: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VendorServiceRow {
    pub id: RowId,
    pub vendor_id: RowId,
    pub service_name: String,
    pub cost_per_credit: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomerRow {
    pub id: RowId,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusinessTransactionRow {
    pub id: RowId,
    pub kind: String,
    pub amount_usd: f64,
    pub description: Option<String>,
    pub occurred_on: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// Stored totals of one balance row next to the totals its event
/// tables imply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BalanceDrift {
    pub vendor_id: RowId,
    pub service_name: String,
    pub remaining_credits: Credits,
    pub total_purchased: Credits,
    pub total_used: Credits,
    pub expected_purchased: Credits,
    pub expected_used: Credits,
}

impl BalanceDrift {
    pub fn is_clean(&self) -> bool {
        self.total_purchased == self.expected_purchased
            && self.total_used == self.expected_used
            && self.remaining_credits == self.total_purchased - self.total_used
    }
}
