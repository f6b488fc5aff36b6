use super::{BalanceDelta, BalanceDrift, CreditBalanceRow, CreditBalanceView, LedgerStore, LedgerTx};
use crate::{
    error::LedgerResult,
    types::{Credits, RowId},
};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

const BALANCE_COLUMNS: &str = "b.id, b.vendor_id, b.service_name, b.remaining_credits,
     b.total_purchased, b.total_used, b.updated_at";

fn balance_from_row(row: &Row<'_>) -> rusqlite::Result<CreditBalanceRow> {
    Ok(CreditBalanceRow {
        id: row.get(0)?,
        vendor_id: row.get(1)?,
        service_name: row.get(2)?,
        remaining_credits: row.get(3)?,
        total_purchased: row.get(4)?,
        total_used: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn find_balance(
    conn: &Connection,
    vendor_id: RowId,
    service_name: &str,
) -> LedgerResult<Option<CreditBalanceRow>> {
    let balance = conn
        .query_row(
            &format!(
                "SELECT {BALANCE_COLUMNS} FROM credit_balances b
                 WHERE b.vendor_id = ?1 AND b.service_name = ?2"
            ),
            params![vendor_id, service_name],
            balance_from_row,
        )
        .optional()?;
    Ok(balance)
}

impl LedgerTx<'_> {
    // ── Credit balances ────────────────────────────────────────────

    pub fn find_balance(
        &self,
        vendor_id: RowId,
        service_name: &str,
    ) -> LedgerResult<Option<CreditBalanceRow>> {
        find_balance(self.conn(), vendor_id, service_name)
    }

    /// First purchase for a pair: remaining = purchased = credits, used = 0.
    pub fn seed_balance(
        &self,
        vendor_id: RowId,
        service_name: &str,
        credits: Credits,
    ) -> LedgerResult<RowId> {
        self.conn().execute(
            "INSERT INTO credit_balances
                (vendor_id, service_name, remaining_credits, total_purchased, total_used,
                 updated_at)
             VALUES (?1, ?2, ?3, ?3, 0, ?4)",
            params![vendor_id, service_name, credits, Utc::now()],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    /// Apply `delta` to the pair's running totals.
    /// Returns the number of rows touched: 0 when the pair has no balance row.
    pub fn adjust_balance(
        &self,
        vendor_id: RowId,
        service_name: &str,
        delta: BalanceDelta,
    ) -> LedgerResult<usize> {
        let changed = self.conn().execute(
            "UPDATE credit_balances
             SET remaining_credits = remaining_credits + ?1,
                 total_purchased   = total_purchased + ?2,
                 total_used        = total_used + ?3,
                 updated_at        = ?4
             WHERE vendor_id = ?5 AND service_name = ?6",
            params![
                delta.remaining,
                delta.purchased,
                delta.used,
                Utc::now(),
                vendor_id,
                service_name,
            ],
        )?;
        Ok(changed)
    }
}

impl LedgerStore {
    pub fn credit_balance(
        &self,
        vendor_id: RowId,
        service_name: &str,
    ) -> LedgerResult<Option<CreditBalanceRow>> {
        find_balance(&self.conn, vendor_id, service_name)
    }

    /// Every balance row with its vendor name, lowest remaining first.
    pub fn credit_balances(&self) -> LedgerResult<Vec<CreditBalanceView>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {BALANCE_COLUMNS}, v.name
             FROM credit_balances b
             LEFT JOIN vendors v ON v.id = b.vendor_id
             ORDER BY b.remaining_credits ASC, b.vendor_id ASC, b.service_name ASC"
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok(CreditBalanceView {
                balance: balance_from_row(row)?,
                vendor_name: row.get(7)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Recompute each pair's purchased and used totals from the event tables.
    pub fn balance_drift(&self) -> LedgerResult<Vec<BalanceDrift>> {
        let mut stmt = self.conn.prepare(
            "SELECT b.vendor_id, b.service_name,
                    b.remaining_credits, b.total_purchased, b.total_used,
                    COALESCE((SELECT SUM(vt.credits) FROM vendor_transactions vt
                              WHERE vt.vendor_id = b.vendor_id
                                AND vt.service_name = b.service_name), 0),
                    COALESCE((SELECT SUM(s.credits_used) FROM subscriptions s
                              WHERE s.vendor_id = b.vendor_id
                                AND s.vendor_service_name = b.service_name), 0)
             FROM credit_balances b
             ORDER BY b.vendor_id ASC, b.service_name ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(BalanceDrift {
                vendor_id: row.get(0)?,
                service_name: row.get(1)?,
                remaining_credits: row.get(2)?,
                total_purchased: row.get(3)?,
                total_used: row.get(4)?,
                expected_purchased: row.get(5)?,
                expected_used: row.get(6)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}
