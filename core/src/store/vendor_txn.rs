use super::{LedgerStore, LedgerTx, VendorTransactionRow};
use crate::{
    error::LedgerResult,
    types::{Credits, RowId},
};
use chrono::{NaiveDate, Utc};
use rusqlite::{params, OptionalExtension, Row};

const VENDOR_TXN_SELECT: &str =
    "SELECT t.id, t.vendor_id, v.name, t.service_name, t.credits, t.price_usd,
            t.purchase_date, t.notes, t.created_at
     FROM vendor_transactions t
     LEFT JOIN vendors v ON v.id = t.vendor_id";

fn vendor_txn_from_row(row: &Row<'_>) -> rusqlite::Result<VendorTransactionRow> {
    Ok(VendorTransactionRow {
        id: row.get(0)?,
        vendor_id: row.get(1)?,
        vendor_name: row.get(2)?,
        service_name: row.get(3)?,
        credits: row.get(4)?,
        price_usd: row.get(5)?,
        purchase_date: row.get(6)?,
        notes: row.get(7)?,
        created_at: row.get(8)?,
    })
}

impl LedgerTx<'_> {
    // ── Vendor transactions (purchases) ────────────────────────────

    pub fn insert_vendor_transaction(
        &self,
        vendor_id: RowId,
        service_name: &str,
        credits: Credits,
        price_usd: f64,
        purchase_date: NaiveDate,
        notes: Option<&str>,
    ) -> LedgerResult<RowId> {
        self.conn().execute(
            "INSERT INTO vendor_transactions
                (vendor_id, service_name, credits, price_usd, purchase_date, notes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![vendor_id, service_name, credits, price_usd, purchase_date, notes, Utc::now()],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    pub fn vendor_transaction(&self, id: RowId) -> LedgerResult<Option<VendorTransactionRow>> {
        let row = self
            .conn()
            .query_row(
                &format!("{VENDOR_TXN_SELECT} WHERE t.id = ?1"),
                params![id],
                vendor_txn_from_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn delete_vendor_transaction(&self, id: RowId) -> LedgerResult<usize> {
        let deleted = self
            .conn()
            .execute("DELETE FROM vendor_transactions WHERE id = ?1", params![id])?;
        Ok(deleted)
    }
}

impl LedgerStore {
    /// All purchases, newest first.
    pub fn vendor_transactions(&self) -> LedgerResult<Vec<VendorTransactionRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "{VENDOR_TXN_SELECT} ORDER BY t.purchase_date DESC, t.id DESC"
        ))?;
        let rows = stmt.query_map([], vendor_txn_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn vendor_transaction_count(&self) -> LedgerResult<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM vendor_transactions", [], |row| row.get(0))
            .map_err(Into::into)
    }
}
