use super::{BusinessTransactionRow, LedgerStore, LedgerTx};
use crate::{error::LedgerResult, types::RowId};
use chrono::{NaiveDate, Utc};
use rusqlite::params;

impl LedgerTx<'_> {
    // ── Cash ledger ───────────────────────────────────────────────

    pub fn insert_business_transaction(
        &self,
        kind: &str,
        amount_usd: f64,
        description: Option<&str>,
        occurred_on: NaiveDate,
    ) -> LedgerResult<RowId> {
        self.conn().execute(
            "INSERT INTO business_transactions
                (kind, amount_usd, description, occurred_on, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![kind, amount_usd, description, occurred_on, Utc::now()],
        )?;
        Ok(self.conn().last_insert_rowid())
    }
}

impl LedgerStore {
    pub fn business_transactions(&self) -> LedgerResult<Vec<BusinessTransactionRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, kind, amount_usd, description, occurred_on, created_at
             FROM business_transactions
             ORDER BY occurred_on DESC, id DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(BusinessTransactionRow {
                id: row.get(0)?,
                kind: row.get(1)?,
                amount_usd: row.get(2)?,
                description: row.get(3)?,
                occurred_on: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}
