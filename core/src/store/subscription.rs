use super::{LedgerStore, LedgerTx, SubscriptionRow};
use crate::{error::LedgerResult, types::RowId};
use rusqlite::{params, OptionalExtension, Row};

const SUBSCRIPTION_COLUMNS: &str =
    "id, customer_id, service_name, vendor_id, vendor_service_name, start_date, expiry_date,
     credits_used, amount_paid, status, order_status, payment_status, payment_method,
     classification, bundle_id, notes, created_at";

fn subscription_from_row(row: &Row<'_>) -> rusqlite::Result<SubscriptionRow> {
    Ok(SubscriptionRow {
        id: row.get(0)?,
        customer_id: row.get(1)?,
        service_name: row.get(2)?,
        vendor_id: row.get(3)?,
        vendor_service_name: row.get(4)?,
        start_date: row.get(5)?,
        expiry_date: row.get(6)?,
        credits_used: row.get(7)?,
        amount_paid: row.get(8)?,
        status: row.get(9)?,
        order_status: row.get(10)?,
        payment_status: row.get(11)?,
        payment_method: row.get(12)?,
        classification: row.get(13)?,
        bundle_id: row.get(14)?,
        notes: row.get(15)?,
        created_at: row.get(16)?,
    })
}

impl LedgerTx<'_> {
    // ── Subscriptions (sales) ──────────────────────────────────────

    /// Insert `s` as a new row; `s.id` is ignored.
    pub fn insert_subscription(&self, s: &SubscriptionRow) -> LedgerResult<RowId> {
        self.conn().execute(
            "INSERT INTO subscriptions (
                customer_id, service_name, vendor_id, vendor_service_name, start_date,
                expiry_date, credits_used, amount_paid, status, order_status,
                payment_status, payment_method, classification, bundle_id, notes, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                s.customer_id,
                &s.service_name,
                s.vendor_id,
                &s.vendor_service_name,
                s.start_date,
                s.expiry_date,
                s.credits_used,
                s.amount_paid,
                &s.status,
                &s.order_status,
                &s.payment_status,
                &s.payment_method,
                &s.classification,
                &s.bundle_id,
                &s.notes,
                s.created_at,
            ],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    pub fn subscription(&self, id: RowId) -> LedgerResult<Option<SubscriptionRow>> {
        let row = self
            .conn()
            .query_row(
                &format!("SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = ?1"),
                params![id],
                subscription_from_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Overwrite every mutable column of row `s.id`.
    pub fn update_subscription(&self, s: &SubscriptionRow) -> LedgerResult<usize> {
        let changed = self.conn().execute(
            "UPDATE subscriptions SET
                service_name = ?1, vendor_id = ?2, vendor_service_name = ?3,
                expiry_date = ?4, credits_used = ?5, amount_paid = ?6, status = ?7,
                order_status = ?8, payment_status = ?9, payment_method = ?10,
                classification = ?11, notes = ?12
             WHERE id = ?13",
            params![
                &s.service_name,
                s.vendor_id,
                &s.vendor_service_name,
                s.expiry_date,
                s.credits_used,
                s.amount_paid,
                &s.status,
                &s.order_status,
                &s.payment_status,
                &s.payment_method,
                &s.classification,
                &s.notes,
                s.id,
            ],
        )?;
        Ok(changed)
    }

    pub fn delete_subscription(&self, id: RowId) -> LedgerResult<usize> {
        let deleted = self
            .conn()
            .execute("DELETE FROM subscriptions WHERE id = ?1", params![id])?;
        Ok(deleted)
    }

    pub fn bundle_subscriptions(&self, bundle_id: &str) -> LedgerResult<Vec<SubscriptionRow>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions
             WHERE bundle_id = ?1 ORDER BY id ASC"
        ))?;
        let rows = stmt.query_map(params![bundle_id], subscription_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

impl LedgerStore {
    /// All sales, newest first.
    pub fn subscriptions(&self) -> LedgerResult<Vec<SubscriptionRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions ORDER BY id DESC"
        ))?;
        let rows = stmt.query_map([], subscription_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn subscription(&self, id: RowId) -> LedgerResult<Option<SubscriptionRow>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = ?1"),
                params![id],
                subscription_from_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn bundle_size(&self, bundle_id: &str) -> LedgerResult<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM subscriptions WHERE bundle_id = ?1",
                params![bundle_id],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }
}
