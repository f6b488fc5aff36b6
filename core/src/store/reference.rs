use super::{CustomerRow, LedgerStore, LedgerTx, VendorRow, VendorServiceRow};
use crate::{error::LedgerResult, types::RowId};
use chrono::Utc;
use rusqlite::{params, Row};

fn vendor_from_row(row: &Row<'_>) -> rusqlite::Result<VendorRow> {
    Ok(VendorRow {
        id: row.get(0)?,
        name: row.get(1)?,
        contact: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn customer_from_row(row: &Row<'_>) -> rusqlite::Result<CustomerRow> {
    Ok(CustomerRow {
        id: row.get(0)?,
        name: row.get(1)?,
        phone: row.get(2)?,
        email: row.get(3)?,
        created_at: row.get(4)?,
    })
}

impl LedgerTx<'_> {
    // ── Vendors ───────────────────────────────────────────────────

    pub fn insert_vendor(&self, name: &str, contact: Option<&str>) -> LedgerResult<RowId> {
        self.conn().execute(
            "INSERT INTO vendors (name, contact, created_at) VALUES (?1, ?2, ?3)",
            params![name, contact, Utc::now()],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    pub fn vendor_exists(&self, vendor_id: RowId) -> LedgerResult<bool> {
        self.conn()
            .query_row(
                "SELECT COUNT(*) > 0 FROM vendors WHERE id = ?1",
                params![vendor_id],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }

    /// Register a service a vendor sells. Re-registering updates the cost.
    pub fn upsert_vendor_service(
        &self,
        vendor_id: RowId,
        service_name: &str,
        cost_per_credit: f64,
    ) -> LedgerResult<RowId> {
        self.conn().execute(
            "INSERT INTO vendor_services (vendor_id, service_name, cost_per_credit)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(vendor_id, service_name) DO UPDATE SET
                cost_per_credit = excluded.cost_per_credit",
            params![vendor_id, service_name, cost_per_credit],
        )?;
        self.conn()
            .query_row(
                "SELECT id FROM vendor_services WHERE vendor_id = ?1 AND service_name = ?2",
                params![vendor_id, service_name],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }

    // ── Customers ─────────────────────────────────────────────────

    pub fn insert_customer(
        &self,
        name: &str,
        phone: Option<&str>,
        email: Option<&str>,
    ) -> LedgerResult<RowId> {
        self.conn().execute(
            "INSERT INTO customers (name, phone, email, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![name, phone, email, Utc::now()],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    pub fn customer_exists(&self, customer_id: RowId) -> LedgerResult<bool> {
        self.conn()
            .query_row(
                "SELECT COUNT(*) > 0 FROM customers WHERE id = ?1",
                params![customer_id],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }
}

impl LedgerStore {
    pub fn vendors(&self) -> LedgerResult<Vec<VendorRow>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, contact, created_at FROM vendors ORDER BY name ASC")?;
        let rows = stmt.query_map([], vendor_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn vendor_services(&self, vendor_id: RowId) -> LedgerResult<Vec<VendorServiceRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, vendor_id, service_name, cost_per_credit
             FROM vendor_services WHERE vendor_id = ?1
             ORDER BY service_name ASC",
        )?;
        let rows = stmt.query_map(params![vendor_id], |row| {
            Ok(VendorServiceRow {
                id: row.get(0)?,
                vendor_id: row.get(1)?,
                service_name: row.get(2)?,
                cost_per_credit: row.get(3)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn customers(&self) -> LedgerResult<Vec<CustomerRow>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, phone, email, created_at FROM customers ORDER BY name ASC")?;
        let rows = stmt.query_map([], customer_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}
