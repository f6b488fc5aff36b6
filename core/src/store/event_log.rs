use super::{LedgerStore, LedgerTx};
use crate::{
    error::LedgerResult,
    event::{EventLogEntry, LedgerEvent},
};
use chrono::Utc;
use rusqlite::params;

impl LedgerTx<'_> {
    // ── Event log ─────────────────────────────────────────────────

    pub fn append_event(&self, event: &LedgerEvent) -> LedgerResult<()> {
        self.conn().execute(
            "INSERT INTO ledger_event (event_type, payload, created_at) VALUES (?1, ?2, ?3)",
            params![event.type_name(), serde_json::to_string(event)?, Utc::now()],
        )?;
        Ok(())
    }
}

impl LedgerStore {
    /// The whole event log in append order.
    pub fn events(&self) -> LedgerResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, event_type, payload, created_at FROM ledger_event ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map([], |row| {
                Ok(EventLogEntry {
                    id: Some(row.get(0)?),
                    event_type: row.get(1)?,
                    payload: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn event_count(&self) -> LedgerResult<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM ledger_event", [], |row| row.get(0))
            .map_err(Into::into)
    }
}
