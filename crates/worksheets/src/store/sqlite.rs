//! `TransactionScope` over a rusqlite transaction

use super::{TransactionScope, ValueRecord, WorksheetRecord};
use crate::error::StorageResult;
use rusqlite::{params, OptionalExtension, Row, Transaction};
use uuid::Uuid;
use worksheets_core::FieldIndex;

const SAVEPOINT: &str = "worksheets_save";

impl TransactionScope for Transaction<'_> {
    fn begin(&mut self) -> StorageResult<()> {
        self.execute_batch(&format!("SAVEPOINT {SAVEPOINT}"))?;
        Ok(())
    }

    fn commit(&mut self) -> StorageResult<()> {
        self.execute_batch(&format!("RELEASE {SAVEPOINT}"))?;
        Ok(())
    }

    fn rollback(&mut self) -> StorageResult<()> {
        self.execute_batch(&format!("ROLLBACK TO {SAVEPOINT}; RELEASE {SAVEPOINT}"))?;
        Ok(())
    }

    fn find_worksheet(&mut self, id: Uuid) -> StorageResult<Option<WorksheetRecord>> {
        let record = self
            .query_row(
                "SELECT version, name FROM worksheets WHERE id = ?1",
                params![id.to_string()],
                |r| {
                    Ok(WorksheetRecord {
                        id,
                        version: r.get(0)?,
                        name: r.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    fn insert_worksheet(&mut self, record: &WorksheetRecord) -> StorageResult<()> {
        self.execute(
            "INSERT INTO worksheets (id, version, name) VALUES (?1, ?2, ?3)",
            params![record.id.to_string(), record.version, &record.name],
        )?;
        Ok(())
    }

    fn update_version(&mut self, id: Uuid, expected: i32, version: i32) -> StorageResult<bool> {
        let updated = self.execute(
            "UPDATE worksheets SET version = ?3 WHERE id = ?1 AND version = ?2",
            params![id.to_string(), expected, version],
        )?;
        Ok(updated == 1)
    }

    fn insert_value(&mut self, record: &ValueRecord) -> StorageResult<()> {
        self.execute(
            r#"
            INSERT INTO worksheet_values (worksheet_id, "index", from_version, to_version, value)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                record.worksheet_id.to_string(),
                record.index.get(),
                record.from_version,
                record.to_version,
                &record.value
            ],
        )?;
        Ok(())
    }

    fn close_value(
        &mut self,
        id: Uuid,
        index: FieldIndex,
        open_version: i32,
        to_version: i32,
    ) -> StorageResult<usize> {
        let closed = self.execute(
            r#"
            UPDATE worksheet_values SET to_version = ?4
            WHERE worksheet_id = ?1 AND "index" = ?2 AND to_version = ?3
            "#,
            params![id.to_string(), index.get(), open_version, to_version],
        )?;
        Ok(closed)
    }

    fn values_at(&mut self, id: Uuid, version: i32) -> StorageResult<Vec<ValueRecord>> {
        let mut stmt = self.prepare_cached(
            r#"
            SELECT "index", from_version, to_version, value
            FROM worksheet_values
            WHERE worksheet_id = ?1 AND from_version <= ?2 AND to_version >= ?2
            ORDER BY "index"
            "#,
        )?;
        let rows = stmt
            .query_map(params![id.to_string(), version], |r| value_from_row(id, r))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn history(&mut self, id: Uuid) -> StorageResult<Vec<ValueRecord>> {
        let mut stmt = self.prepare_cached(
            r#"
            SELECT "index", from_version, to_version, value
            FROM worksheet_values
            WHERE worksheet_id = ?1
            ORDER BY "index", from_version
            "#,
        )?;
        let rows = stmt
            .query_map(params![id.to_string()], |r| value_from_row(id, r))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

fn value_from_row(worksheet_id: Uuid, r: &Row<'_>) -> rusqlite::Result<ValueRecord> {
    Ok(ValueRecord {
        worksheet_id,
        index: FieldIndex::new(r.get(0)?),
        from_version: r.get(1)?,
        to_version: r.get(2)?,
        value: r.get(3)?,
    })
}
