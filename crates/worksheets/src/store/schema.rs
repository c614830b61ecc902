//! Persisted schema

use rusqlite::Connection;

/// Create the worksheet tables if they do not exist yet
pub fn init(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS worksheets (
          id TEXT PRIMARY KEY,
          version INTEGER NOT NULL,
          name TEXT NOT NULL
        );

        -- One row per (worksheet, field) per range of versions the value was
        -- current for. The open row has to_version = 2147483647.
        CREATE TABLE IF NOT EXISTS worksheet_values (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          worksheet_id TEXT NOT NULL REFERENCES worksheets(id),
          "index" INTEGER NOT NULL,
          from_version INTEGER NOT NULL,
          to_version INTEGER NOT NULL,
          value TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_worksheet_values_open
          ON worksheet_values(worksheet_id, "index", to_version);
        "#,
    )
}
