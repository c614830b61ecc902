//! Common utilities for E2E tests.

use rusqlite::Connection;
use worksheets::{schema, Registry};

pub const SIMPLE: &str = r#"
worksheet simple {
  1:name text
  2:age  number(0)
}
"#;

pub const DIVISION: &str = r#"
worksheet ratio {
  1:a number(2)
  2:b number(2)
  3:c number(2) computed_by { return a / b round half 2 }
}
"#;

pub const ORDERS: &str = r#"
worksheet person {
  1:name text
  2:age  number(0)
}

worksheet order {
  1:price  number(2)
  2:qty    number(0)
  3:total  number(2) computed_by { return price * qty }
  4:budget number(2) constrained_by { total <= budget }
  5:buyer  person
  6:tags   []text
}
"#;

pub fn registry(source: &str) -> Registry {
    Registry::from_source(source).expect("definitions should build")
}

/// In-memory database with the schema installed
pub fn database() -> Connection {
    let conn = Connection::open_in_memory().expect("open in-memory database");
    schema::init(&conn).expect("create schema");
    conn
}

pub fn count(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |r| r.get(0)).expect("count query")
}

/// Every field of a worksheet as `(index, canonical text)`
pub fn snapshot(worksheet: &worksheets::Worksheet) -> Vec<(i32, String)> {
    worksheet
        .values()
        .map(|(field, value)| (field.index().get(), value.to_string()))
        .collect()
}
