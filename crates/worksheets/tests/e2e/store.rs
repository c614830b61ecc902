//! Saving and loading through the versioned store.

use crate::{count, database, registry, snapshot, ORDERS, SIMPLE};
use pretty_assertions::assert_eq;
use worksheets::{
    FieldIndex, Session, StorageError, StorageResult, StoreOptions, TransactionScope, Uuid, Value,
    ValueRecord, WorksheetRecord, OPEN_VERSION,
};

/// Scope that injects failures into an underlying transaction
struct Faulty<'a> {
    inner: &'a mut dyn TransactionScope,
    /// Value inserts allowed before every further insert fails
    inserts_left: Option<usize>,
    /// Version another writer stores right before the compare-and-set
    racing_version: Option<i32>,
}

impl<'a> Faulty<'a> {
    fn new(inner: &'a mut dyn TransactionScope) -> Self {
        Self {
            inner,
            inserts_left: None,
            racing_version: None,
        }
    }
}

impl TransactionScope for Faulty<'_> {
    fn begin(&mut self) -> StorageResult<()> {
        self.inner.begin()
    }

    fn commit(&mut self) -> StorageResult<()> {
        self.inner.commit()
    }

    fn rollback(&mut self) -> StorageResult<()> {
        self.inner.rollback()
    }

    fn find_worksheet(&mut self, id: Uuid) -> StorageResult<Option<WorksheetRecord>> {
        self.inner.find_worksheet(id)
    }

    fn insert_worksheet(&mut self, record: &WorksheetRecord) -> StorageResult<()> {
        self.inner.insert_worksheet(record)
    }

    fn update_version(&mut self, id: Uuid, expected: i32, version: i32) -> StorageResult<bool> {
        if let Some(racing) = self.racing_version.take() {
            self.inner.update_version(id, expected, racing)?;
        }
        self.inner.update_version(id, expected, version)
    }

    fn insert_value(&mut self, record: &ValueRecord) -> StorageResult<()> {
        match self.inserts_left {
            Some(0) => Err(StorageError::Sqlite(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_FULL),
                Some("database or disk is full".into()),
            ))),
            Some(left) => {
                self.inserts_left = Some(left - 1);
                self.inner.insert_value(record)
            }
            None => self.inner.insert_value(record),
        }
    }

    fn close_value(
        &mut self,
        id: Uuid,
        index: FieldIndex,
        open_version: i32,
        to_version: i32,
    ) -> StorageResult<usize> {
        self.inner.close_value(id, index, open_version, to_version)
    }

    fn values_at(&mut self, id: Uuid, version: i32) -> StorageResult<Vec<ValueRecord>> {
        self.inner.values_at(id, version)
    }

    fn history(&mut self, id: Uuid) -> StorageResult<Vec<ValueRecord>> {
        self.inner.history(id)
    }
}

#[test]
fn test_simple_save_writes_one_row_per_field() {
    let registry = registry(SIMPLE);
    let mut conn = database();
    let mut ws = registry.new_worksheet("simple").unwrap();
    ws.set("name", "Alice").unwrap();

    let mut tx = conn.transaction().unwrap();
    Session::open(&registry, &mut tx).save(&mut ws).unwrap();
    tx.commit().unwrap();

    let (version, name): (i32, String) = conn
        .query_row(
            "SELECT version, name FROM worksheets WHERE id = ?1",
            [ws.id().to_string()],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .unwrap();
    assert_eq!((version, name.as_str()), (1, "simple"));

    let mut stmt = conn
        .prepare(
            r#"SELECT "index", from_version, to_version, value FROM worksheet_values
               WHERE worksheet_id = ?1 ORDER BY "index""#,
        )
        .unwrap();
    let rows: Vec<(i32, i32, i32, String)> = stmt
        .query_map([ws.id().to_string()], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?))
        })
        .unwrap()
        .collect::<rusqlite::Result<_>>()
        .unwrap();

    assert_eq!(
        rows,
        vec![
            (-2, 1, OPEN_VERSION, format!("\"{}\"", ws.id())),
            (-1, 1, OPEN_VERSION, "1".to_string()),
            (1, 1, OPEN_VERSION, "\"Alice\"".to_string()),
            (2, 1, OPEN_VERSION, "undefined".to_string()),
        ]
    );
    assert_eq!(ws.version(), 1);
    assert!(!ws.is_dirty());
}

#[test]
fn test_load_unknown_id_is_not_found() {
    let registry = registry(SIMPLE);
    let mut conn = database();
    let mut tx = conn.transaction().unwrap();
    let mut session = Session::open(&registry, &mut tx);

    let missing = Uuid::new_v4();
    assert!(matches!(
        session.load("simple", missing),
        Err(StorageError::NotFound { id, .. }) if id == missing
    ));
}

#[test]
fn test_load_with_other_definition_name_is_not_found() {
    let registry = registry(ORDERS);
    let mut conn = database();
    let mut tx = conn.transaction().unwrap();
    let mut session = Session::open(&registry, &mut tx);

    let mut person = registry.new_worksheet("person").unwrap();
    session.save(&mut person).unwrap();
    assert!(matches!(
        session.load("order", person.id()),
        Err(StorageError::NotFound { .. })
    ));
}

#[test]
fn test_round_trip_and_idempotent_loads() {
    let registry = registry(ORDERS);
    let mut conn = database();
    let mut tx = conn.transaction().unwrap();
    let mut session = Session::open(&registry, &mut tx);

    let mut order = registry.new_worksheet("order").unwrap();
    order.set("price", Value::number(1250, 2)).unwrap();
    order.set("qty", 2).unwrap();
    order.append("tags", "fragile \"glass\"").unwrap();
    session.save(&mut order).unwrap();

    order.set("qty", 3).unwrap();
    session.save(&mut order).unwrap();
    assert_eq!(order.version(), 2);

    let first = session.load("order", order.id()).unwrap();
    let second = session.load("order", order.id()).unwrap();
    assert_eq!(snapshot(&first), snapshot(&order));
    assert_eq!(snapshot(&first), snapshot(&second));
    assert_eq!(first.version(), 2);
    assert!(!first.is_dirty());
}

#[test]
fn test_load_at_older_version() {
    let registry = registry(ORDERS);
    let mut conn = database();
    let mut tx = conn.transaction().unwrap();
    let mut session = Session::open(&registry, &mut tx);

    let mut order = registry.new_worksheet("order").unwrap();
    order.set("price", 2).unwrap();
    order.set("qty", 1).unwrap();
    session.save(&mut order).unwrap();
    let at_one = snapshot(&order);

    order.set("qty", 5).unwrap();
    session.save(&mut order).unwrap();
    order.set("price", 3).unwrap();
    session.save(&mut order).unwrap();

    let old = session.load_at("order", order.id(), 1).unwrap();
    assert_eq!(snapshot(&old), at_one);
    assert_eq!(old.get("total").unwrap().to_string(), "2.00");

    let middle = session.load_at("order", order.id(), 2).unwrap();
    assert_eq!(middle.get("total").unwrap().to_string(), "10.00");
    assert_eq!(middle.get("version").unwrap(), &Value::from(2));

    for version in [0, 4] {
        assert!(matches!(
            session.load_at("order", order.id(), version),
            Err(StorageError::VersionOutOfRange { latest: 3, .. })
        ));
    }
}

#[test]
fn test_update_closes_only_dirty_rows() {
    let registry = registry(SIMPLE);
    let mut conn = database();
    let mut ws = registry.new_worksheet("simple").unwrap();
    ws.set("name", "Alice").unwrap();

    let mut tx = conn.transaction().unwrap();
    {
        let mut session = Session::open(&registry, &mut tx);
        session.save(&mut ws).unwrap();
        ws.set("age", 30).unwrap();
        session.save(&mut ws).unwrap();

        let history = session.history(ws.id()).unwrap();
        let rows: Vec<(i32, i32, i32)> = history
            .iter()
            .map(|r| (r.index.get(), r.from_version, r.to_version))
            .collect();
        assert_eq!(
            rows,
            vec![
                (-2, 1, OPEN_VERSION),
                (-1, 1, 1),
                (-1, 2, OPEN_VERSION),
                (1, 1, OPEN_VERSION),
                (2, 1, 1),
                (2, 2, OPEN_VERSION),
            ]
        );
        assert_eq!(history.iter().filter(|r| r.is_open()).count(), 4);
    }
    tx.commit().unwrap();

    assert_eq!(count(&conn, "SELECT version FROM worksheets"), 2);
}

#[test]
fn test_clean_save_is_noop() {
    let registry = registry(SIMPLE);
    let mut conn = database();
    let mut tx = conn.transaction().unwrap();
    let mut session = Session::open(&registry, &mut tx);

    let mut ws = registry.new_worksheet("simple").unwrap();
    session.save(&mut ws).unwrap();
    session.save(&mut ws).unwrap();

    assert_eq!(ws.version(), 1);
    assert_eq!(session.history(ws.id()).unwrap().len(), 4);
}

#[test]
fn test_stale_save_is_concurrent_modification() {
    let registry = registry(SIMPLE);
    let mut conn = database();
    let mut tx = conn.transaction().unwrap();
    let mut session = Session::open(&registry, &mut tx);

    let mut original = registry.new_worksheet("simple").unwrap();
    session.save(&mut original).unwrap();

    let mut first = session.load("simple", original.id()).unwrap();
    let mut second = session.load("simple", original.id()).unwrap();
    first.set("name", "first").unwrap();
    second.set("name", "second").unwrap();

    session.save(&mut first).unwrap();
    let rows_before = session.history(original.id()).unwrap();

    let err = session.save(&mut second).unwrap_err();
    assert!(matches!(
        err,
        StorageError::ConcurrentModification {
            expected: 1,
            actual: 2,
            ..
        }
    ));
    assert_eq!(session.history(original.id()).unwrap(), rows_before);
    assert_eq!(second.version(), 1);
    assert!(second.dirty_fields().contains(&FieldIndex::new(1)));

    let stored = session.load("simple", original.id()).unwrap();
    assert_eq!(stored.get("name").unwrap(), &Value::text("first"));
}

#[test]
fn test_references_are_linked_on_load() {
    let source = r#"
        worksheet person {
          1:age number(0)
        }
        worksheet policy {
          1:holder person
          2:holder_age number(0) computed_by { holder.age }
        }
    "#;
    let registry = registry(source);
    let mut conn = database();
    let mut tx = conn.transaction().unwrap();

    let mut bob = registry.new_worksheet("person").unwrap();
    bob.set("age", 40).unwrap();
    let mut policy = registry.new_worksheet("policy").unwrap();
    policy.link("holder", &bob).unwrap();

    let mut session = Session::open(&registry, &mut tx);
    session.save(&mut bob).unwrap();
    session.save(&mut policy).unwrap();

    let mut loaded = session.load("policy", policy.id()).unwrap();
    let holder = loaded.linked(bob.id()).expect("holder should be linked");
    assert_eq!(holder.get("age").unwrap(), &Value::from(40));
    assert_eq!(loaded.get("holder_age").unwrap(), &Value::from(40));

    // Relinking a newer snapshot recomputes the dependent field
    let mut older = session.load("person", bob.id()).unwrap();
    older.set("age", 41).unwrap();
    loaded.link("holder", &older).unwrap();
    assert_eq!(loaded.get("holder_age").unwrap(), &Value::from(41));

    let options = StoreOptions {
        link_references: false,
        ..StoreOptions::default()
    };
    let mut bare = Session::with_options(&registry, &mut tx, options);
    let unlinked = bare.load("policy", policy.id()).unwrap();
    assert!(unlinked.linked(bob.id()).is_none());
}

#[test]
fn test_unsaved_reference_target_loads_unlinked() {
    let source = r#"
        worksheet person {
          1:age number(0)
        }
        worksheet policy {
          1:holder person
          2:holder_age number(0) computed_by { holder.age }
        }
    "#;
    let registry = registry(source);
    let mut conn = database();
    let mut tx = conn.transaction().unwrap();

    let mut bob = registry.new_worksheet("person").unwrap();
    bob.set("age", 40).unwrap();
    let mut policy = registry.new_worksheet("policy").unwrap();
    policy.link("holder", &bob).unwrap();

    let mut session = Session::open(&registry, &mut tx);
    session.save(&mut policy).unwrap();

    let loaded = session.load("policy", policy.id()).unwrap();
    assert_eq!(loaded.get("holder").unwrap(), &Value::Ref(bob.id()));
    assert!(loaded.linked(bob.id()).is_none());
    assert_eq!(loaded.get("holder_age").unwrap(), &Value::from(40));
    assert_eq!(snapshot(&loaded), snapshot(&policy));
}

#[test]
fn test_failed_insert_leaves_no_rows() {
    let registry = registry(SIMPLE);
    let mut conn = database();
    let mut tx = conn.transaction().unwrap();

    let mut ws = registry.new_worksheet("simple").unwrap();
    ws.set("name", "Alice").unwrap();

    let mut faulty = Faulty::new(&mut tx);
    faulty.inserts_left = Some(2);
    let err = Session::open(&registry, &mut faulty)
        .save(&mut ws)
        .unwrap_err();
    assert!(matches!(err, StorageError::Sqlite(_)));
    assert!(Session::open(&registry, &mut tx)
        .history(ws.id())
        .unwrap()
        .is_empty());
    assert_eq!(count(&tx, "SELECT COUNT(*) FROM worksheets"), 0);
    assert_eq!(ws.version(), 1);
    assert!(ws.dirty_fields().contains(&FieldIndex::new(1)));

    Session::open(&registry, &mut tx).save(&mut ws).unwrap();
    let rows_before = Session::open(&registry, &mut tx).history(ws.id()).unwrap();
    ws.set("age", 30).unwrap();

    // the version row goes in, the age row fails
    let mut faulty = Faulty::new(&mut tx);
    faulty.inserts_left = Some(1);
    let err = Session::open(&registry, &mut faulty)
        .save(&mut ws)
        .unwrap_err();
    assert!(matches!(err, StorageError::Sqlite(_)));
    assert_eq!(
        Session::open(&registry, &mut tx).history(ws.id()).unwrap(),
        rows_before
    );
    assert_eq!(count(&tx, "SELECT version FROM worksheets"), 1);
    assert_eq!(ws.version(), 1);
    assert!(ws.dirty_fields().contains(&FieldIndex::new(2)));
}

#[test]
fn test_lost_version_race_reports_stored_version() {
    let registry = registry(SIMPLE);
    let mut conn = database();
    let mut tx = conn.transaction().unwrap();

    let mut ws = registry.new_worksheet("simple").unwrap();
    Session::open(&registry, &mut tx).save(&mut ws).unwrap();
    ws.set("name", "Alice").unwrap();

    let mut faulty = Faulty::new(&mut tx);
    faulty.racing_version = Some(7);
    let err = Session::open(&registry, &mut faulty)
        .save(&mut ws)
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::ConcurrentModification {
            expected: 1,
            actual: 7,
            ..
        }
    ));
    assert_eq!(ws.version(), 1);
    assert!(ws.is_dirty());
}

#[test]
fn test_field_added_after_first_save_is_backfilled() {
    let before = registry(SIMPLE);
    let after = registry(
        r#"
        worksheet simple {
          1:name  text
          2:age   number(0)
          3:email text
        }
        "#,
    );
    let mut conn = database();
    let mut tx = conn.transaction().unwrap();

    let mut ws = before.new_worksheet("simple").unwrap();
    ws.set("name", "Alice").unwrap();
    Session::open(&before, &mut tx).save(&mut ws).unwrap();
    ws.set("age", 30).unwrap();
    Session::open(&before, &mut tx).save(&mut ws).unwrap();

    let mut session = Session::open(&after, &mut tx);
    let mut loaded = session.load("simple", ws.id()).unwrap();
    assert_eq!(loaded.get("email").unwrap(), &Value::Undefined);
    loaded.set("email", "alice@example.com").unwrap();
    session.save(&mut loaded).unwrap();

    let rows: Vec<(i32, i32, String)> = session
        .history(ws.id())
        .unwrap()
        .into_iter()
        .filter(|r| r.index == FieldIndex::new(3))
        .map(|r| (r.from_version, r.to_version, r.value))
        .collect();
    assert_eq!(
        rows,
        vec![
            (1, 2, "undefined".to_string()),
            (3, OPEN_VERSION, "\"alice@example.com\"".to_string()),
        ]
    );

    let second = session.load_at("simple", ws.id(), 2).unwrap();
    assert_eq!(second.get("email").unwrap(), &Value::Undefined);
    assert_eq!(second.get("age").unwrap(), &Value::from(30));
}

#[test]
fn test_saving_loaded_worksheet_into_empty_store_is_not_found() {
    let registry = registry(SIMPLE);
    let mut conn = database();
    let mut tx = conn.transaction().unwrap();

    let mut ws = registry.new_worksheet("simple").unwrap();
    Session::open(&registry, &mut tx).save(&mut ws).unwrap();
    ws.set("name", "Alice").unwrap();
    Session::open(&registry, &mut tx).save(&mut ws).unwrap();
    let mut loaded = Session::open(&registry, &mut tx)
        .load("simple", ws.id())
        .unwrap();
    loaded.set("name", "Bob").unwrap();

    let mut elsewhere = database();
    let mut other = elsewhere.transaction().unwrap();
    let err = Session::open(&registry, &mut other)
        .save(&mut loaded)
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound { id, .. } if id == ws.id()));
    assert_eq!(loaded.version(), 2);
    assert!(loaded.is_dirty());
    assert_eq!(count(&other, "SELECT COUNT(*) FROM worksheet_values"), 0);
}

#[test]
fn test_unknown_history_rows_are_skipped() {
    let registry = registry(SIMPLE);
    let mut conn = database();
    let mut tx = conn.transaction().unwrap();

    let mut ws = registry.new_worksheet("simple").unwrap();
    ws.set("name", "Alice").unwrap();
    Session::open(&registry, &mut tx).save(&mut ws).unwrap();

    tx.insert_value(&worksheets::ValueRecord {
        worksheet_id: ws.id(),
        index: FieldIndex::new(99),
        from_version: 1,
        to_version: OPEN_VERSION,
        value: "\"stale\"".into(),
    })
    .unwrap();

    let loaded = Session::open(&registry, &mut tx)
        .load("simple", ws.id())
        .unwrap();
    assert_eq!(snapshot(&loaded), snapshot(&ws));
}

#[test]
fn test_corrupt_value_is_reported() {
    let registry = registry(SIMPLE);
    let mut conn = database();
    let mut tx = conn.transaction().unwrap();

    let mut ws = registry.new_worksheet("simple").unwrap();
    Session::open(&registry, &mut tx).save(&mut ws).unwrap();
    tx.execute(
        r#"UPDATE worksheet_values SET value = 'true' WHERE "index" = 2"#,
        [],
    )
    .unwrap();

    let err = Session::open(&registry, &mut tx)
        .load("simple", ws.id())
        .unwrap_err();
    assert!(matches!(err, StorageError::CorruptValue { index: 2, .. }));
}
