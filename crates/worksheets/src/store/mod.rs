//! Versioned store
//!
//! Worksheets are persisted as one record per worksheet plus an append-only
//! history of field values. Each history row holds a value together with
//! the range of versions `[from_version, to_version]` it was current for,
//! so any past version can be read back. The open row of a field has
//! `to_version == OPEN_VERSION`.
//!
//! All reads and writes go through a [`TransactionScope`] owned by the
//! caller; [`rusqlite::Transaction`] implements it.

pub mod schema;
mod sqlite;

use crate::error::{StorageError, StorageResult};
use crate::registry::Registry;
use crate::worksheet::Worksheet;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;
use worksheets_core::{FieldIndex, Value};

/// `to_version` of the row holding a field's current value
pub const OPEN_VERSION: i32 = i32::MAX;

/// Stored worksheet header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorksheetRecord {
    pub id: Uuid,
    pub version: i32,
    /// Definition name
    pub name: String,
}

/// One value of one field, valid for a range of versions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueRecord {
    pub worksheet_id: Uuid,
    pub index: FieldIndex,
    pub from_version: i32,
    pub to_version: i32,
    /// Canonical text form of the value
    pub value: String,
}

impl ValueRecord {
    fn open(worksheet_id: Uuid, index: FieldIndex, from_version: i32, value: &Value) -> Self {
        Self {
            worksheet_id,
            index,
            from_version,
            to_version: OPEN_VERSION,
            value: value.to_string(),
        }
    }

    /// Check if this row holds the current value
    pub fn is_open(&self) -> bool {
        self.to_version == OPEN_VERSION
    }
}

/// Transactional collaborator used by [`Session`]
///
/// `begin`/`commit`/`rollback` bracket a nested atomic section inside the
/// caller's transaction. The remaining methods read and write records.
pub trait TransactionScope {
    fn begin(&mut self) -> StorageResult<()>;

    fn commit(&mut self) -> StorageResult<()>;

    fn rollback(&mut self) -> StorageResult<()>;

    fn find_worksheet(&mut self, id: Uuid) -> StorageResult<Option<WorksheetRecord>>;

    fn insert_worksheet(&mut self, record: &WorksheetRecord) -> StorageResult<()>;

    /// Set the stored version if it still equals `expected`; false otherwise
    fn update_version(&mut self, id: Uuid, expected: i32, version: i32) -> StorageResult<bool>;

    fn insert_value(&mut self, record: &ValueRecord) -> StorageResult<()>;

    /// Set `to_version` on the row of `index` whose `to_version` is
    /// `open_version`; returns the number of rows changed
    fn close_value(
        &mut self,
        id: Uuid,
        index: FieldIndex,
        open_version: i32,
        to_version: i32,
    ) -> StorageResult<usize>;

    /// Rows with `from_version <= version <= to_version`
    fn values_at(&mut self, id: Uuid, version: i32) -> StorageResult<Vec<ValueRecord>>;

    /// Every row of a worksheet, ordered by index then `from_version`
    fn history(&mut self, id: Uuid) -> StorageResult<Vec<ValueRecord>>;
}

/// Store configuration
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Load and link the worksheets that reference fields point at
    pub link_references: bool,
    /// How many reference hops to follow from the loaded worksheet
    pub max_link_depth: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            link_references: true,
            max_link_depth: 8,
        }
    }
}

/// Save and load worksheets through a transaction scope
pub struct Session<'a, S: TransactionScope + ?Sized> {
    registry: &'a Registry,
    scope: &'a mut S,
    options: StoreOptions,
}

impl<'a, S: TransactionScope + ?Sized> Session<'a, S> {
    /// Open a session with default options
    pub fn open(registry: &'a Registry, scope: &'a mut S) -> Self {
        Self::with_options(registry, scope, StoreOptions::default())
    }

    pub fn with_options(registry: &'a Registry, scope: &'a mut S, options: StoreOptions) -> Self {
        Self {
            registry,
            scope,
            options,
        }
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Persist a worksheet.
    ///
    /// A worksheet never saved before is written whole at version 1. A
    /// stored worksheet with dirty fields gets a new version holding those
    /// fields; it must still be at the version it was loaded at, otherwise
    /// `ConcurrentModification` is returned and nothing is written. A
    /// worksheet past version 1 with no stored record is `NotFound`. On
    /// success the worksheet's version advances and its dirty set clears.
    pub fn save(&mut self, worksheet: &mut Worksheet) -> StorageResult<()> {
        self.scope.begin()?;
        match self.write(worksheet) {
            Ok(saved) => {
                self.scope.commit()?;
                if let Some(version) = saved {
                    worksheet.mark_saved(version);
                }
                Ok(())
            }
            Err(err) => {
                if let Err(rollback) = self.scope.rollback() {
                    warn!(id = %worksheet.id(), error = %rollback, "savepoint rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Returns the version written, or `None` if nothing was dirty
    fn write(&mut self, worksheet: &Worksheet) -> StorageResult<Option<i32>> {
        let id = worksheet.id();
        let name = worksheet.definition_name();

        let Some(record) = self.scope.find_worksheet(id)? else {
            // Loaded at a later version from a record that is gone
            if worksheet.version() != 1 {
                return Err(StorageError::NotFound {
                    definition: name.to_string(),
                    id,
                });
            }
            self.scope.insert_worksheet(&WorksheetRecord {
                id,
                version: 1,
                name: name.to_string(),
            })?;
            for (field, value) in worksheet.values() {
                let value = if field.index() == FieldIndex::VERSION {
                    Value::from(1)
                } else {
                    value.clone()
                };
                self.scope
                    .insert_value(&ValueRecord::open(id, field.index(), 1, &value))?;
            }
            debug!(definition = name, %id, "saved new worksheet");
            return Ok(Some(1));
        };

        if record.name != name {
            return Err(StorageError::DefinitionMismatch {
                id,
                stored: record.name,
                actual: name.to_string(),
            });
        }
        let current = worksheet.version();
        if record.version != current {
            return Err(StorageError::ConcurrentModification {
                id,
                expected: current,
                actual: record.version,
            });
        }
        if !worksheet.is_dirty() {
            return Ok(None);
        }

        let next = current
            .checked_add(1)
            .filter(|&v| v < OPEN_VERSION)
            .ok_or(StorageError::VersionOutOfRange {
                id,
                requested: current,
                latest: record.version,
            })?;
        if !self.scope.update_version(id, current, next)? {
            let actual = self
                .scope
                .find_worksheet(id)?
                .map_or(0, |stored| stored.version);
            return Err(StorageError::ConcurrentModification {
                id,
                expected: current,
                actual,
            });
        }

        let mut fields: BTreeSet<FieldIndex> = worksheet.dirty_fields().clone();
        fields.insert(FieldIndex::VERSION);
        for index in fields {
            let value = if index == FieldIndex::VERSION {
                Value::from(next)
            } else {
                worksheet.value_at(index).clone()
            };
            if self.scope.close_value(id, index, OPEN_VERSION, current)? == 0 {
                // Field added to the definition after this worksheet was
                // first saved: earlier versions read it as Undefined
                self.scope.insert_value(&ValueRecord {
                    worksheet_id: id,
                    index,
                    from_version: 1,
                    to_version: current,
                    value: Value::Undefined.to_string(),
                })?;
            }
            self.scope
                .insert_value(&ValueRecord::open(id, index, next, &value))?;
        }

        debug!(definition = name, %id, from = current, to = next, "saved worksheet");
        Ok(Some(next))
    }

    /// Load the latest version of a worksheet
    pub fn load(&mut self, name: &str, id: Uuid) -> StorageResult<Worksheet> {
        let record = self.record(name, id)?;
        let version = record.version;
        self.load_root(record, version)
    }

    /// Load a worksheet as it was at `version`
    pub fn load_at(&mut self, name: &str, id: Uuid, version: i32) -> StorageResult<Worksheet> {
        let record = self.record(name, id)?;
        if version < 1 || version > record.version {
            return Err(StorageError::VersionOutOfRange {
                id,
                requested: version,
                latest: record.version,
            });
        }
        self.load_root(record, version)
    }

    /// Raw history rows of a worksheet, ordered by index then version
    pub fn history(&mut self, id: Uuid) -> StorageResult<Vec<ValueRecord>> {
        self.scope.history(id)
    }

    fn record(&mut self, name: &str, id: Uuid) -> StorageResult<WorksheetRecord> {
        self.scope
            .find_worksheet(id)?
            .filter(|record| record.name == name)
            .ok_or_else(|| StorageError::NotFound {
                definition: name.to_string(),
                id,
            })
    }

    fn load_root(&mut self, record: WorksheetRecord, version: i32) -> StorageResult<Worksheet> {
        let mut linker = Linker::default();
        linker.visiting.insert(record.id);
        self.hydrate(&record, version, &mut linker, 0)
    }

    fn hydrate(
        &mut self,
        record: &WorksheetRecord,
        version: i32,
        linker: &mut Linker,
        depth: usize,
    ) -> StorageResult<Worksheet> {
        let definition = Arc::clone(self.registry.require(&record.name)?);

        let mut values = BTreeMap::new();
        for row in self.scope.values_at(record.id, version)? {
            let Some(field) = definition.field_at(row.index) else {
                warn!(
                    definition = %record.name,
                    id = %record.id,
                    index = %row.index,
                    "skipping history row of unknown field"
                );
                continue;
            };
            let value = field.field_type().parse_value(&row.value).map_err(|err| {
                StorageError::CorruptValue {
                    id: record.id,
                    index: row.index.get(),
                    reason: err.to_string(),
                }
            })?;
            values.insert(row.index, value);
        }

        let mut worksheet = Worksheet::hydrate(definition, record.id, version, values);
        debug!(definition = %record.name, id = %record.id, version, "loaded worksheet");

        if self.options.link_references && depth < self.options.max_link_depth {
            self.link(&mut worksheet, linker, depth)?;
        }
        Ok(worksheet)
    }

    /// Load the worksheets `worksheet` references and attach them
    fn link(&mut self, worksheet: &mut Worksheet, linker: &mut Linker, depth: usize) -> StorageResult<()> {
        let references: Vec<(String, Uuid)> = worksheet
            .references()
            .into_iter()
            .map(|(name, id)| (name.to_string(), id))
            .collect();

        for (name, id) in references {
            if let Some(loaded) = linker.loaded.get(&id) {
                worksheet.attach(Arc::clone(loaded));
                continue;
            }
            if !linker.visiting.insert(id) {
                continue;
            }

            let Some(record) = self
                .scope
                .find_worksheet(id)?
                .filter(|record| record.name == name)
            else {
                warn!(
                    definition = %name,
                    %id,
                    referrer = %worksheet.id(),
                    "referenced worksheet not stored, leaving it unlinked"
                );
                linker.visiting.remove(&id);
                continue;
            };
            let version = record.version;
            let target = Arc::new(self.hydrate(&record, version, linker, depth + 1)?);
            linker.visiting.remove(&id);
            linker.loaded.insert(id, Arc::clone(&target));
            worksheet.attach(target);
        }
        Ok(())
    }
}

/// Per-load memo of linked worksheets
#[derive(Default)]
struct Linker {
    loaded: HashMap<Uuid, Arc<Worksheet>>,
    /// Worksheets currently being loaded further up the reference chain
    visiting: HashSet<Uuid>,
}
