//! Worksheet instances
//!
//! A worksheet holds one value per field of its definition. Every mutation
//! runs as a small transaction: the written field, the computed fields that
//! depend on it and the affected constraints either all succeed or the
//! worksheet is restored to its prior state.

use crate::definition::{Definition, Field};
use crate::error::{MutationError, MutationResult};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, trace};
use uuid::Uuid;
use worksheets_core::{FieldIndex, FieldType, Value};
use worksheets_formula::{evaluate, EvaluationContext, Expr};

/// A worksheet: an identified, versioned record of a definition
#[derive(Debug, Clone)]
pub struct Worksheet {
    definition: Arc<Definition>,
    id: Uuid,
    version: i32,
    values: BTreeMap<FieldIndex, Value>,
    /// Fields written since the last save
    dirty: BTreeSet<FieldIndex>,
    /// Snapshots of referenced worksheets, used to resolve selectors
    linked: HashMap<Uuid, Arc<Worksheet>>,
}

impl Worksheet {
    /// Fresh worksheet at version 1 with defaults applied.
    ///
    /// Computed fields are evaluated once over the defaults; a field whose
    /// formula fails here (e.g. through a reference that is not set yet)
    /// stays Undefined until a field it reads is written.
    pub(crate) fn new(definition: Arc<Definition>) -> Self {
        let id = Uuid::new_v4();
        let values = definition
            .fields()
            .map(|f| (f.index(), f.default_value().cloned().unwrap_or_default()))
            .collect();

        let mut worksheet = Self {
            definition,
            id,
            version: 1,
            values,
            dirty: BTreeSet::new(),
            linked: HashMap::new(),
        };
        worksheet.stamp();
        worksheet.initialize();
        worksheet
    }

    fn initialize(&mut self) {
        let definition = Arc::clone(&self.definition);
        for field in definition.computed_fields() {
            let Some(expr) = field.computed() else {
                continue;
            };
            match self.compute(field, expr) {
                Ok(value) => {
                    self.values.insert(field.index(), value);
                }
                Err(err) => {
                    debug!(field = field.name(), error = %err, "computed field left undefined");
                }
            }
        }
    }

    /// Rebuild a worksheet from stored values; missing fields are Undefined
    pub(crate) fn hydrate(
        definition: Arc<Definition>,
        id: Uuid,
        version: i32,
        mut values: BTreeMap<FieldIndex, Value>,
    ) -> Self {
        for field in definition.fields() {
            values.entry(field.index()).or_default();
        }
        let mut worksheet = Self {
            definition,
            id,
            version,
            values,
            dirty: BTreeSet::new(),
            linked: HashMap::new(),
        };
        worksheet.stamp();
        worksheet
    }

    fn stamp(&mut self) {
        self.values
            .insert(FieldIndex::ID, Value::text(self.id.to_string()));
        self.values
            .insert(FieldIndex::VERSION, Value::from(self.version));
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn definition(&self) -> &Arc<Definition> {
        &self.definition
    }

    pub fn definition_name(&self) -> &str {
        self.definition.name()
    }

    /// Value of the named field
    pub fn get(&self, name: &str) -> MutationResult<&Value> {
        let field = self
            .definition
            .field(name)
            .ok_or_else(|| MutationError::UnknownField(name.to_string()))?;
        Ok(self.value_at(field.index()))
    }

    /// Value at a field index; Undefined for indices outside the definition
    pub fn value_at(&self, index: FieldIndex) -> &Value {
        static UNDEFINED: Value = Value::Undefined;
        self.values.get(&index).unwrap_or(&UNDEFINED)
    }

    /// Every field with its value, ascending by index
    pub fn values(&self) -> impl Iterator<Item = (&Field, &Value)> {
        self.definition
            .fields()
            .map(move |field| (field, self.value_at(field.index())))
    }

    /// Fields other than `id` and `version` with their values
    pub fn business_values(&self) -> impl Iterator<Item = (&Field, &Value)> {
        self.values().filter(|(field, _)| !field.index().is_reserved())
    }

    /// Fields written since the last save
    pub fn dirty_fields(&self) -> &BTreeSet<FieldIndex> {
        &self.dirty
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Linked snapshot of a referenced worksheet
    pub fn linked(&self, id: Uuid) -> Option<&Worksheet> {
        self.linked.get(&id).map(Arc::as_ref)
    }

    /// Set a settable field.
    ///
    /// The value is checked against the field type, dependent computed
    /// fields are recomputed and affected constraints re-checked. On error
    /// nothing changes.
    pub fn set<V: Into<Value>>(&mut self, name: &str, value: V) -> MutationResult<()> {
        let definition = Arc::clone(&self.definition);
        let field = settable(&definition, name)?;
        let value = field
            .field_type()
            .coerce(value.into())
            .map_err(|err| mismatch(field, err))?;
        self.mutate(&definition, field.index(), value, false)
    }

    /// Append to a slice field
    pub fn append<V: Into<Value>>(&mut self, name: &str, value: V) -> MutationResult<()> {
        let definition = Arc::clone(&self.definition);
        let field = settable(&definition, name)?;
        let element = slice_element(field)?;
        let item = element
            .coerce(value.into())
            .map_err(|err| mismatch(field, err))?;

        let mut items = self.items(field.index());
        items.push(item);
        self.mutate(&definition, field.index(), Value::Slice(items), false)
    }

    /// Remove the element at `position` from a slice field
    pub fn del(&mut self, name: &str, position: usize) -> MutationResult<()> {
        let definition = Arc::clone(&self.definition);
        let field = settable(&definition, name)?;
        slice_element(field)?;

        let mut items = self.items(field.index());
        if position >= items.len() {
            return Err(MutationError::Index {
                field: field.name().to_string(),
                index: position,
                len: items.len(),
            });
        }
        items.remove(position);
        self.mutate(&definition, field.index(), Value::Slice(items), false)
    }

    /// Point a reference field at `other`.
    ///
    /// A snapshot of `other` is kept so selectors through the field resolve;
    /// later changes to `other` are not seen until it is linked again.
    pub fn link(&mut self, name: &str, other: &Worksheet) -> MutationResult<()> {
        let definition = Arc::clone(&self.definition);
        let field = settable(&definition, name)?;
        check_target(field, field.field_type(), other)?;

        self.with_snapshot(other, |worksheet| {
            worksheet.mutate(&definition, field.index(), Value::Ref(other.id), true)
        })
    }

    /// Append a reference to `other` to a slice-of-reference field
    pub fn append_link(&mut self, name: &str, other: &Worksheet) -> MutationResult<()> {
        let definition = Arc::clone(&self.definition);
        let field = settable(&definition, name)?;
        check_target(field, slice_element(field)?, other)?;

        let mut items = self.items(field.index());
        items.push(Value::Ref(other.id));
        self.with_snapshot(other, |worksheet| {
            worksheet.mutate(&definition, field.index(), Value::Slice(items), true)
        })
    }

    fn with_snapshot<F>(&mut self, other: &Worksheet, apply: F) -> MutationResult<()>
    where
        F: FnOnce(&mut Self) -> MutationResult<()>,
    {
        let previous = self.linked.insert(other.id, Arc::new(other.clone()));
        let result = apply(self);
        if result.is_err() {
            match previous {
                Some(snapshot) => self.linked.insert(other.id, snapshot),
                None => self.linked.remove(&other.id),
            };
        }
        result
    }

    fn items(&self, index: FieldIndex) -> Vec<Value> {
        match self.value_at(index) {
            Value::Slice(items) => items.clone(),
            _ => Vec::new(),
        }
    }

    fn mutate(
        &mut self,
        definition: &Definition,
        index: FieldIndex,
        value: Value,
        relinked: bool,
    ) -> MutationResult<()> {
        let mut journal = Journal::default();
        let result = self.cascade(definition, index, value, relinked, &mut journal);
        if result.is_err() {
            journal.rollback(self);
        }
        result
    }

    fn cascade(
        &mut self,
        definition: &Definition,
        index: FieldIndex,
        value: Value,
        relinked: bool,
        journal: &mut Journal,
    ) -> MutationResult<()> {
        // A fresh snapshot behind an unchanged reference still needs a recompute
        if !self.write(index, value, journal) && !relinked {
            return Ok(());
        }

        let mut changed = vec![index];
        for field in definition.affected_by(index) {
            if let Some(expr) = field.computed() {
                let value = self.compute(field, expr)?;
                trace!(field = field.name(), %value, "recomputed");
                if self.write(field.index(), value, journal) {
                    changed.push(field.index());
                }
            }
        }

        for field in definition.constraints_watching(&changed) {
            self.check(field)?;
        }

        trace!(worksheet = %self.id, field = %index, changed = changed.len(), "applied mutation");
        Ok(())
    }

    /// Store a value, recording the prior state; false if nothing changed
    fn write(&mut self, index: FieldIndex, value: Value, journal: &mut Journal) -> bool {
        if self.values.get(&index) == Some(&value) {
            return false;
        }
        let previous = self.values.insert(index, value).unwrap_or_default();
        journal.record(index, previous, self.dirty.contains(&index));
        self.dirty.insert(index);
        true
    }

    fn compute(&self, field: &Field, expr: &Expr) -> MutationResult<Value> {
        let raw = evaluate(expr, self)?;
        field
            .field_type()
            .coerce(raw)
            .map_err(|err| mismatch(field, err))
    }

    fn check(&self, field: &Field) -> MutationResult<()> {
        let Some(expr) = field.constraint() else {
            return Ok(());
        };
        match evaluate(expr, self)? {
            Value::Bool(true) | Value::Undefined => Ok(()),
            Value::Bool(false) => Err(MutationError::ConstraintViolation(
                field.name().to_string(),
            )),
            other => Err(MutationError::TypeMismatch {
                field: field.name().to_string(),
                reason: format!("constraint produced {}, expected bool", other.kind()),
            }),
        }
    }

    /// Ids of referenced worksheets together with their definition names
    pub(crate) fn references(&self) -> Vec<(&str, Uuid)> {
        let mut out = Vec::new();
        for (field, value) in self.values() {
            let Some(target) = field.field_type().referenced_definition() else {
                continue;
            };
            match value {
                Value::Ref(id) => out.push((target, *id)),
                Value::Slice(items) => {
                    out.extend(items.iter().filter_map(Value::as_ref_id).map(|id| (target, id)))
                }
                _ => {}
            }
        }
        out
    }

    pub(crate) fn attach(&mut self, other: Arc<Worksheet>) {
        self.linked.insert(other.id, other);
    }

    /// Advance to a saved version and forget the dirty set
    pub(crate) fn mark_saved(&mut self, version: i32) {
        self.version = version;
        self.values
            .insert(FieldIndex::VERSION, Value::from(version));
        self.dirty.clear();
    }
}

impl EvaluationContext for Worksheet {
    fn field_value(&self, name: &str) -> Option<&Value> {
        let field = self.definition.field(name)?;
        self.values.get(&field.index())
    }

    fn resolve(&self, id: Uuid) -> Option<&dyn EvaluationContext> {
        self.linked
            .get(&id)
            .map(|worksheet| worksheet.as_ref() as &dyn EvaluationContext)
    }
}

/// Prior values of fields written during one mutation
#[derive(Debug, Default)]
struct Journal {
    entries: Vec<(FieldIndex, Value, bool)>,
}

impl Journal {
    fn record(&mut self, index: FieldIndex, previous: Value, was_dirty: bool) {
        self.entries.push((index, previous, was_dirty));
    }

    fn rollback(self, worksheet: &mut Worksheet) {
        for (index, previous, was_dirty) in self.entries.into_iter().rev() {
            worksheet.values.insert(index, previous);
            if !was_dirty {
                worksheet.dirty.remove(&index);
            }
        }
    }
}

fn settable<'d>(definition: &'d Definition, name: &str) -> MutationResult<&'d Field> {
    let field = definition
        .field(name)
        .ok_or_else(|| MutationError::UnknownField(name.to_string()))?;
    if field.index().is_reserved() {
        return Err(MutationError::ReservedField(name.to_string()));
    }
    if field.is_computed() {
        return Err(MutationError::ComputedField(name.to_string()));
    }
    Ok(field)
}

fn slice_element(field: &Field) -> MutationResult<&FieldType> {
    field
        .field_type()
        .element()
        .ok_or_else(|| MutationError::TypeMismatch {
            field: field.name().to_string(),
            reason: format!("{} is not a slice", field.field_type()),
        })
}

fn check_target(field: &Field, expected: &FieldType, other: &Worksheet) -> MutationResult<()> {
    match expected {
        FieldType::Ref(name) if name == other.definition_name() => Ok(()),
        _ => Err(MutationError::TypeMismatch {
            field: field.name().to_string(),
            reason: format!("cannot link {} as {}", other.definition_name(), expected),
        }),
    }
}

fn mismatch(field: &Field, err: worksheets_core::Error) -> MutationError {
    MutationError::TypeMismatch {
        field: field.name().to_string(),
        reason: err.to_string(),
    }
}
