//! Worksheet definitions: named, typed, indexed fields

use crate::error::{DefinitionError, DefinitionResult};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use worksheets_core::{FieldIndex, FieldType, Value};
use worksheets_formula::{DependencyGraph, Expr};

/// A field of a definition
#[derive(Debug, Clone)]
pub struct Field {
    index: FieldIndex,
    name: String,
    field_type: FieldType,
    /// Name of the owning definition, filled in by [`Definition::add_field`]
    definition: String,
    computed_by: Option<Expr>,
    constrained_by: Option<Expr>,
    default: Option<Value>,
    /// Fields whose formula or constraint reads this field
    dependents: Vec<FieldIndex>,
}

impl Field {
    /// Create a plain settable field
    pub fn new<S: Into<String>>(index: i32, name: S, field_type: FieldType) -> Self {
        Self {
            index: FieldIndex::new(index),
            name: name.into(),
            field_type,
            definition: String::new(),
            computed_by: None,
            constrained_by: None,
            default: None,
            dependents: Vec::new(),
        }
    }

    /// Make the field computed by `expr`.
    ///
    /// `Expr::External` leaves the field settable by the caller.
    pub fn computed_by(mut self, expr: Expr) -> Self {
        self.computed_by = if expr.is_external() { None } else { Some(expr) };
        self
    }

    /// Attach a boolean constraint
    pub fn constrained_by(mut self, expr: Expr) -> Self {
        self.constrained_by = Some(expr);
        self
    }

    /// Initial value for new worksheets
    pub fn with_default<V: Into<Value>>(mut self, value: V) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn index(&self) -> FieldIndex {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    /// Name of the definition this field belongs to
    pub fn definition_name(&self) -> &str {
        &self.definition
    }

    pub fn computed(&self) -> Option<&Expr> {
        self.computed_by.as_ref()
    }

    pub fn constraint(&self) -> Option<&Expr> {
        self.constrained_by.as_ref()
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// Check if the value is produced by a formula
    pub fn is_computed(&self) -> bool {
        self.computed_by.is_some()
    }

    /// Fields whose formula or constraint reads this one, ascending by index
    pub fn dependents(&self) -> &[FieldIndex] {
        &self.dependents
    }

    fn reserved(index: FieldIndex, name: &str, field_type: FieldType, definition: &str) -> Self {
        let mut field = Field::new(index.get(), name, field_type);
        field.definition = definition.to_string();
        field
    }
}

/// A named set of fields
///
/// Every definition carries the built-in `id` and `version` fields. Call
/// [`Definition::add_field`] for the rest, then register the definition with
/// a [`RegistryBuilder`](crate::RegistryBuilder), which validates formulas
/// and computes the recompute order.
#[derive(Debug, Clone)]
pub struct Definition {
    name: String,
    fields: BTreeMap<FieldIndex, Field>,
    by_name: HashMap<String, FieldIndex>,
    graph: DependencyGraph,
    /// Computed fields in recompute order
    recompute_order: Vec<FieldIndex>,
    /// Field → constrained fields whose constraint reads it
    watchers: BTreeMap<FieldIndex, BTreeSet<FieldIndex>>,
}

impl Definition {
    /// Create a definition holding only the built-in fields
    pub fn new<S: Into<String>>(name: S) -> Self {
        let name = name.into();
        let id = Field::reserved(FieldIndex::ID, FieldIndex::ID_NAME, FieldType::Text, &name);
        let version = Field::reserved(
            FieldIndex::VERSION,
            FieldIndex::VERSION_NAME,
            FieldType::Number { scale: 0 },
            &name,
        );

        let mut definition = Self {
            name,
            fields: BTreeMap::new(),
            by_name: HashMap::new(),
            graph: DependencyGraph::new(),
            recompute_order: Vec::new(),
            watchers: BTreeMap::new(),
        };
        for field in [id, version] {
            definition.by_name.insert(field.name.clone(), field.index);
            definition.fields.insert(field.index, field);
        }
        definition
    }

    /// Add a field, checking its index, name and default
    pub fn add_field(&mut self, mut field: Field) -> DefinitionResult<()> {
        let index = field.index.get();
        if index == 0 {
            return Err(DefinitionError::ZeroIndex {
                definition: self.name.clone(),
                field: field.name,
            });
        }
        if field.index.is_reserved() {
            return Err(DefinitionError::ReservedIndex {
                definition: self.name.clone(),
                field: field.name,
                index,
            });
        }
        if self.fields.contains_key(&field.index) {
            return Err(DefinitionError::DuplicateIndex {
                definition: self.name.clone(),
                index,
            });
        }
        if self.by_name.contains_key(&field.name) {
            return Err(DefinitionError::DuplicateName {
                definition: self.name.clone(),
                name: field.name,
            });
        }
        if let Some(default) = field.default.take() {
            let coerced = field.field_type.coerce(default).map_err(|err| {
                DefinitionError::InvalidDefault {
                    definition: self.name.clone(),
                    field: field.name.clone(),
                    reason: err.to_string(),
                }
            })?;
            field.default = Some(coerced);
        }

        field.definition = self.name.clone();
        self.by_name.insert(field.name.clone(), field.index);
        self.fields.insert(field.index, field);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.by_name.get(name).and_then(|index| self.fields.get(index))
    }

    /// Look up a field by index
    pub fn field_at(&self, index: FieldIndex) -> Option<&Field> {
        self.fields.get(&index)
    }

    /// All fields ascending by index, built-in ones first
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.values()
    }

    /// Fields other than `id` and `version`
    pub fn business_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.values().filter(|f| !f.index.is_reserved())
    }

    /// Definition names referenced by field types
    pub fn referenced_definitions(&self) -> impl Iterator<Item = &str> {
        self.fields
            .values()
            .filter_map(|f| f.field_type.referenced_definition())
    }

    /// Build the dependency graph and recompute order.
    ///
    /// Called once at registration, after all fields have been added.
    pub(crate) fn finalize(&mut self) -> DefinitionResult<()> {
        let mut graph = DependencyGraph::new();
        let mut watchers: BTreeMap<FieldIndex, BTreeSet<FieldIndex>> = BTreeMap::new();

        for field in self.fields.values() {
            graph.add_node(field.index);

            if let Some(expr) = &field.computed_by {
                for precedent in self.resolve_reads(field, expr)? {
                    graph.add_dependency(precedent, field.index);
                }
            }
            if let Some(expr) = &field.constrained_by {
                for read in self.resolve_reads(field, expr)? {
                    watchers.entry(read).or_default().insert(field.index);
                }
                watchers.entry(field.index).or_default().insert(field.index);
            }
        }

        let order = graph.topological_order().map_err(|stuck| {
            DefinitionError::CyclicDependency {
                definition: self.name.clone(),
                fields: stuck
                    .iter()
                    .filter_map(|index| self.fields.get(index))
                    .map(|f| f.name.clone())
                    .collect(),
            }
        })?;

        self.recompute_order = order
            .into_iter()
            .filter(|index| self.fields.get(index).is_some_and(Field::is_computed))
            .collect();
        for field in self.fields.values_mut() {
            let mut dependents: BTreeSet<FieldIndex> = graph.get_dependents(field.index).collect();
            if let Some(constrained) = watchers.get(&field.index) {
                dependents.extend(constrained.iter().filter(|&&index| index != field.index));
            }
            field.dependents = dependents.into_iter().collect();
        }
        self.graph = graph;
        self.watchers = watchers;
        Ok(())
    }

    fn resolve_reads(&self, field: &Field, expr: &Expr) -> DefinitionResult<Vec<FieldIndex>> {
        expr.local_fields()
            .into_iter()
            .map(|name| {
                self.by_name
                    .get(name)
                    .copied()
                    .ok_or_else(|| DefinitionError::UnknownSelectorField {
                        definition: self.name.clone(),
                        field: field.name.clone(),
                        selector: name.to_string(),
                    })
            })
            .collect()
    }

    /// Every computed field, in recompute order
    pub(crate) fn computed_fields(&self) -> impl Iterator<Item = &Field> {
        self.recompute_order
            .iter()
            .filter_map(|index| self.fields.get(index))
    }

    /// Computed fields reachable from `changed`, in recompute order
    pub(crate) fn affected_by(&self, changed: FieldIndex) -> Vec<&Field> {
        let reached = self.graph.transitive_dependents(&[changed]);
        self.computed_fields()
            .filter(|f| reached.contains(&f.index))
            .collect()
    }

    /// Constrained fields to re-check after `changed` were written
    pub(crate) fn constraints_watching<'a, I>(&self, changed: I) -> Vec<&Field>
    where
        I: IntoIterator<Item = &'a FieldIndex>,
    {
        let mut constrained = BTreeSet::new();
        for index in changed {
            if let Some(fields) = self.watchers.get(index) {
                constrained.extend(fields.iter().copied());
            }
        }
        constrained
            .iter()
            .filter_map(|index| self.fields.get(index))
            .collect()
    }
}
