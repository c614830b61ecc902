//! Registered definitions and worksheet construction

use crate::definition::Definition;
use crate::error::{DefinitionError, DefinitionResult};
use crate::worksheet::Worksheet;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Collects definitions and validates them as a set
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    definitions: Vec<Definition>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a definition
    pub fn register(mut self, definition: Definition) -> Self {
        self.definitions.push(definition);
        self
    }

    /// Add several definitions
    pub fn register_all<I: IntoIterator<Item = Definition>>(mut self, definitions: I) -> Self {
        self.definitions.extend(definitions);
        self
    }

    /// Validate every definition and freeze the set.
    ///
    /// Fails on duplicate names, reference types naming unregistered
    /// definitions, formulas reading undeclared fields, and cycles among
    /// computed fields.
    pub fn build(self) -> DefinitionResult<Registry> {
        let mut definitions = BTreeMap::new();
        for definition in self.definitions {
            if definitions.contains_key(definition.name()) {
                return Err(DefinitionError::DuplicateDefinition(
                    definition.name().to_string(),
                ));
            }
            definitions.insert(definition.name().to_string(), definition);
        }

        for definition in definitions.values() {
            if let Some(missing) = definition
                .referenced_definitions()
                .find(|name| !definitions.contains_key(*name))
            {
                return Err(DefinitionError::UnknownDefinition(missing.to_string()));
            }
        }

        let mut frozen = HashMap::with_capacity(definitions.len());
        for (name, mut definition) in definitions {
            definition.finalize()?;
            debug!(
                definition = %name,
                fields = definition.fields().count(),
                "registered definition"
            );
            frozen.insert(name, Arc::new(definition));
        }

        Ok(Registry {
            definitions: frozen,
        })
    }
}

/// Immutable set of validated definitions
#[derive(Debug, Clone, Default)]
pub struct Registry {
    definitions: HashMap<String, Arc<Definition>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Parse definition source and build a registry from it
    pub fn from_source(source: &str) -> DefinitionResult<Self> {
        let definitions = crate::parser::parse_definitions(source)?;
        RegistryBuilder::new().register_all(definitions).build()
    }

    /// Look up a definition by name
    pub fn definition(&self, name: &str) -> Option<&Arc<Definition>> {
        self.definitions.get(name)
    }

    /// Look up a definition, failing if it is not registered
    pub fn require(&self, name: &str) -> DefinitionResult<&Arc<Definition>> {
        self.definition(name)
            .ok_or_else(|| DefinitionError::UnknownDefinition(name.to_string()))
    }

    /// Registered definitions sorted by name
    pub fn definitions(&self) -> Vec<&Arc<Definition>> {
        let mut all: Vec<_> = self.definitions.values().collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    /// Create a worksheet with a fresh id at version 1, every field at its
    /// declared default
    pub fn new_worksheet(&self, name: &str) -> DefinitionResult<Worksheet> {
        let definition = Arc::clone(self.require(name)?);
        let worksheet = Worksheet::new(definition);
        debug!(definition = name, id = %worksheet.id(), "created worksheet");
        Ok(worksheet)
    }
}
