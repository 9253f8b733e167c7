//! Registry of type declarations.
//!
//! Lookups load the current table without locking. Updates build a new
//! table off to the side ([`TypeRegistry::stage`]) and swap it in with
//! [`TypeRegistry::publish`] while the structural write lock is held.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use trellis_foundation::{Error, ErrorKind, FactType, Result, TypeDeclaration};

/// Table of type declarations, keyed by fact type.
pub type TypeTable = HashMap<FactType, Arc<TypeDeclaration>>;

/// Copy-on-replace registry of type declarations.
#[derive(Debug)]
pub struct TypeRegistry {
    table: ArcSwap<TypeTable>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Returns the declaration for a type.
    #[must_use]
    pub fn declaration(&self, fact_type: &FactType) -> Option<Arc<TypeDeclaration>> {
        self.table.load().get(fact_type).cloned()
    }

    /// Returns every declaration, ordered by type name.
    #[must_use]
    pub fn declarations(&self) -> Vec<Arc<TypeDeclaration>> {
        let mut all: Vec<_> = self.table.load().values().cloned().collect();
        all.sort_by_key(|decl| decl.fact_type.name());
        all
    }

    /// Returns true if the type is declared as an event. Undeclared types
    /// are plain facts.
    #[must_use]
    pub fn is_event(&self, fact_type: &FactType) -> bool {
        self.table
            .load()
            .get(fact_type)
            .is_some_and(|decl| decl.is_event())
    }

    /// Returns true if the type is declared.
    #[must_use]
    pub fn contains(&self, fact_type: &FactType) -> bool {
        self.table.load().contains_key(fact_type)
    }

    /// Returns the number of declarations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.load().len()
    }

    /// Returns true if nothing is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.load().is_empty()
    }

    /// Builds the table that would result from adding `declarations`.
    ///
    /// Re-declaring a type identically is accepted.
    ///
    /// # Errors
    /// Returns [`ErrorKind::ConflictingTypeDeclaration`] if a type is
    /// declared differently, either in the batch or against the registry.
    pub fn stage<'a>(
        &self,
        declarations: impl IntoIterator<Item = &'a TypeDeclaration>,
    ) -> Result<TypeTable> {
        let mut table = TypeTable::clone(&self.table.load());
        for declaration in declarations {
            match table.get(&declaration.fact_type) {
                Some(existing) if **existing == *declaration => {}
                Some(_) => {
                    return Err(Error::new(ErrorKind::ConflictingTypeDeclaration(
                        declaration.fact_type.name().to_string(),
                    )));
                }
                None => {
                    table.insert(declaration.fact_type, Arc::new(declaration.clone()));
                }
            }
        }
        Ok(table)
    }

    /// Replaces the table.
    pub fn publish(&self, table: TypeTable) {
        self.table.store(Arc::new(table));
    }
}
