//! Facts and their runtime type tags.
//!
//! A [`Fact`] is an immutable, shared object inserted into working memory.
//! Its [`FactType`] is an explicit tag captured at construction time, so
//! type lookups never need to inspect the object itself.

use std::any::{Any, TypeId};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Runtime type tag of a fact.
///
/// Equality, hashing and ordering use the [`TypeId`] only; the name is
/// carried for diagnostics.
#[derive(Copy, Clone)]
pub struct FactType {
    id: TypeId,
    name: &'static str,
}

impl FactType {
    /// Returns the tag for `T`.
    #[must_use]
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Returns the underlying type id.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// Returns the fully qualified type name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the type name without its module path.
    #[must_use]
    pub fn short_name(&self) -> &'static str {
        let base = self.name.split('<').next().unwrap_or(self.name);
        match base.rfind("::") {
            Some(pos) => &self.name[pos + 2..],
            None => self.name,
        }
    }
}

impl PartialEq for FactType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for FactType {}

impl Hash for FactType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for FactType {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FactType {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Debug for FactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FactType({})", self.name)
    }
}

impl fmt::Display for FactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A fact object, shared and immutable.
///
/// Clone is O(1).
#[derive(Clone)]
pub struct Fact {
    value: Arc<dyn Any + Send + Sync>,
    fact_type: FactType,
}

impl Fact {
    /// Wraps a value as a fact.
    #[must_use]
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            fact_type: FactType::of::<T>(),
        }
    }

    /// Wraps an already shared value as a fact.
    #[must_use]
    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            value,
            fact_type: FactType::of::<T>(),
        }
    }

    /// Returns the type tag.
    #[must_use]
    pub fn fact_type(&self) -> FactType {
        self.fact_type
    }

    /// Returns true if the fact holds a `T`.
    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        self.fact_type.type_id() == TypeId::of::<T>()
    }

    /// Borrows the fact as a `T`, if it is one.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Returns true if both facts are the same object.
    #[must_use]
    pub fn ptr_eq(&self, other: &Fact) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

impl fmt::Debug for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fact({})", self.fact_type.short_name())
    }
}
