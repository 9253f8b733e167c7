//! Compiled packages and the package store.
//!
//! A [`Package`] is the unit of deployment: a named, versioned bundle of
//! rules, global declarations and type declarations. The [`PackageStore`]
//! keeps every deployed package in one immutable [`PackageSnapshot`], so a
//! reader always sees the rules and globals of the same package version.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use im::OrdMap;
use trellis_foundation::{
    EntryPointId, Error, ErrorKind, Fact, FactType, Result, TypeDeclaration,
};
use trellis_network::{Always, Condition, RuleName};

use crate::session::RuleContext;

// =============================================================================
// Rules
// =============================================================================

/// Action run when a rule fires.
pub trait Consequence: Send + Sync {
    /// Runs the action for one activation.
    ///
    /// # Errors
    /// An error stops the current `fire_all_rules` call and is returned to
    /// its caller.
    fn fire(&self, context: &mut RuleContext<'_>) -> Result<()>;
}

impl<F> Consequence for F
where
    F: Fn(&mut RuleContext<'_>) -> Result<()> + Send + Sync,
{
    fn fire(&self, context: &mut RuleContext<'_>) -> Result<()> {
        self(context)
    }
}

/// A compiled single-pattern rule.
#[derive(Clone)]
pub struct Rule {
    name: String,
    salience: i32,
    entry_point: EntryPointId,
    fact_type: Option<FactType>,
    condition: Arc<dyn Condition>,
    consequence: Option<Arc<dyn Consequence>>,
}

impl Rule {
    /// Creates a rule matching every fact on the default entry point.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            salience: 0,
            entry_point: EntryPointId::default(),
            fact_type: None,
            condition: Arc::new(Always),
            consequence: None,
        }
    }

    /// Sets the priority. Higher salience fires first.
    #[must_use]
    pub fn with_salience(mut self, salience: i32) -> Self {
        self.salience = salience;
        self
    }

    /// Listens on a named entry point instead of the default stream.
    #[must_use]
    pub fn on_entry_point(mut self, entry_point: impl Into<EntryPointId>) -> Self {
        self.entry_point = entry_point.into();
        self
    }

    /// Only considers facts of type `T`.
    #[must_use]
    pub fn of_type<T: Any>(mut self) -> Self {
        self.fact_type = Some(FactType::of::<T>());
        self
    }

    /// Sets the condition from a closure over the untyped fact.
    #[must_use]
    pub fn when<F>(mut self, condition: F) -> Self
    where
        F: Fn(&Fact) -> bool + Send + Sync + 'static,
    {
        self.condition = Arc::new(condition);
        self
    }

    /// Only considers facts of type `T` that satisfy `condition`.
    #[must_use]
    pub fn when_fact<T, F>(mut self, condition: F) -> Self
    where
        T: Any,
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.fact_type = Some(FactType::of::<T>());
        self.condition = Arc::new(move |fact: &Fact| {
            fact.downcast_ref::<T>().is_some_and(|value| condition(value))
        });
        self
    }

    /// Sets the condition.
    #[must_use]
    pub fn with_condition(mut self, condition: Arc<dyn Condition>) -> Self {
        self.condition = condition;
        self
    }

    /// Sets the consequence from a closure.
    #[must_use]
    pub fn then<F>(mut self, consequence: F) -> Self
    where
        F: Fn(&mut RuleContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.consequence = Some(Arc::new(consequence));
        self
    }

    /// Sets the consequence.
    #[must_use]
    pub fn with_consequence(mut self, consequence: Arc<dyn Consequence>) -> Self {
        self.consequence = Some(consequence);
        self
    }

    /// Returns the rule name within its package.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the salience.
    #[must_use]
    pub fn salience(&self) -> i32 {
        self.salience
    }

    /// Returns the entry point the rule listens on.
    #[must_use]
    pub fn entry_point(&self) -> &EntryPointId {
        &self.entry_point
    }

    /// Returns the fact type filter.
    #[must_use]
    pub fn fact_type(&self) -> Option<FactType> {
        self.fact_type
    }

    /// Returns the condition.
    #[must_use]
    pub fn condition(&self) -> &Arc<dyn Condition> {
        &self.condition
    }

    /// Returns the consequence.
    #[must_use]
    pub fn consequence(&self) -> Option<&Arc<dyn Consequence>> {
        self.consequence.as_ref()
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("salience", &self.salience)
            .field("entry_point", &self.entry_point)
            .field("fact_type", &self.fact_type)
            .field("has_consequence", &self.consequence.is_some())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Packages
// =============================================================================

/// A named, versioned bundle of rules, globals and type declarations.
#[derive(Clone, Debug)]
pub struct Package {
    name: String,
    version: u32,
    rules: Vec<Arc<Rule>>,
    globals: BTreeMap<String, FactType>,
    type_declarations: Vec<TypeDeclaration>,
}

impl Package {
    /// Creates an empty package at version 1.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: 1,
            rules: Vec::new(),
            globals: BTreeMap::new(),
            type_declarations: Vec::new(),
        }
    }

    /// Builder method to set the version.
    #[must_use]
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Adds a rule, replacing any rule with the same name.
    #[must_use]
    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.retain(|existing| existing.name != rule.name);
        self.rules.push(Arc::new(rule));
        self
    }

    /// Declares a global of type `T`.
    #[must_use]
    pub fn with_global<T: Any>(mut self, name: impl Into<String>) -> Self {
        self.globals.insert(name.into(), FactType::of::<T>());
        self
    }

    /// Adds a type declaration.
    #[must_use]
    pub fn with_type_declaration(mut self, declaration: TypeDeclaration) -> Self {
        self.type_declarations.push(declaration);
        self
    }

    /// Returns the package name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the version.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Returns the rules in declaration order.
    #[must_use]
    pub fn rules(&self) -> &[Arc<Rule>] {
        &self.rules
    }

    /// Returns a rule by name.
    #[must_use]
    pub fn rule(&self, name: &str) -> Option<&Arc<Rule>> {
        self.rules.iter().find(|rule| rule.name == name)
    }

    /// Returns the number of rules.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Returns the declared globals.
    #[must_use]
    pub fn globals(&self) -> &BTreeMap<String, FactType> {
        &self.globals
    }

    /// Returns the type declarations.
    #[must_use]
    pub fn type_declarations(&self) -> &[TypeDeclaration] {
        &self.type_declarations
    }

    /// Returns the fully qualified name of one of this package's rules.
    #[must_use]
    pub fn qualified(&self, rule: &Rule) -> RuleName {
        RuleName::new(&self.name, &rule.name)
    }
}

// =============================================================================
// Package Store
// =============================================================================

/// Immutable view of every deployed package.
#[derive(Clone, Debug, Default)]
pub struct PackageSnapshot {
    packages: OrdMap<String, Arc<Package>>,
    globals: OrdMap<String, FactType>,
    generation: u64,
}

impl PackageSnapshot {
    /// Returns a package by name.
    #[must_use]
    pub fn package(&self, name: &str) -> Option<Arc<Package>> {
        self.packages.get(name).cloned()
    }

    /// Returns every package, ordered by name.
    pub fn packages(&self) -> impl Iterator<Item = &Arc<Package>> {
        self.packages.values()
    }

    /// Returns the package names in order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.packages.keys().cloned().collect()
    }

    /// Returns the number of packages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Returns true if no package is deployed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Returns the merged global namespace.
    #[must_use]
    pub fn globals(&self) -> &OrdMap<String, FactType> {
        &self.globals
    }

    /// Returns the declared type of a global.
    #[must_use]
    pub fn global(&self, name: &str) -> Option<FactType> {
        self.globals.get(name).copied()
    }

    /// Looks up a rule by its qualified name.
    #[must_use]
    pub fn rule(&self, name: &RuleName) -> Option<Arc<Rule>> {
        self.packages
            .get(name.package())
            .and_then(|package| package.rule(name.rule()).cloned())
    }

    /// Returns the total number of rules.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.packages.values().map(|p| p.rule_count()).sum()
    }

    /// Number of published changes that led to this snapshot.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn next(&self, packages: OrdMap<String, Arc<Package>>) -> Result<Self> {
        let mut globals = OrdMap::new();
        for package in packages.values() {
            for (name, ty) in &package.globals {
                match globals.get(name) {
                    Some(existing) if existing != ty => {
                        return Err(Error::new(ErrorKind::ConflictingGlobal(format!(
                            "{name} is declared as {existing} and {ty}"
                        ))));
                    }
                    Some(_) => {}
                    None => {
                        globals.insert(name.clone(), *ty);
                    }
                }
            }
        }
        Ok(Self {
            packages,
            globals,
            generation: self.generation + 1,
        })
    }
}

/// Copy-on-replace store of deployed packages.
#[derive(Debug, Default)]
pub struct PackageStore {
    current: ArcSwap<PackageSnapshot>,
}

impl PackageStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current snapshot.
    #[must_use]
    pub fn load(&self) -> Arc<PackageSnapshot> {
        self.current.load_full()
    }

    /// Builds the snapshot that adds `package`, replacing any package with
    /// the same name.
    ///
    /// # Errors
    /// Returns [`ErrorKind::ConflictingGlobal`] if the merged globals would
    /// declare one name with two types.
    pub fn stage_add(&self, package: Arc<Package>) -> Result<PackageSnapshot> {
        let current = self.current.load();
        let packages = current.packages.update(package.name.clone(), package);
        current.next(packages)
    }

    /// Builds the snapshot without the named package.
    ///
    /// # Errors
    /// Returns [`ErrorKind::UnknownPackage`] if no package has that name.
    pub fn stage_remove(&self, name: &str) -> Result<PackageSnapshot> {
        let current = self.current.load();
        if !current.packages.contains_key(name) {
            return Err(Error::new(ErrorKind::UnknownPackage(name.to_string())));
        }
        current.next(current.packages.without(name))
    }

    /// Replaces the current snapshot.
    pub fn publish(&self, snapshot: PackageSnapshot) {
        self.current.store(Arc::new(snapshot));
    }
}
