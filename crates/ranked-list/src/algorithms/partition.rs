//! Partition Key Resolver
//!
//! Turns a partition definition plus a concrete record into a
//! [`PartitionFilter`]. The configuration-time part of a definition
//! (`Equality` and `Predicate` scopes) is compiled once into a shared
//! [`StaticScope`]; the record-dependent part (`NamedGroup` and
//! `Relationship` scopes) is bound per record.

use crate::domain::entities::RankedRecord;
use crate::domain::errors::ConfigError;
use crate::domain::value_objects::FieldValue;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Caller-supplied membership test for `Predicate` scopes.
pub type ScopePredicate = Arc<dyn Fn(&RankedRecord) -> bool + Send + Sync>;

/// One entry of a partition definition.
#[derive(Clone)]
pub enum ScopeSpec {
    /// Record takes part only if `column == value`.
    Equality { column: String, value: FieldValue },
    /// Records sharing a value of `column` form a group; groups also lead the
    /// sort key of collection-wide queries.
    NamedGroup { column: String },
    /// Foreign-key style grouping; `Null` means "ungrouped". Reads `column`,
    /// falling back to `column_id`.
    Relationship { column: String },
    /// Arbitrary filter evaluated on every candidate record.
    Predicate { name: String, predicate: ScopePredicate },
}

impl ScopeSpec {
    pub fn equality(column: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        ScopeSpec::Equality {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn named_group(column: impl Into<String>) -> Self {
        ScopeSpec::NamedGroup {
            column: column.into(),
        }
    }

    pub fn relationship(column: impl Into<String>) -> Self {
        ScopeSpec::Relationship {
            column: column.into(),
        }
    }

    pub fn predicate<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&RankedRecord) -> bool + Send + Sync + 'static,
    {
        ScopeSpec::Predicate {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    fn column(&self) -> Option<&str> {
        match self {
            ScopeSpec::Equality { column, .. }
            | ScopeSpec::NamedGroup { column }
            | ScopeSpec::Relationship { column } => Some(column),
            ScopeSpec::Predicate { .. } => None,
        }
    }
}

impl fmt::Debug for ScopeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeSpec::Equality { column, value } => f
                .debug_struct("Equality")
                .field("column", column)
                .field("value", value)
                .finish(),
            ScopeSpec::NamedGroup { column } => {
                f.debug_struct("NamedGroup").field("column", column).finish()
            }
            ScopeSpec::Relationship { column } => {
                f.debug_struct("Relationship").field("column", column).finish()
            }
            ScopeSpec::Predicate { name, .. } => {
                f.debug_struct("Predicate").field("name", name).finish_non_exhaustive()
            }
        }
    }
}

/// Ordered list of scope specifiers for one ranked collection.
#[derive(Clone, Debug, Default)]
pub struct PartitionDefinition {
    scopes: Vec<ScopeSpec>,
}

impl PartitionDefinition {
    /// A definition with no scopes: the whole collection is one partition.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, scope: ScopeSpec) -> Self {
        self.scopes.push(scope);
        self
    }

    pub fn scopes(&self) -> &[ScopeSpec] {
        &self.scopes
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for column in self.scopes.iter().filter_map(ScopeSpec::column) {
            if !seen.insert(column) {
                return Err(ConfigError::DuplicateScopeColumn(column.to_string()));
            }
        }
        Ok(())
    }
}

/// Configuration-time filter fragments, shared by every resolved filter.
struct StaticScope {
    equalities: Vec<(String, FieldValue)>,
    predicates: Vec<(String, ScopePredicate)>,
}

impl StaticScope {
    fn admits(&self, record: &RankedRecord) -> bool {
        self.equalities
            .iter()
            .all(|(column, value)| read_column(record, column) == *value)
            && self.predicates.iter().all(|(_, predicate)| predicate(record))
    }
}

impl fmt::Debug for StaticScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let predicates: Vec<&str> = self.predicates.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("StaticScope")
            .field("equalities", &self.equalities)
            .field("predicates", &predicates)
            .finish()
    }
}

/// Record-dependent scope, bound when a filter is resolved.
#[derive(Clone, Debug)]
enum DynamicScope {
    Group { column: String },
    Relationship { column: String, fallback: String },
}

impl DynamicScope {
    fn column(&self) -> &str {
        match self {
            DynamicScope::Group { column } | DynamicScope::Relationship { column, .. } => column,
        }
    }

    fn read(&self, record: &RankedRecord) -> FieldValue {
        match self {
            DynamicScope::Group { column } => read_column(record, column),
            DynamicScope::Relationship { column, fallback } => {
                populated(record.scope_value(column))
                    .or_else(|| populated(record.scope_value(fallback)))
                    .cloned()
                    .unwrap_or(FieldValue::Null)
            }
        }
    }

    fn read_values(&self, values: &BTreeMap<String, FieldValue>) -> FieldValue {
        let found = match self {
            DynamicScope::Group { column } => values.get(column),
            DynamicScope::Relationship { column, fallback } => {
                populated(values.get(column)).or_else(|| populated(values.get(fallback)))
            }
        };
        found.cloned().unwrap_or(FieldValue::Null)
    }

    fn sorts(&self) -> bool {
        matches!(self, DynamicScope::Group { .. })
    }
}

/// An explicit `Null` reads like a missing column.
fn populated(value: Option<&FieldValue>) -> Option<&FieldValue> {
    value.filter(|value| !matches!(value, FieldValue::Null))
}

fn read_column(record: &RankedRecord, column: &str) -> FieldValue {
    record.scope_value(column).cloned().unwrap_or(FieldValue::Null)
}

/// Identity of one partition: the bound value of every dynamic scope.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionKey(Vec<(String, FieldValue)>);

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("*");
        }
        for (i, (column, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{column}={value:?}")?;
        }
        Ok(())
    }
}

/// Compiled partition definition.
#[derive(Clone, Debug)]
pub struct PartitionResolver {
    static_scope: Arc<StaticScope>,
    dynamic: Arc<[DynamicScope]>,
}

impl PartitionResolver {
    pub fn new(definition: &PartitionDefinition) -> Result<Self, ConfigError> {
        definition.validate()?;

        let mut equalities = Vec::new();
        let mut predicates = Vec::new();
        let mut dynamic = Vec::new();

        for scope in definition.scopes() {
            match scope {
                ScopeSpec::Equality { column, value } => {
                    equalities.push((column.clone(), value.clone()));
                }
                ScopeSpec::Predicate { name, predicate } => {
                    predicates.push((name.clone(), Arc::clone(predicate)));
                }
                ScopeSpec::NamedGroup { column } => {
                    dynamic.push(DynamicScope::Group {
                        column: column.clone(),
                    });
                }
                ScopeSpec::Relationship { column } => {
                    let fallback = format!("{column}_id");
                    dynamic.push(DynamicScope::Relationship {
                        column: column.clone(),
                        fallback,
                    });
                }
            }
        }

        Ok(Self {
            static_scope: Arc::new(StaticScope {
                equalities,
                predicates,
            }),
            dynamic: dynamic.into(),
        })
    }

    /// Partition that `record` competes in.
    pub fn resolve(&self, record: &RankedRecord) -> PartitionFilter {
        let bindings = self.dynamic.iter().map(|scope| scope.read(record)).collect();
        self.bound(bindings)
    }

    /// Partition identified by explicit scope values; missing columns read as `Null`.
    pub fn resolve_values(&self, values: &BTreeMap<String, FieldValue>) -> PartitionFilter {
        let bindings = self
            .dynamic
            .iter()
            .map(|scope| scope.read_values(values))
            .collect();
        self.bound(bindings)
    }

    /// Every record admitted by the static scopes, across all partitions.
    pub fn collection(&self) -> PartitionFilter {
        PartitionFilter {
            static_scope: Arc::clone(&self.static_scope),
            dynamic: Arc::clone(&self.dynamic),
            bindings: None,
        }
    }

    /// Key of the partition `record` belongs to.
    pub fn key_of(&self, record: &RankedRecord) -> PartitionKey {
        PartitionKey(
            self.dynamic
                .iter()
                .map(|scope| (scope.column().to_string(), scope.read(record)))
                .collect(),
        )
    }

    fn bound(&self, bindings: Vec<FieldValue>) -> PartitionFilter {
        PartitionFilter {
            static_scope: Arc::clone(&self.static_scope),
            dynamic: Arc::clone(&self.dynamic),
            bindings: Some(bindings),
        }
    }
}

/// Reusable membership test and sort prefix for one partition, or for the
/// whole collection when unbound.
#[derive(Clone, Debug)]
pub struct PartitionFilter {
    static_scope: Arc<StaticScope>,
    dynamic: Arc<[DynamicScope]>,
    bindings: Option<Vec<FieldValue>>,
}

impl PartitionFilter {
    pub fn matches(&self, record: &RankedRecord) -> bool {
        if !self.static_scope.admits(record) {
            return false;
        }
        match &self.bindings {
            None => true,
            Some(bindings) => self
                .dynamic
                .iter()
                .zip(bindings)
                .all(|(scope, bound)| scope.read(record) == *bound),
        }
    }

    /// True for a filter spanning every partition of the collection.
    pub fn is_collection_wide(&self) -> bool {
        self.bindings.is_none() && !self.dynamic.is_empty()
    }

    /// `NamedGroup` values of `record`, in declaration order. They lead the
    /// ordering ahead of rank.
    pub fn sort_prefix(&self, record: &RankedRecord) -> Vec<FieldValue> {
        self.dynamic
            .iter()
            .filter(|scope| scope.sorts())
            .map(|scope| scope.read(record))
            .collect()
    }

    /// Key of the bound partition; empty for a collection-wide filter.
    pub fn key(&self) -> PartitionKey {
        match &self.bindings {
            None => PartitionKey::default(),
            Some(bindings) => PartitionKey(
                self.dynamic
                    .iter()
                    .zip(bindings)
                    .map(|(scope, value)| (scope.column().to_string(), value.clone()))
                    .collect(),
            ),
        }
    }
}
