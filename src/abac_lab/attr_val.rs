use std::collections::{BTreeSet, HashMap};

use indexmap::IndexMap;

use crate::abac_lab::condition::{CrossCondition, ValueCondition};

/// One `userAttrib(...)` or `resourceAttrib(...)` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRecord {
    pub id: String,
    pub attributes: HashMap<String, String>,
}

impl AttributeRecord {
    pub fn new(id: impl Into<String>) -> Self {
        AttributeRecord {
            id: id.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Records of one entity class, keyed by identifier in declaration order.
///
/// Re-declaring an identifier replaces the record but keeps its original
/// position, so serialized id lists stay stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityStore {
    records: IndexMap<String, AttributeRecord>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the replaced record, if the identifier was already present.
    pub fn insert(&mut self, record: AttributeRecord) -> Option<AttributeRecord> {
        self.records.insert(record.id.clone(), record)
    }

    pub fn get(&self, id: &str) -> Option<&AttributeRecord> {
        self.records.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttributeRecord> {
        self.records.values()
    }

    pub fn ids(&self) -> Vec<String> {
        self.records.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub name: String,
    pub user_conditions: Vec<ValueCondition>,
    pub resource_conditions: Vec<ValueCondition>,
    pub operations: BTreeSet<String>,
    pub cross_conditions: Vec<CrossCondition>,
    /// Set when a clause could not be classified under the fail-closed
    /// policy. Such a rule never grants anything.
    pub never_matches: bool,
}

impl Rule {
    pub fn new(name: impl Into<String>) -> Self {
        Rule {
            name: name.into(),
            user_conditions: Vec::new(),
            resource_conditions: Vec::new(),
            operations: BTreeSet::new(),
            cross_conditions: Vec::new(),
            never_matches: false,
        }
    }
}

/// Everything read from a policy file: both entity stores and the rules in
/// file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Policy {
    pub users: EntityStore,
    pub resources: EntityStore,
    pub rules: Vec<Rule>,
}
