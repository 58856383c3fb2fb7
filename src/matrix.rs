use std::collections::BTreeSet;

use indexmap::IndexMap;

/// `(uid, rid) -> operations`, in first-insertion order.
///
/// [`grant`](Self::grant) replaces whatever an earlier rule stored for the
/// pair; it never unions. Replacing an entry keeps its original position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationMatrix {
    entries: IndexMap<(String, String), BTreeSet<String>>,
}

impl AuthorizationMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&mut self, uid: &str, rid: &str, operations: BTreeSet<String>) {
        self.entries.insert((uid.to_string(), rid.to_string()), operations);
    }

    /// Adds a single operation to the pair's set, creating the entry if needed.
    pub fn record(&mut self, uid: &str, rid: &str, operation: &str) {
        self.entries
            .entry((uid.to_string(), rid.to_string()))
            .or_default()
            .insert(operation.to_string());
    }

    pub fn get(&self, uid: &str, rid: &str) -> Option<&BTreeSet<String>> {
        self.entries.get(&(uid.to_string(), rid.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &BTreeSet<String>)> {
        self.entries
            .iter()
            .map(|((uid, rid), ops)| (uid.as_str(), rid.as_str(), ops))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
