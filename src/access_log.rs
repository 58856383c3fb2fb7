//! Observed-access extraction from access logs.
//!
//! A log line may hold any number of `<timestamp,user,resource,operation>`
//! records; everything around them is ignored. A summary can be laid over
//! a compiled snapshot so each observed pair shows what it was authorized
//! for next to what it actually did.

use std::path::Path;
use std::sync::LazyLock;

use indexmap::{IndexMap, IndexSet};
use regex::Regex;
use serde::Serialize;
use tracing::warn;

use crate::error::{AbacError, Result};
use crate::matrix::AuthorizationMatrix;
use crate::snapshot::Snapshot;

static ENTRY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(\d+),([^,]+),([^,]+),([^>]+)>").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: u64,
    pub user: String,
    pub resource: String,
    pub operation: String,
}

pub fn extract_entries(text: &str) -> Vec<LogEntry> {
    let mut entries = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        for caps in ENTRY_RE.captures_iter(line) {
            let Ok(timestamp) = caps[1].parse::<u64>() else {
                warn!(line = line_no + 1, timestamp = &caps[1], "timestamp out of range; skipping entry");
                continue;
            };
            entries.push(LogEntry {
                timestamp,
                user: caps[2].to_string(),
                resource: caps[3].to_string(),
                operation: caps[4].to_string(),
            });
        }
    }
    entries
}

pub fn extract_file(path: &Path) -> Result<Vec<LogEntry>> {
    let text = std::fs::read_to_string(path).map_err(|source| AbacError::InputUnavailable {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(extract_entries(&text))
}

/// Users, resources and operations actually seen in a log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSummary {
    pub users: IndexSet<String>,
    pub resources: IndexSet<String>,
    /// Union of observed operations per pair.
    pub matrix: AuthorizationMatrix,
    /// Occurrences per `(user, resource, operation)`.
    pub counts: IndexMap<(String, String, String), usize>,
}

impl LogSummary {
    pub fn count(&self, user: &str, resource: &str, operation: &str) -> usize {
        self.counts
            .get(&(user.to_string(), resource.to_string(), operation.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Snapshot of the observed pairs. With `authorized`, each pair holds its
    /// authorized operations together with the observed ones.
    pub fn to_snapshot(&self, authorized: Option<&AuthorizationMatrix>) -> Snapshot {
        let mut matrix = AuthorizationMatrix::new();
        for (uid, rid, observed) in self.matrix.iter() {
            let mut ops = authorized
                .and_then(|auth| auth.get(uid, rid))
                .cloned()
                .unwrap_or_default();
            ops.extend(observed.iter().cloned());
            matrix.grant(uid, rid, ops);
        }
        Snapshot {
            users: self.users.iter().cloned().collect(),
            resources: self.resources.iter().cloned().collect(),
            matrix,
        }
    }

    /// One row per observed `(user, resource, operation)`, in first-seen order.
    pub fn operation_counts(&self, authorized: Option<&AuthorizationMatrix>) -> Vec<OperationCount> {
        self.counts
            .iter()
            .map(|((user, resource, operation), &count)| OperationCount {
                user: user.clone(),
                resource: resource.clone(),
                operation: operation.clone(),
                count,
                authorized: authorized
                    .map(|auth| auth.get(user, resource).is_some_and(|ops| ops.contains(operation))),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationCount {
    pub user: String,
    pub resource: String,
    pub operation: String,
    pub count: usize,
    /// Unset when no authorization snapshot was given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorized: Option<bool>,
}

pub fn summarize<'a>(entries: impl IntoIterator<Item = &'a LogEntry>) -> LogSummary {
    let mut summary = LogSummary::default();
    for entry in entries {
        summary.users.insert(entry.user.clone());
        summary.resources.insert(entry.resource.clone());
        summary.matrix.record(&entry.user, &entry.resource, &entry.operation);
        *summary
            .counts
            .entry((entry.user.clone(), entry.resource.clone(), entry.operation.clone()))
            .or_insert(0) += 1;
    }
    summary
}
