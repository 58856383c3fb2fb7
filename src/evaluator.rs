//! Evaluates a parsed policy into an authorization matrix.
//!
//! Rules are applied in file order. For each rule the user and resource
//! candidates are filtered by their value conditions, then every candidate
//! pair that passes all cross conditions is granted the rule's operations.
//! A later matching rule replaces the entry an earlier one wrote.

use tracing::{debug, info};

use crate::abac_lab::attr_val::{AttributeRecord, EntityStore, Policy, Rule};
use crate::abac_lab::condition::{CrossEquality, ValueCondition};
use crate::matrix::AuthorizationMatrix;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvalOptions {
    pub cross_equality: CrossEquality,
}

fn candidates<'a>(store: &'a EntityStore, conditions: &[ValueCondition]) -> Vec<&'a AttributeRecord> {
    store
        .iter()
        .filter(|entity| conditions.iter().all(|cond| cond.holds(entity)))
        .collect()
}

fn apply_rule(rule: &Rule, policy: &Policy, options: &EvalOptions, matrix: &mut AuthorizationMatrix) {
    if rule.never_matches {
        debug!(rule = %rule.name, "rule disabled by unrecognized condition");
        return;
    }

    let users = candidates(&policy.users, &rule.user_conditions);
    let resources = candidates(&policy.resources, &rule.resource_conditions);
    debug!(
        rule = %rule.name,
        users = users.len(),
        resources = resources.len(),
        "candidates selected"
    );

    for user in &users {
        for resource in &resources {
            let authorized = rule
                .cross_conditions
                .iter()
                .all(|cond| cond.holds(user, resource, options.cross_equality));
            if authorized {
                matrix.grant(&user.id, &resource.id, rule.operations.clone());
            }
        }
    }
}

pub fn evaluate(policy: &Policy, options: &EvalOptions) -> AuthorizationMatrix {
    let mut matrix = AuthorizationMatrix::new();
    for rule in &policy.rules {
        apply_rule(rule, policy, options, &mut matrix);
    }
    info!(
        rules = policy.rules.len(),
        users = policy.users.len(),
        resources = policy.resources.len(),
        entries = matrix.len(),
        "policy evaluated"
    );
    matrix
}
