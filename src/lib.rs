//! # abac-matrix
//!
//! Compiles ABAC-lab policy files into a concrete authorization matrix.
//!
//! ```text
//! policy text ──▶ Parser ──▶ Policy { users, resources, rules }
//!                                    │
//!                                    ▼
//!                               evaluate()
//!                                    │
//!                                    ▼
//!                   AuthorizationMatrix ──▶ Snapshot (literal | json)
//! ```
//!
//! ```
//! use abac_matrix::{compile_str, Config};
//!
//! let text = "userAttrib(alice, role=admin)\n\
//!             resourceAttrib(doc1, sensitivity=low)\n\
//!             rule(r1; role in admin; sensitivity in low; {read write}; )";
//! let compiled = compile_str(text, &Config::default()).unwrap();
//! assert_eq!(
//!     compiled.snapshot.to_literal(),
//!     "['alice']\n['doc1']\n{('alice', 'doc1'): {'read', 'write'}}"
//! );
//! ```

pub mod abac_lab;
pub mod access_log;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod matrix;
pub mod snapshot;

use std::path::Path;

pub use abac_lab::attr_val::{AttributeRecord, EntityStore, Policy, Rule};
pub use abac_lab::condition::{CrossCondition, CrossEquality, CrossOperator, ValueCondition, ValueOperator};
pub use abac_lab::parser::{MalformedPolicy, ParseOptions, Parser, UnknownConditionPolicy, parse_policy};
pub use config::Config;
pub use error::{AbacError, Result};
pub use evaluator::{EvalOptions, evaluate};
pub use matrix::AuthorizationMatrix;
pub use snapshot::{Snapshot, SnapshotFormat};

/// Result of one parse + evaluate pass.
#[derive(Debug, Clone)]
pub struct Compiled {
    pub snapshot: Snapshot,
    pub rules: usize,
    pub dropped_clauses: usize,
    pub skipped_lines: usize,
}

fn finish(parser: Parser, config: &Config) -> Compiled {
    let (dropped_clauses, skipped_lines) = (parser.dropped_clauses, parser.skipped_lines);
    let policy = parser.into_policy();
    let matrix = evaluate(&policy, &config.eval_options());
    Compiled {
        snapshot: Snapshot {
            users: policy.users.ids(),
            resources: policy.resources.ids(),
            matrix,
        },
        rules: policy.rules.len(),
        dropped_clauses,
        skipped_lines,
    }
}

pub fn compile_str(text: &str, config: &Config) -> Result<Compiled> {
    let mut parser = Parser::new(config.parse_options());
    parser.parse_str(text)?;
    Ok(finish(parser, config))
}

pub fn compile_file(path: &Path, config: &Config) -> Result<Compiled> {
    let mut parser = Parser::new(config.parse_options());
    parser.parse_file(path)?;
    Ok(finish(parser, config))
}
