//! Error types for policy compilation.

use std::path::PathBuf;

use thiserror::Error;

/// Which declaration a structural error was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKind {
    User,
    Resource,
    Rule,
}

impl std::fmt::Display for DeclarationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeclarationKind::User => write!(f, "userAttrib"),
            DeclarationKind::Resource => write!(f, "resourceAttrib"),
            DeclarationKind::Rule => write!(f, "rule"),
        }
    }
}

#[derive(Debug, Error)]
pub enum AbacError {
    #[error("Failed to read input at {path}: {source}")]
    InputUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed {kind} declaration on line {line}: {reason}")]
    MalformedDeclaration {
        line: usize,
        kind: DeclarationKind,
        reason: String,
    },

    #[error("Unrecognized condition on line {line}: {clause:?}")]
    UnknownCondition { line: usize, clause: String },

    #[error("Failed to parse config at {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid snapshot: {0}")]
    Snapshot(String),

    #[error("Failed to write output at {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AbacError>;
