//! Run configuration.
//!
//! Values come from an optional TOML file; command-line flags override
//! them. Every field has a default, so an empty file is valid:
//!
//! ```toml
//! on_unknown_condition = "warn_and_skip"   # or "fail_closed", "fail_fast"
//! on_malformed = "skip_line"               # or "fail"
//! cross_equality = "same_name"             # or "paired"
//! output = "abac_res.txt"
//! format = "literal"                       # or "json"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::abac_lab::condition::CrossEquality;
use crate::abac_lab::parser::{MalformedPolicy, ParseOptions, UnknownConditionPolicy};
use crate::error::{AbacError, Result};
use crate::evaluator::EvalOptions;
use crate::snapshot::SnapshotFormat;

pub const DEFAULT_OUTPUT: &str = "abac_res.txt";
/// Where `log` writes, kept apart from the compiled matrix it may read.
pub const DEFAULT_LOG_OUTPUT: &str = "abac_log.txt";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub on_unknown_condition: UnknownConditionPolicy,
    pub on_malformed: MalformedPolicy,
    pub cross_equality: CrossEquality,
    pub output: PathBuf,
    pub format: SnapshotFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            on_unknown_condition: UnknownConditionPolicy::default(),
            on_malformed: MalformedPolicy::default(),
            cross_equality: CrossEquality::default(),
            output: PathBuf::from(DEFAULT_OUTPUT),
            format: SnapshotFormat::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| AbacError::InputUnavailable {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| AbacError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            on_unknown_condition: self.on_unknown_condition,
            on_malformed: self.on_malformed,
        }
    }

    pub fn eval_options(&self) -> EvalOptions {
        EvalOptions {
            cross_equality: self.cross_equality,
        }
    }
}
