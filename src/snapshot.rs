//! Persisted snapshot of an evaluation run.
//!
//! The literal encoding is exactly three lines, readable by a generic
//! structured-literal reader:
//!
//! ```text
//! ['u1', 'u2']
//! ['r1', 'r2']
//! {('u1', 'r1'): {'read', 'write'}}
//! ```
//!
//! The JSON encoding carries the same three fields in the same order.
//! Both encodings are deterministic: id lists keep declaration order,
//! matrix entries keep first-grant order, operation sets are sorted.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};
use winnow::ascii::multispace0;
use winnow::combinator::{alt, delimited, opt, preceded, repeat, separated, separated_pair, terminated};
use winnow::error::ContextError;
use winnow::prelude::*;
use winnow::token::{one_of, take_while};

use crate::error::{AbacError, Result};
use crate::matrix::AuthorizationMatrix;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotFormat {
    #[default]
    Literal,
    Json,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "JsonSnapshot", into = "JsonSnapshot")]
pub struct Snapshot {
    pub users: Vec<String>,
    pub resources: Vec<String>,
    pub matrix: AuthorizationMatrix,
}

#[derive(Serialize, Deserialize)]
struct JsonSnapshot {
    users: Vec<String>,
    resources: Vec<String>,
    matrix: Vec<JsonEntry>,
}

#[derive(Serialize, Deserialize)]
struct JsonEntry {
    user: String,
    resource: String,
    operations: BTreeSet<String>,
}

impl From<Snapshot> for JsonSnapshot {
    fn from(snapshot: Snapshot) -> Self {
        let matrix = snapshot
            .matrix
            .iter()
            .map(|(user, resource, operations)| JsonEntry {
                user: user.to_string(),
                resource: resource.to_string(),
                operations: operations.clone(),
            })
            .collect();
        JsonSnapshot {
            users: snapshot.users,
            resources: snapshot.resources,
            matrix,
        }
    }
}

impl From<JsonSnapshot> for Snapshot {
    fn from(json: JsonSnapshot) -> Self {
        let mut matrix = AuthorizationMatrix::new();
        for entry in json.matrix {
            matrix.grant(&entry.user, &entry.resource, entry.operations);
        }
        Snapshot {
            users: json.users,
            resources: json.resources,
            matrix,
        }
    }
}

impl Snapshot {
    pub fn render(&self, format: SnapshotFormat) -> Result<String> {
        match format {
            SnapshotFormat::Literal => Ok(self.to_literal()),
            SnapshotFormat::Json => Ok(serde_json::to_string_pretty(self)?),
        }
    }

    /// Renders the whole snapshot before touching the file, so a failure
    /// never leaves a partial snapshot behind.
    pub fn write(&self, path: &Path, format: SnapshotFormat) -> Result<()> {
        let text = self.render(format)?;
        std::fs::write(path, text).map_err(|source| AbacError::Output {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn to_literal(&self) -> String {
        let mut out = String::new();
        write_list(&mut out, &self.users);
        out.push('\n');
        write_list(&mut out, &self.resources);
        out.push('\n');

        out.push('{');
        for (i, (uid, rid, ops)) in self.matrix.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push('(');
            write_str(&mut out, uid);
            out.push_str(", ");
            write_str(&mut out, rid);
            out.push_str("): ");
            write_set(&mut out, ops);
        }
        out.push('}');
        out
    }
}

fn write_list(out: &mut String, items: &[String]) {
    out.push('[');
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_str(out, item);
    }
    out.push(']');
}

fn write_set(out: &mut String, items: &BTreeSet<String>) {
    if items.is_empty() {
        out.push_str("set()");
        return;
    }
    out.push('{');
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_str(out, item);
    }
    out.push('}');
}

/// Quotes the way a Python `repr` does: single quotes unless the text
/// contains a single quote and no double quote, with non-printable code
/// points escaped as `\xNN`, `\uNNNN` or `\UNNNNNNNN`.
fn write_str(out: &mut String, s: &str) {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if !is_printable(c) => {
                let code = c as u32;
                let _ = match code {
                    0..=0xff => write!(out, "\\x{code:02x}"),
                    0x100..=0xffff => write!(out, "\\u{code:04x}"),
                    _ => write!(out, "\\U{code:08x}"),
                };
            }
            c => out.push(c),
        }
    }
    out.push(quote);
}

/// Printable in the `str.isprintable` sense for control characters,
/// separators other than the ASCII space, format characters and private-use
/// code points. Unassigned code points are not tracked and print as is.
fn is_printable(c: char) -> bool {
    if c == ' ' {
        return true;
    }
    !matches!(
        c as u32,
        // Cc
        0x00..=0x1f | 0x7f..=0x9f
        // Zs
        | 0xa0 | 0x1680 | 0x2000..=0x200a | 0x202f | 0x205f | 0x3000
        // Zl, Zp
        | 0x2028 | 0x2029
        // Cf
        | 0xad | 0x600..=0x605 | 0x61c | 0x6dd | 0x70f | 0x890..=0x891 | 0x8e2 | 0x180e
        | 0x200b..=0x200f | 0x202a..=0x202e | 0x2060..=0x2064 | 0x2066..=0x206f
        | 0xfeff | 0xfff9..=0xfffb | 0x110bd | 0x110cd | 0x13430..=0x1343f
        | 0x1bca0..=0x1bca3 | 0x1d173..=0x1d17a | 0xe0001 | 0xe0020..=0xe007f
        // Co
        | 0xe000..=0xf8ff | 0xf0000..=0xffffd | 0x100000..=0x10fffd
    )
}

/// Reads the three-line literal encoding back.
pub fn parse_literal(text: &str) -> Result<Snapshot> {
    let mut lines = text.lines();
    let mut next_line = |what: &str| {
        lines
            .next()
            .ok_or_else(|| AbacError::Snapshot(format!("missing {what} line")))
    };

    let users = read_line("user", string_list, next_line("user")?)?;
    let resources = read_line("resource", string_list, next_line("resource")?)?;
    let entries = read_line("matrix", matrix_dict, next_line("matrix")?)?;

    if lines.any(|l| !l.trim().is_empty()) {
        return Err(AbacError::Snapshot("unexpected content after matrix line".to_string()));
    }

    let mut matrix = AuthorizationMatrix::new();
    for (uid, rid, ops) in entries {
        matrix.grant(&uid, &rid, ops);
    }
    Ok(Snapshot {
        users,
        resources,
        matrix,
    })
}

/// Reads a whole snapshot file, JSON or literal, whichever it holds.
pub fn read_file(path: &Path) -> Result<Snapshot> {
    let text = std::fs::read_to_string(path).map_err(|source| AbacError::InputUnavailable {
        path: path.to_path_buf(),
        source,
    })?;
    // The literal form always opens with the user list.
    if text.trim_start().starts_with('{') {
        return Ok(serde_json::from_str(&text)?);
    }
    parse_literal(&text)
}

fn read_line<'i, O>(what: &str, parser: impl Parser<&'i str, O, ContextError>, line: &'i str) -> Result<O> {
    delimited(multispace0, parser, multispace0)
        .parse(line)
        .map_err(|e| AbacError::Snapshot(format!("bad {what} line at column {}", e.offset() + 1)))
}

type Entry = (String, String, BTreeSet<String>);

enum Fragment<'a> {
    Literal(&'a str),
    Escaped(char),
}

fn string_list(input: &mut &str) -> std::result::Result<Vec<String>, ContextError> {
    delimited(
        ('[', multispace0),
        terminated(separated(0.., padded_string, ','), opt((',', multispace0))),
        ']',
    )
    .parse_next(input)
}

fn operation_set(input: &mut &str) -> std::result::Result<BTreeSet<String>, ContextError> {
    alt((
        "set()".value(BTreeSet::new()),
        delimited(
            ('{', multispace0),
            terminated(separated(0.., padded_string, ','), opt((',', multispace0))),
            '}',
        )
        .map(|ops: Vec<String>| ops.into_iter().collect()),
    ))
    .parse_next(input)
}

fn matrix_entry(input: &mut &str) -> std::result::Result<Entry, ContextError> {
    delimited(
        multispace0,
        (
            delimited('(', separated_pair(padded_string, ',', padded_string), ')'),
            preceded((multispace0, ':', multispace0), operation_set),
        ),
        multispace0,
    )
    .map(|((uid, rid), ops)| (uid, rid, ops))
    .parse_next(input)
}

fn matrix_dict(input: &mut &str) -> std::result::Result<Vec<Entry>, ContextError> {
    delimited(
        ('{', multispace0),
        terminated(separated(0.., matrix_entry, ','), opt((',', multispace0))),
        '}',
    )
    .parse_next(input)
}

fn padded_string(input: &mut &str) -> std::result::Result<String, ContextError> {
    delimited(multispace0, py_string, multispace0).parse_next(input)
}

/// A single- or double-quoted string with backslash escapes.
fn py_string(input: &mut &str) -> std::result::Result<String, ContextError> {
    let quote = one_of::<_, _, ContextError>(['\'', '"']).parse_next(input)?;
    terminated(
        repeat(
            0..,
            alt((
                take_while(1.., move |c: char| c != quote && c != '\\').map(Fragment::Literal),
                preceded('\\', escape).map(Fragment::Escaped),
            )),
        )
        .fold(String::new, |mut acc, fragment| {
            match fragment {
                Fragment::Literal(s) => acc.push_str(s),
                Fragment::Escaped(c) => acc.push(c),
            }
            acc
        }),
        quote,
    )
    .parse_next(input)
}

fn escape(input: &mut &str) -> std::result::Result<char, ContextError> {
    alt((
        'n'.value('\n'),
        'r'.value('\r'),
        't'.value('\t'),
        '\\'.value('\\'),
        '\''.value('\''),
        '"'.value('"'),
        preceded('x', hex_code(2)),
        preceded('u', hex_code(4)),
        preceded('U', hex_code(8)),
    ))
    .parse_next(input)
}

fn hex_code<'i>(digits: usize) -> impl Parser<&'i str, char, ContextError> {
    take_while(digits, |c: char| c.is_ascii_hexdigit())
        .verify_map(|hex: &str| u32::from_str_radix(hex, 16).ok().and_then(char::from_u32))
}
