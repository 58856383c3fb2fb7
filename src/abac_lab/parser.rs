use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::{error, warn};

use crate::abac_lab::attr_val::*;
use crate::abac_lab::condition::{CrossCondition, ValueCondition};
use crate::error::{AbacError, DeclarationKind, Result};

static RULE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"rule\s*\((.*?)\)").expect("valid regex"));
static USER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"userAttrib\s*\((.*?)\)").expect("valid regex"));
static RESOURCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"resourceAttrib\s*\((.*?)\)").expect("valid regex"));

/// What to do with a condition clause that matches no known operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum UnknownConditionPolicy {
    /// Log a warning and drop the clause; the rest of the rule still applies.
    #[default]
    WarnAndSkip,
    /// Log a warning and keep the rule, but it never matches.
    FailClosed,
    /// Abort parsing.
    FailFast,
}

/// What to do with a structurally broken declaration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum MalformedPolicy {
    /// Log an error and ignore the whole declaration.
    #[default]
    SkipLine,
    /// Abort parsing.
    Fail,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    pub on_unknown_condition: UnknownConditionPolicy,
    pub on_malformed: MalformedPolicy,
}

/// Reads policy text line by line into a [`Policy`].
///
/// Every line is searched for `rule(...)`, `userAttrib(...)` and
/// `resourceAttrib(...)`; anything else on the line is ignored. A
/// declaration body ends at its first `)`.
pub struct Parser {
    options: ParseOptions,
    policy: Policy,
    line_no: usize,
    pub dropped_clauses: usize,
    pub skipped_lines: usize,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new(ParseOptions::default())
    }
}

impl Parser {
    pub fn new(options: ParseOptions) -> Self {
        Parser {
            options,
            policy: Policy::default(),
            line_no: 0,
            dropped_clauses: 0,
            skipped_lines: 0,
        }
    }

    pub fn parse_file(&mut self, path: &Path) -> Result<()> {
        let text = std::fs::read_to_string(path).map_err(|source| AbacError::InputUnavailable {
            path: path.to_path_buf(),
            source,
        })?;
        self.parse_str(&text)
    }

    pub fn parse_str(&mut self, text: &str) -> Result<()> {
        for line in text.lines() {
            self.parse_line(line)?;
        }
        Ok(())
    }

    pub fn parse_line(&mut self, line: &str) -> Result<()> {
        self.line_no += 1;

        if let Some(body) = self.single_body(&RULE_RE, line, DeclarationKind::Rule) {
            let parsed = self.parse_rule(body);
            if let Some(rule) = self.check_structure(parsed)? {
                self.policy.rules.push(rule);
            }
        }

        if let Some(body) = self.single_body(&USER_RE, line, DeclarationKind::User) {
            let parsed = self.parse_attrib(body, DeclarationKind::User);
            if let Some(user) = self.check_structure(parsed)? {
                if self.policy.users.insert(user).is_some() {
                    warn!(line = self.line_no, "user redeclared; later attributes replace earlier ones");
                }
            }
        }

        if let Some(body) = self.single_body(&RESOURCE_RE, line, DeclarationKind::Resource) {
            let parsed = self.parse_attrib(body, DeclarationKind::Resource);
            if let Some(resource) = self.check_structure(parsed)? {
                if self.policy.resources.insert(resource).is_some() {
                    warn!(line = self.line_no, "resource redeclared; later attributes replace earlier ones");
                }
            }
        }

        Ok(())
    }

    pub fn into_policy(self) -> Policy {
        self.policy
    }

    /// A declaration kind counts only when it occurs exactly once on a line.
    fn single_body<'a>(&self, re: &Regex, line: &'a str, kind: DeclarationKind) -> Option<&'a str> {
        let mut captures = re.captures_iter(line);
        let body = captures.next()?.get(1)?.as_str();
        if captures.next().is_some() {
            warn!(line = self.line_no, %kind, "several declarations of one kind on a line; ignoring them");
            return None;
        }
        Some(body)
    }

    /// Applies the malformed-declaration policy. Unknown-condition errors are
    /// governed by their own policy and always propagate.
    fn check_structure<T>(&mut self, parsed: Result<T>) -> Result<Option<T>> {
        match parsed {
            Ok(value) => Ok(Some(value)),
            Err(err @ AbacError::MalformedDeclaration { .. })
                if self.options.on_malformed == MalformedPolicy::SkipLine =>
            {
                error!("{err}; skipping declaration");
                self.skipped_lines += 1;
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn malformed(&self, kind: DeclarationKind, reason: impl Into<String>) -> AbacError {
        AbacError::MalformedDeclaration {
            line: self.line_no,
            kind,
            reason: reason.into(),
        }
    }

    fn parse_attrib(&self, body: &str, kind: DeclarationKind) -> Result<AttributeRecord> {
        let mut fields = body.split(',');
        let id = fields.next().unwrap_or_default().trim();
        if id.is_empty() {
            return Err(self.malformed(kind, "missing identifier"));
        }

        let mut record = AttributeRecord::new(id);
        for field in fields {
            let mut parts = field.split('=');
            let (Some(name), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
                return Err(self.malformed(
                    kind,
                    format!("attribute {:?} must contain exactly one '='", field.trim()),
                ));
            };
            let name = name.trim();
            if name.is_empty() {
                return Err(self.malformed(kind, format!("attribute {:?} has no name", field.trim())));
            }
            record.attributes.insert(name.to_string(), value.trim().to_string());
        }

        Ok(record)
    }

    fn parse_rule(&mut self, body: &str) -> Result<Rule> {
        let segments: Vec<&str> = body.split(';').collect();
        let [name, user_conds, resource_conds, operations, cross_conds] = segments[..] else {
            return Err(self.malformed(
                DeclarationKind::Rule,
                format!("expected 5 ';'-separated segments, found {}", segments.len()),
            ));
        };

        let operations = operations
            .split_once('{')
            .and_then(|(_, rest)| rest.split_once('}'))
            .map(|(ops, _)| ops)
            .ok_or_else(|| self.malformed(DeclarationKind::Rule, "operations must be enclosed in '{' '}'"))?;

        let mut rule = Rule::new(name.trim());
        rule.operations = operations.split_whitespace().map(str::to_string).collect();

        for clause in user_conds.split(',').filter(|c| !c.trim().is_empty()) {
            match ValueCondition::parse(clause) {
                Some(cond) => rule.user_conditions.push(cond),
                None => self.unknown_clause(&mut rule, clause)?,
            }
        }
        for clause in resource_conds.split(',').filter(|c| !c.trim().is_empty()) {
            match ValueCondition::parse(clause) {
                Some(cond) => rule.resource_conditions.push(cond),
                None => self.unknown_clause(&mut rule, clause)?,
            }
        }
        for clause in cross_conds.split(',').filter(|c| !c.trim().is_empty()) {
            match CrossCondition::parse(clause) {
                Some(cond) => rule.cross_conditions.push(cond),
                None => self.unknown_clause(&mut rule, clause)?,
            }
        }

        Ok(rule)
    }

    fn unknown_clause(&mut self, rule: &mut Rule, clause: &str) -> Result<()> {
        let clause = clause.trim();
        match self.options.on_unknown_condition {
            UnknownConditionPolicy::WarnAndSkip => {
                warn!(line = self.line_no, rule = %rule.name, clause, "condition not recognized; dropping clause");
            }
            UnknownConditionPolicy::FailClosed => {
                warn!(line = self.line_no, rule = %rule.name, clause, "condition not recognized; rule disabled");
                rule.never_matches = true;
            }
            UnknownConditionPolicy::FailFast => {
                return Err(AbacError::UnknownCondition {
                    line: self.line_no,
                    clause: clause.to_string(),
                });
            }
        }
        self.dropped_clauses += 1;
        Ok(())
    }
}

/// Parses a whole policy text with the given options.
pub fn parse_policy(text: &str, options: ParseOptions) -> Result<Policy> {
    let mut parser = Parser::new(options);
    parser.parse_str(text)?;
    Ok(parser.into_policy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abac_lab::condition::CrossOperator;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct CapturedLogs {
        buf: Arc<Mutex<Vec<u8>>>,
    }

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.buf.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.buf.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn parse_capturing(text: &str, options: ParseOptions) -> (Parser, String) {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .finish();
        let parser = tracing::subscriber::with_default(subscriber, || {
            let mut parser = Parser::new(options);
            parser.parse_str(text).unwrap();
            parser
        });
        (parser, logs.contents())
    }

    fn parse(text: &str) -> Parser {
        let mut parser = Parser::default();
        parser.parse_str(text).unwrap();
        parser
    }

    #[test]
    fn test_parse_attrib_lines() {
        let parser = parse(
            "userAttrib(alice, role=admin, dept = cs)\n\
             some free text\n\
             resourceAttrib( doc1 ,sensitivity=low)\n",
        );
        let policy = &parser.policy;

        assert_eq!(policy.users.ids(), vec!["alice"]);
        assert_eq!(policy.resources.ids(), vec!["doc1"]);
        let alice = policy.users.get("alice").unwrap();
        assert_eq!(alice.get("role"), Some("admin"));
        assert_eq!(alice.get("dept"), Some("cs"));
        assert_eq!(policy.resources.get("doc1").unwrap().get("sensitivity"), Some("low"));
    }

    #[test]
    fn test_parse_rule_line() {
        let parser = parse("rule(r1; role in admin, tags supseteqln ab; sensitivity in low; {read  write}; clearance<level, dept=dept)");
        let rule = &parser.policy.rules[0];

        assert_eq!(rule.name, "r1");
        assert_eq!(
            rule.user_conditions,
            vec![
                ValueCondition::membership("role", "admin"),
                ValueCondition::superset("tags", "ab"),
            ]
        );
        assert_eq!(rule.resource_conditions, vec![ValueCondition::membership("sensitivity", "low")]);
        assert_eq!(rule.operations.iter().collect::<Vec<_>>(), vec!["read", "write"]);
        assert_eq!(
            rule.cross_conditions,
            vec![
                CrossCondition::new(CrossOperator::LessThan, "clearance", "level"),
                CrossCondition::new(CrossOperator::Equal, "dept", "dept"),
            ]
        );
        assert!(!rule.never_matches);
    }

    #[test]
    fn test_rules_keep_file_order() {
        let parser = parse("rule(b;;;{x};)\nrule(a;;;{y};)\nrule(b;;;{z};)\n");
        let names: Vec<_> = parser.policy.rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "b"]);
    }

    #[test]
    fn test_unknown_clause_is_dropped_with_warn_and_skip() {
        let parser = parse("rule(r; role in admin, attr~val; ; {read}; a~b)");
        let rule = &parser.policy.rules[0];

        assert_eq!(rule.user_conditions, vec![ValueCondition::membership("role", "admin")]);
        assert!(rule.cross_conditions.is_empty());
        assert!(!rule.never_matches);
        assert_eq!(parser.dropped_clauses, 2);
    }

    #[test]
    fn test_unknown_clause_is_logged() {
        let (parser, logs) = parse_capturing("\nrule(r7; role in admin, attr~val; ; {read}; )", ParseOptions::default());
        assert_eq!(parser.dropped_clauses, 1);

        let line = logs
            .lines()
            .find(|l| l.contains("condition not recognized; dropping clause"))
            .unwrap_or_else(|| panic!("no warning in {logs:?}"));
        assert!(line.contains("WARN"));
        assert!(line.contains("line=2"));
        assert!(line.contains("rule=r7"));
        assert!(line.contains("attr~val"));
    }

    #[test]
    fn test_fail_closed_logs_disabled_rule() {
        let (parser, logs) = parse_capturing(
            "rule(r; a~b; ; {read}; )",
            ParseOptions {
                on_unknown_condition: UnknownConditionPolicy::FailClosed,
                ..Default::default()
            },
        );
        assert!(parser.policy.rules[0].never_matches);
        assert!(logs.contains("condition not recognized; rule disabled"));
        assert!(!logs.contains("dropping clause"));
    }

    #[test]
    fn test_unknown_clause_fail_closed_disables_rule() {
        let mut parser = Parser::new(ParseOptions {
            on_unknown_condition: UnknownConditionPolicy::FailClosed,
            ..Default::default()
        });
        parser.parse_str("rule(r; attr~val; ; {read}; )").unwrap();
        assert!(parser.policy.rules[0].never_matches);
    }

    #[test]
    fn test_unknown_clause_fail_fast_aborts() {
        let result = parse_policy(
            "userAttrib(u1, a=b)\nrule(r; attr~val; ; {read}; )",
            ParseOptions {
                on_unknown_condition: UnknownConditionPolicy::FailFast,
                on_malformed: MalformedPolicy::SkipLine,
            },
        );
        assert!(matches!(result, Err(AbacError::UnknownCondition { line: 2, .. })));
    }

    #[test]
    fn test_malformed_attribute_skips_line() {
        let parser = parse("userAttrib(u1, role)\nuserAttrib(u2, role=x=y)\nuserAttrib(u3, role=ok)\nuserAttrib( , role=ok)");
        assert_eq!(parser.policy.users.ids(), vec!["u3"]);
        assert_eq!(parser.skipped_lines, 3);
    }

    #[test]
    fn test_malformed_rule_skips_line() {
        let parser = parse("rule(r1; a in b; ; {read})\nrule(r2;;;read;)\nrule(r3;;;{read};)");
        let names: Vec<_> = parser.policy.rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["r3"]);
        assert_eq!(parser.skipped_lines, 2);
    }

    #[test]
    fn test_malformed_fail_policy_aborts() {
        let result = parse_policy(
            "userAttrib(u1, role=a)\nrule(r1; ; ; {read})",
            ParseOptions {
                on_malformed: MalformedPolicy::Fail,
                ..Default::default()
            },
        );
        assert!(matches!(
            result,
            Err(AbacError::MalformedDeclaration {
                line: 2,
                kind: DeclarationKind::Rule,
                ..
            })
        ));
    }

    #[test]
    fn test_repeated_kind_on_one_line_is_ignored() {
        let parser = parse("userAttrib(u1, a=b) userAttrib(u2, a=c)\nuserAttrib(u3, a=d) resourceAttrib(r1, a=e)");
        assert_eq!(parser.policy.users.ids(), vec!["u3"]);
        assert_eq!(parser.policy.resources.ids(), vec!["r1"]);
    }

    #[test]
    fn test_missing_file_is_input_unavailable() {
        let mut parser = Parser::default();
        let err = parser
            .parse_file(Path::new("/definitely/not/here.abac"))
            .unwrap_err();
        assert!(matches!(err, AbacError::InputUnavailable { .. }));
    }
}
