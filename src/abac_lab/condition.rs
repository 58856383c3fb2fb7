//! Conditions of the rule language and their evaluation.
//!
//! Value conditions compare one entity attribute against a literal:
//!
//! ```text
//! attr in value            membership: entity value is a substring of `value`
//! attr supseteqln value    superset:   entity value holds every character of `value`
//! ```
//!
//! Cross conditions relate a user attribute to a resource attribute:
//!
//! ```text
//! u<r    less_than:    chars(resource[r]) ⊆ chars(user[u])
//! u>r    greater_than: chars(user[u]) ⊆ chars(resource[r])
//! u=r    equal:        user[u] == resource[u]  (see `CrossEquality`)
//! u]r    element_of:   resource[r] is a substring of user[u]
//! ```
//!
//! Operators are detected in the fixed order shown, so `a<b=c` is a
//! less-than clause with resource operand `b=c`.

use serde::Deserialize;

use crate::abac_lab::attr_val::AttributeRecord;

/// `true` when every character of `needle` occurs somewhere in `haystack`.
fn chars_subset(needle: &str, haystack: &str) -> bool {
    needle.chars().all(|c| haystack.contains(c))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueOperator {
    Membership,
    Superset,
}

impl ValueOperator {
    /// Detection order matters: ` in ` is tried before ` supseteqln `.
    pub const PRECEDENCE: [ValueOperator; 2] = [ValueOperator::Membership, ValueOperator::Superset];

    pub fn keyword(self) -> &'static str {
        match self {
            ValueOperator::Membership => " in ",
            ValueOperator::Superset => " supseteqln ",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValueCondition {
    pub op: ValueOperator,
    pub attr: String,
    pub literal: String,
}

impl ValueCondition {
    pub fn membership(attr: impl Into<String>, literal: impl Into<String>) -> Self {
        ValueCondition {
            op: ValueOperator::Membership,
            attr: attr.into(),
            literal: literal.into(),
        }
    }

    pub fn superset(attr: impl Into<String>, literal: impl Into<String>) -> Self {
        ValueCondition {
            op: ValueOperator::Superset,
            attr: attr.into(),
            literal: literal.into(),
        }
    }

    /// Classifies one clause. Returns `None` when no operator keyword is
    /// present or the attribute name is empty.
    pub fn parse(clause: &str) -> Option<Self> {
        let op = ValueOperator::PRECEDENCE
            .into_iter()
            .find(|op| clause.contains(op.keyword()))?;
        let (attr, literal) = clause.split_once(op.keyword())?;
        let attr = attr.trim();
        if attr.is_empty() {
            return None;
        }
        Some(ValueCondition {
            op,
            attr: attr.to_string(),
            literal: literal.trim().to_string(),
        })
    }

    /// A missing attribute fails the condition.
    pub fn holds(&self, entity: &AttributeRecord) -> bool {
        let Some(value) = entity.get(&self.attr) else {
            return false;
        };
        match self.op {
            ValueOperator::Membership => self.literal.contains(value),
            ValueOperator::Superset => chars_subset(&self.literal, value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrossOperator {
    LessThan,
    GreaterThan,
    Equal,
    ElementOf,
}

impl CrossOperator {
    /// Operand text may itself contain operator characters; the first
    /// operator in this list that occurs anywhere in the clause wins.
    pub const PRECEDENCE: [CrossOperator; 4] = [
        CrossOperator::LessThan,
        CrossOperator::GreaterThan,
        CrossOperator::Equal,
        CrossOperator::ElementOf,
    ];

    pub fn symbol(self) -> char {
        match self {
            CrossOperator::LessThan => '<',
            CrossOperator::GreaterThan => '>',
            CrossOperator::Equal => '=',
            CrossOperator::ElementOf => ']',
        }
    }
}

/// How the equality cross-condition picks the resource attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CrossEquality {
    /// `u=r` compares `user[u]` with `resource[u]`; `resource[r]` must still
    /// exist. This is how existing policy files have always been evaluated.
    #[default]
    SameName,
    /// `u=r` compares `user[u]` with `resource[r]`.
    Paired,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CrossCondition {
    pub op: CrossOperator,
    pub user_attr: String,
    pub resource_attr: String,
}

impl CrossCondition {
    pub fn new(op: CrossOperator, user_attr: impl Into<String>, resource_attr: impl Into<String>) -> Self {
        CrossCondition {
            op,
            user_attr: user_attr.into(),
            resource_attr: resource_attr.into(),
        }
    }

    /// Classifies one clause, splitting at the first occurrence of the
    /// detected operator. Returns `None` for no operator or an empty operand.
    pub fn parse(clause: &str) -> Option<Self> {
        let op = CrossOperator::PRECEDENCE
            .into_iter()
            .find(|op| clause.contains(op.symbol()))?;
        let (user_attr, resource_attr) = clause.split_once(op.symbol())?;
        let (user_attr, resource_attr) = (user_attr.trim(), resource_attr.trim());
        if user_attr.is_empty() || resource_attr.is_empty() {
            return None;
        }
        Some(CrossCondition::new(op, user_attr, resource_attr))
    }

    /// Both named attributes must be present; otherwise the pair fails.
    pub fn holds(&self, user: &AttributeRecord, resource: &AttributeRecord, equality: CrossEquality) -> bool {
        let (Some(user_value), Some(resource_value)) =
            (user.get(&self.user_attr), resource.get(&self.resource_attr))
        else {
            return false;
        };

        match self.op {
            CrossOperator::LessThan => chars_subset(resource_value, user_value),
            CrossOperator::GreaterThan => chars_subset(user_value, resource_value),
            CrossOperator::Equal => match equality {
                CrossEquality::SameName => resource.get(&self.user_attr) == Some(user_value),
                CrossEquality::Paired => user_value == resource_value,
            },
            CrossOperator::ElementOf => user_value.contains(resource_value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn entity(attr: &str, value: &str) -> AttributeRecord {
        AttributeRecord::new("e").with_attribute(attr, value)
    }

    #[test_case("ab", true; "proper substring")]
    #[test_case("abc", true; "whole literal")]
    #[test_case("bc", true; "suffix")]
    #[test_case("abcd", false; "longer than literal")]
    #[test_case("ac", false; "not contiguous")]
    fn test_membership(value: &str, expected: bool) {
        let cond = ValueCondition::membership("attr", "abc");
        assert_eq!(cond.holds(&entity("attr", value)), expected);
    }

    #[test_case("cab", true; "reordered")]
    #[test_case("ab", true; "exact")]
    #[test_case("xbxa", true; "scattered")]
    #[test_case("a", false; "missing char")]
    #[test_case("", false; "empty value")]
    fn test_superset(value: &str, expected: bool) {
        let cond = ValueCondition::superset("attr", "ab");
        assert_eq!(cond.holds(&entity("attr", value)), expected);
    }

    #[test]
    fn test_value_condition_missing_attribute_fails() {
        let record = entity("other", "abc");
        assert!(!ValueCondition::membership("attr", "abc").holds(&record));
        assert!(!ValueCondition::superset("attr", "").holds(&record));
    }

    #[test]
    fn test_parse_value_clause() {
        assert_eq!(
            ValueCondition::parse(" role in admin "),
            Some(ValueCondition::membership("role", "admin"))
        );
        assert_eq!(
            ValueCondition::parse("tags supseteqln ab"),
            Some(ValueCondition::superset("tags", "ab"))
        );
        assert_eq!(ValueCondition::parse("attr~val"), None);
        assert_eq!(ValueCondition::parse(" in admin"), None);
    }

    #[test]
    fn test_membership_keyword_wins_over_superset() {
        // " in " appears inside the superset literal, so membership is chosen.
        let cond = ValueCondition::parse("a supseteqln x in y");
        assert_eq!(cond, Some(ValueCondition::membership("a supseteqln x", "y")));
    }

    #[test_case("u<r", CrossOperator::LessThan, "u", "r"; "less than")]
    #[test_case("u > r", CrossOperator::GreaterThan, "u", "r"; "greater than")]
    #[test_case("u=r", CrossOperator::Equal, "u", "r"; "equal")]
    #[test_case("u]r", CrossOperator::ElementOf, "u", "r"; "element of")]
    #[test_case("a=b<c", CrossOperator::LessThan, "a=b", "c"; "less than beats equal")]
    #[test_case("a]b>c", CrossOperator::GreaterThan, "a]b", "c"; "greater than beats element of")]
    #[test_case("a]b=c", CrossOperator::Equal, "a]b", "c"; "equal beats element of")]
    fn test_parse_cross_clause(clause: &str, op: CrossOperator, user: &str, resource: &str) {
        assert_eq!(CrossCondition::parse(clause), Some(CrossCondition::new(op, user, resource)));
    }

    #[test]
    fn test_parse_cross_clause_rejects_unknown() {
        assert_eq!(CrossCondition::parse("a~b"), None);
        assert_eq!(CrossCondition::parse("<b"), None);
        assert_eq!(CrossCondition::parse("a< "), None);
    }

    #[test]
    fn test_less_and_greater_than() {
        let user = entity("clearance", "abc");
        let resource = entity("level", "ca");

        let lt = CrossCondition::new(CrossOperator::LessThan, "clearance", "level");
        let gt = CrossCondition::new(CrossOperator::GreaterThan, "clearance", "level");
        assert!(lt.holds(&user, &resource, CrossEquality::SameName));
        assert!(!gt.holds(&user, &resource, CrossEquality::SameName));
        assert!(gt.holds(&entity("clearance", "cab"), &entity("level", "abcd"), CrossEquality::SameName));
    }

    #[test]
    fn test_element_of_direction() {
        let cond = CrossCondition::new(CrossOperator::ElementOf, "clearance", "level");
        assert!(cond.holds(&entity("clearance", "topsecret"), &entity("level", "secret"), CrossEquality::SameName));
        assert!(!cond.holds(&entity("clearance", "secret"), &entity("level", "topsecret"), CrossEquality::SameName));
    }

    #[test]
    fn test_equal_same_name_lookup() {
        let cond = CrossCondition::new(CrossOperator::Equal, "dept", "owner_dept");
        let user = entity("dept", "cs");
        let resource = AttributeRecord::new("r")
            .with_attribute("dept", "cs")
            .with_attribute("owner_dept", "ee");

        assert!(cond.holds(&user, &resource, CrossEquality::SameName));
        assert!(!cond.holds(&user, &resource, CrossEquality::Paired));

        // `owner_dept` must still exist on the resource.
        assert!(!cond.holds(&user, &entity("dept", "cs"), CrossEquality::SameName));
        // And the same-named attribute must exist too.
        assert!(!cond.holds(&user, &entity("owner_dept", "cs"), CrossEquality::SameName));
        assert!(cond.holds(&user, &entity("owner_dept", "cs"), CrossEquality::Paired));
    }

    #[test]
    fn test_cross_condition_missing_attribute_fails() {
        let cond = CrossCondition::new(CrossOperator::LessThan, "clearance", "level");
        assert!(!cond.holds(&entity("other", "abc"), &entity("level", "a"), CrossEquality::SameName));
        assert!(!cond.holds(&entity("clearance", "abc"), &entity("other", "a"), CrossEquality::SameName));
    }
}
