//! Property conditions and their evaluation.
//!
//! Conditions compare a dotted field path on the target document against a
//! literal value. Groups combine conditions (and nested groups) with a
//! single combinator, which keeps saved filters easy to render and reason
//! about while still allowing arbitrary nesting.

use amber_relay_core::json::lookup_path;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// How a condition compares the field value against the literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Field equals the literal.
    Equals,
    /// Field does not equal the literal.
    NotEquals,
    /// Substring match on strings, membership on arrays.
    Contains,
    /// Negation of `Contains`.
    NotContains,
    /// Numeric greater-than.
    GreaterThan,
    /// Numeric less-than.
    LessThan,
    /// Field is present and non-null.
    IsSet,
    /// Field is absent or null.
    IsNotSet,
}

/// A single property condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Dotted path into the target document (e.g. `customer.plan`).
    pub path: String,
    /// Comparison operator.
    pub operator: Operator,
    /// Literal to compare against. Ignored for `IsSet`/`IsNotSet`.
    #[serde(default)]
    pub value: JsonValue,
}

impl Condition {
    /// Creates a new condition.
    #[must_use]
    pub fn new(path: impl Into<String>, operator: Operator, value: JsonValue) -> Self {
        Self {
            path: path.into(),
            operator,
            value,
        }
    }

    /// Evaluates this condition against a target document.
    #[must_use]
    pub fn evaluate(&self, target: &JsonValue) -> bool {
        let field = lookup_path(target, &self.path);

        match self.operator {
            Operator::IsSet => field.is_some_and(|v| !v.is_null()),
            Operator::IsNotSet => !field.is_some_and(|v| !v.is_null()),
            Operator::Equals => field.is_some_and(|v| v == &self.value),
            Operator::NotEquals => !field.is_some_and(|v| v == &self.value),
            Operator::Contains => field.is_some_and(|v| contains(v, &self.value)),
            Operator::NotContains => !field.is_some_and(|v| contains(v, &self.value)),
            Operator::GreaterThan => compare_numeric(field, &self.value)
                .is_some_and(|ordering| ordering == std::cmp::Ordering::Greater),
            Operator::LessThan => compare_numeric(field, &self.value)
                .is_some_and(|ordering| ordering == std::cmp::Ordering::Less),
        }
    }
}

/// Substring match on strings, membership on arrays.
fn contains(field: &JsonValue, needle: &JsonValue) -> bool {
    match field {
        JsonValue::String(s) => needle.as_str().is_some_and(|n| s.contains(n)),
        JsonValue::Array(items) => items.contains(needle),
        _ => false,
    }
}

/// Numeric comparison; `None` when either side is not a number.
fn compare_numeric(field: Option<&JsonValue>, literal: &JsonValue) -> Option<std::cmp::Ordering> {
    let left = field?.as_f64()?;
    let right = literal.as_f64()?;
    left.partial_cmp(&right)
}

/// How the members of a group combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combinator {
    /// Every member must match.
    #[default]
    And,
    /// At least one member must match.
    Or,
}

/// A member of a condition group: either a leaf condition or a nested group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionNode {
    /// A leaf property condition.
    Property(Condition),
    /// A nested group with its own combinator.
    Group(ConditionGroup),
}

impl ConditionNode {
    /// Evaluates this node against a target document.
    #[must_use]
    pub fn evaluate(&self, target: &JsonValue) -> bool {
        match self {
            Self::Property(condition) => condition.evaluate(target),
            Self::Group(group) => group.evaluate(target),
        }
    }
}

/// A group of conditions joined by a combinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionGroup {
    /// How the members combine.
    pub combinator: Combinator,
    /// The members of this group.
    pub conditions: Vec<ConditionNode>,
}

impl ConditionGroup {
    /// Creates an `And` group over the given conditions.
    #[must_use]
    pub fn all(conditions: Vec<ConditionNode>) -> Self {
        Self {
            combinator: Combinator::And,
            conditions,
        }
    }

    /// Creates an `Or` group over the given conditions.
    #[must_use]
    pub fn any(conditions: Vec<ConditionNode>) -> Self {
        Self {
            combinator: Combinator::Or,
            conditions,
        }
    }

    /// Evaluates the group against a target document.
    ///
    /// An empty `And` group matches everything; an empty `Or` group
    /// matches nothing.
    #[must_use]
    pub fn evaluate(&self, target: &JsonValue) -> bool {
        match self.combinator {
            Combinator::And => self.conditions.iter().all(|c| c.evaluate(target)),
            Combinator::Or => self.conditions.iter().any(|c| c.evaluate(target)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ticket() -> JsonValue {
        json!({
            "_id": "t1",
            "status": "open",
            "priority": 3,
            "tags": ["billing", "urgent"],
            "customer": {"plan": "pro", "email": "a@example.com"}
        })
    }

    #[test]
    fn equals_on_string_field() {
        let cond = Condition::new("status", Operator::Equals, json!("open"));
        assert!(cond.evaluate(&ticket()));

        let cond = Condition::new("status", Operator::Equals, json!("closed"));
        assert!(!cond.evaluate(&ticket()));
    }

    #[test]
    fn not_equals_matches_missing_field() {
        // A record without the field is "not equal" to any literal.
        let cond = Condition::new("assignee", Operator::NotEquals, json!("bob"));
        assert!(cond.evaluate(&ticket()));
    }

    #[test]
    fn contains_on_string_and_array() {
        let cond = Condition::new("status", Operator::Contains, json!("pe"));
        assert!(cond.evaluate(&ticket()));

        let cond = Condition::new("tags", Operator::Contains, json!("billing"));
        assert!(cond.evaluate(&ticket()));

        let cond = Condition::new("tags", Operator::Contains, json!("spam"));
        assert!(!cond.evaluate(&ticket()));
    }

    #[test]
    fn numeric_comparisons() {
        let cond = Condition::new("priority", Operator::GreaterThan, json!(2));
        assert!(cond.evaluate(&ticket()));

        let cond = Condition::new("priority", Operator::LessThan, json!(3));
        assert!(!cond.evaluate(&ticket()));

        // Non-numeric field never compares.
        let cond = Condition::new("status", Operator::GreaterThan, json!(1));
        assert!(!cond.evaluate(&ticket()));
    }

    #[test]
    fn is_set_and_is_not_set() {
        let cond = Condition::new("customer.plan", Operator::IsSet, JsonValue::Null);
        assert!(cond.evaluate(&ticket()));

        let cond = Condition::new("assignee", Operator::IsNotSet, JsonValue::Null);
        assert!(cond.evaluate(&ticket()));

        let doc = json!({"assignee": null});
        let cond = Condition::new("assignee", Operator::IsSet, JsonValue::Null);
        assert!(!cond.evaluate(&doc));
    }

    #[test]
    fn nested_group_evaluation() {
        // status == open AND (plan == pro OR priority > 4)
        let group = ConditionGroup::all(vec![
            ConditionNode::Property(Condition::new("status", Operator::Equals, json!("open"))),
            ConditionNode::Group(ConditionGroup::any(vec![
                ConditionNode::Property(Condition::new(
                    "customer.plan",
                    Operator::Equals,
                    json!("pro"),
                )),
                ConditionNode::Property(Condition::new(
                    "priority",
                    Operator::GreaterThan,
                    json!(4),
                )),
            ])),
        ]);

        assert!(group.evaluate(&ticket()));
    }

    #[test]
    fn empty_groups() {
        let target = ticket();
        assert!(ConditionGroup::all(vec![]).evaluate(&target));
        assert!(!ConditionGroup::any(vec![]).evaluate(&target));
    }

    #[test]
    fn condition_serde_roundtrip() {
        let group = ConditionGroup::all(vec![ConditionNode::Property(Condition::new(
            "status",
            Operator::Equals,
            json!("open"),
        ))]);

        let encoded = serde_json::to_string(&group).expect("serialize");
        let parsed: ConditionGroup = serde_json::from_str(&encoded).expect("deserialize");
        assert_eq!(group, parsed);
    }
}
