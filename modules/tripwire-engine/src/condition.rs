//! Built-in conditions: payload field comparison and caller predicates.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use tripwire_events::Event;

use crate::context::Context;
use crate::error::EngineError;
use crate::traits::Condition;

/// Comparison operator for `FieldCondition`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CompareOp {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    /// Substring match on the string form of both operands.
    Contains,
    /// Prefix match on the string form of both operands.
    StartsWith,
    /// Membership in a list-valued expected operand.
    In,
}

impl CompareOp {
    pub fn token(self) -> &'static str {
        match self {
            CompareOp::Equal => "eq",
            CompareOp::NotEqual => "neq",
            CompareOp::GreaterThan => "gt",
            CompareOp::GreaterOrEqual => "gte",
            CompareOp::LessThan => "lt",
            CompareOp::LessOrEqual => "lte",
            CompareOp::Contains => "contains",
            CompareOp::StartsWith => "startsWith",
            CompareOp::In => "in",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for CompareOp {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let op = match s {
            "eq" | "==" => CompareOp::Equal,
            "neq" | "!=" => CompareOp::NotEqual,
            "gt" | ">" => CompareOp::GreaterThan,
            "gte" | ">=" => CompareOp::GreaterOrEqual,
            "lt" | "<" => CompareOp::LessThan,
            "lte" | "<=" => CompareOp::LessOrEqual,
            "contains" => CompareOp::Contains,
            "startsWith" => CompareOp::StartsWith,
            "in" => CompareOp::In,
            other => {
                return Err(EngineError::InvalidCondition(format!(
                    "unknown operator '{other}'"
                )))
            }
        };
        Ok(op)
    }
}

/// Compares one field of the event payload against an expected value.
///
/// A missing field never matches, whatever the operator.
#[derive(Debug, Clone)]
pub struct FieldCondition {
    name: String,
    field: String,
    op: CompareOp,
    expected: Value,
}

impl FieldCondition {
    pub fn new(field: impl Into<String>, op: CompareOp, expected: impl Into<Value>) -> Self {
        let field = field.into();
        let expected = expected.into();
        let name = format!("{field} {op} {}", display_string(&expected));
        Self {
            name,
            field,
            op,
            expected,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn op(&self) -> CompareOp {
        self.op
    }

    pub fn expected(&self) -> &Value {
        &self.expected
    }

    fn matches(&self, actual: &Value) -> bool {
        match self.op {
            CompareOp::Equal => values_equal(actual, &self.expected),
            CompareOp::NotEqual => !values_equal(actual, &self.expected),
            CompareOp::GreaterThan => compare(actual, &self.expected) == Some(Ordering::Greater),
            CompareOp::GreaterOrEqual => matches!(
                compare(actual, &self.expected),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            CompareOp::LessThan => compare(actual, &self.expected) == Some(Ordering::Less),
            CompareOp::LessOrEqual => matches!(
                compare(actual, &self.expected),
                Some(Ordering::Less | Ordering::Equal)
            ),
            CompareOp::Contains => display_string(actual).contains(&display_string(&self.expected)),
            CompareOp::StartsWith => {
                display_string(actual).starts_with(&display_string(&self.expected))
            }
            CompareOp::In => match &self.expected {
                Value::Array(items) => items.iter().any(|item| values_equal(actual, item)),
                _ => false,
            },
        }
    }
}

impl Condition for FieldCondition {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, event: &Event, _context: &Context) -> bool {
        match event.get(&self.field) {
            Some(actual) => self.matches(actual),
            None => false,
        }
    }
}

/// Parses `"field op value"`, e.g. `"level gte 10"` or `"zone eq \"boss room\""`.
///
/// The value is read as `true`/`false`, a number, a JSON array, a
/// double-quoted string, or otherwise the bare remainder of the line.
impl FromStr for FieldCondition {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed =
            || EngineError::InvalidCondition(format!("expected 'field op value', got '{s}'"));
        let (field, rest) = next_token(s).ok_or_else(malformed)?;
        let (op, raw) = next_token(rest).ok_or_else(malformed)?;
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(malformed());
        }
        let op: CompareOp = op.parse()?;
        Ok(FieldCondition::new(field, op, parse_operand(raw)))
    }
}

/// Splits off the first whitespace-delimited token. Runs of whitespace count
/// as one separator.
fn next_token(s: &str) -> Option<(&str, &str)> {
    let (token, rest) = s.trim_start().split_once(char::is_whitespace)?;
    Some((token, rest.trim_start()))
}

fn parse_operand(raw: &str) -> Value {
    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Some(n) = parse_number(raw) {
        return Value::Number(n);
    }
    if raw.starts_with('[') {
        if let Ok(list @ Value::Array(_)) = serde_json::from_str::<Value>(raw) {
            return list;
        }
    }
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        return Value::String(raw[1..raw.len() - 1].to_string());
    }
    Value::String(raw.to_string())
}

type Predicate = dyn Fn(&Event, &Context) -> bool + Send + Sync;

/// Wraps a caller-supplied closure.
pub struct PredicateCondition {
    name: String,
    predicate: Box<Predicate>,
}

impl PredicateCondition {
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Event, &Context) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
        }
    }
}

impl Condition for PredicateCondition {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, event: &Event, context: &Context) -> bool {
        (self.predicate)(event, context)
    }
}

// ---------------------------------------------------------------------------
// Value comparison
// ---------------------------------------------------------------------------

/// Equality that treats `5` and `5.0` as the same number.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y) == Some(Ordering::Equal),
        _ => a == b,
    }
}

/// Orders `actual` against `expected` after coercing `expected` to the JSON
/// type of `actual`. `None` when no meaningful ordering exists.
fn compare(actual: &Value, expected: &Value) -> Option<Ordering> {
    match actual {
        Value::Number(a) => compare_numbers(a, &coerce_number(expected)?),
        Value::String(a) => Some(a.as_str().cmp(scalar_string(expected)?.as_str())),
        Value::Bool(a) => Some(a.cmp(&coerce_bool(expected)?)),
        _ => None,
    }
}

fn compare_numbers(a: &Number, b: &Number) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return Some(x.cmp(&y));
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return Some(x.cmp(&y));
    }
    a.as_f64()?.partial_cmp(&b.as_f64()?)
}

fn coerce_number(value: &Value) -> Option<Number> {
    match value {
        Value::Number(n) => Some(n.clone()),
        Value::String(s) => parse_number(s.trim()),
        _ => None,
    }
}

fn parse_number(raw: &str) -> Option<Number> {
    if let Ok(i) = raw.parse::<i64>() {
        return Some(Number::from(i));
    }
    if let Ok(u) = raw.parse::<u64>() {
        return Some(Number::from(u));
    }
    raw.parse::<f64>().ok().and_then(Number::from_f64)
}

fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// String form used by `Contains`/`StartsWith` and condition names:
/// strings unquoted, everything else as JSON text.
fn display_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn event(field: &str, value: Value) -> Event {
        Event::new("test").with(field, value)
    }

    fn check(op: CompareOp, expected: Value, actual: Value) -> bool {
        FieldCondition::new("x", op, expected).evaluate(&event("x", actual), &Context::new())
    }

    #[test]
    fn missing_field_never_matches() {
        let ctx = Context::new();
        let empty = Event::new("test");
        assert!(!FieldCondition::new("x", CompareOp::Equal, 5).evaluate(&empty, &ctx));
        assert!(!FieldCondition::new("x", CompareOp::NotEqual, 5).evaluate(&empty, &ctx));
    }

    #[test]
    fn equality_is_numeric_across_representations() {
        assert!(check(CompareOp::Equal, json!(5), json!(5)));
        assert!(check(CompareOp::Equal, json!(5), json!(5.0)));
        assert!(!check(CompareOp::Equal, json!(5), json!(3)));
        assert!(!check(CompareOp::Equal, json!(5), json!("5")));
        assert!(check(CompareOp::NotEqual, json!("fire"), json!("ice")));
    }

    #[test]
    fn ordering_coerces_expected_to_actual_type() {
        assert!(check(CompareOp::GreaterThan, json!(10), json!(11)));
        assert!(check(CompareOp::GreaterThan, json!("10"), json!(11)));
        assert!(check(CompareOp::GreaterOrEqual, json!(10), json!(10)));
        assert!(check(CompareOp::LessThan, json!(0.5), json!(0.25)));
        assert!(check(CompareOp::LessOrEqual, json!(-3), json!(-3)));
        assert!(check(CompareOp::LessThan, json!("b"), json!("a")));
        assert!(check(CompareOp::GreaterThan, json!(9), json!("a")));
    }

    #[test]
    fn incomparable_operands_do_not_match() {
        assert!(!check(CompareOp::GreaterThan, json!("many"), json!(11)));
        assert!(!check(CompareOp::LessThan, json!(5), json!(null)));
        assert!(!check(CompareOp::LessThan, json!([1]), json!(0)));
        assert!(!check(CompareOp::GreaterOrEqual, json!({"a": 1}), json!("x")));
    }

    #[test]
    fn string_operators_use_display_form() {
        assert!(check(CompareOp::Contains, json!("ire"), json!("fire_zone")));
        assert!(check(CompareOp::Contains, json!(23), json!(1234)));
        assert!(check(CompareOp::StartsWith, json!("fire"), json!("fire_zone")));
        assert!(!check(CompareOp::StartsWith, json!("zone"), json!("fire_zone")));
    }

    #[test]
    fn in_requires_list_operand() {
        assert!(check(CompareOp::In, json!(["gold", "vip"]), json!("vip")));
        assert!(check(CompareOp::In, json!([1, 2, 3]), json!(2.0)));
        assert!(!check(CompareOp::In, json!(["gold"]), json!("silver")));
        assert!(!check(CompareOp::In, json!("vip"), json!("vip")));
    }

    #[test]
    fn name_describes_comparison() {
        assert_eq!(FieldCondition::new("x", CompareOp::Equal, 5).name(), "x eq 5");
        assert_eq!(
            FieldCondition::new("zone_type", CompareOp::Equal, "fire").name(),
            "zone_type eq fire"
        );
    }

    #[test]
    fn parses_field_op_value_strings() {
        let cond: FieldCondition = "level gte 10".parse().unwrap();
        assert_eq!(cond.field(), "level");
        assert_eq!(cond.op(), CompareOp::GreaterOrEqual);
        assert_eq!(cond.expected(), &json!(10));

        let cond: FieldCondition = "zone eq \"boss room\"".parse().unwrap();
        assert_eq!(cond.expected(), &json!("boss room"));

        let cond: FieldCondition = "armed eq true".parse().unwrap();
        assert_eq!(cond.expected(), &json!(true));

        let cond: FieldCondition = "tier in [\"gold\", \"vip\"]".parse().unwrap();
        assert_eq!(cond.expected(), &json!(["gold", "vip"]));

        let cond: FieldCondition = "room startsWith living".parse().unwrap();
        assert_eq!(cond.expected(), &json!("living"));
    }

    #[test]
    fn tolerates_repeated_whitespace_between_tokens() {
        for raw in ["level  gte 10", "level gte   10", "  level\t gte\t10  "] {
            let cond: FieldCondition = raw.parse().unwrap();
            assert_eq!(cond.name(), "level gte 10", "parsing {raw:?}");
        }

        let cond: FieldCondition = "zone  eq  \"boss room\"".parse().unwrap();
        assert_eq!(cond.expected(), &json!("boss room"));
    }

    #[test]
    fn rejects_malformed_condition_strings() {
        assert!("level gte".parse::<FieldCondition>().is_err());
        assert!("level about 10".parse::<FieldCondition>().is_err());
        assert!("level gte   ".parse::<FieldCondition>().is_err());
    }

    #[test]
    fn predicate_sees_event_and_context() {
        let cond = PredicateCondition::new("level_check", |evt, ctx| {
            let needed = ctx.get_as::<i64>("min_level").unwrap_or(0);
            evt.get("level").and_then(Value::as_i64).unwrap_or(0) >= needed
        });
        let mut ctx = Context::new();
        ctx.set("min_level", 5);

        assert_eq!(cond.name(), "level_check");
        assert!(cond.evaluate(&event("level", json!(7)), &ctx));
        assert!(!cond.evaluate(&event("level", json!(2)), &ctx));
    }
}
