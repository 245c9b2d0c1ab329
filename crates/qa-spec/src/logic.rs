//! JSON-encoded branching rules (`display_if`, `required_if`).
//!
//! A rule is either a literal or a single-key object mapping an operator name
//! to its operands. Rules are compiled once into [`Rule`] and evaluated against
//! a [`Context`]. Malformed operands and unknown operators evaluate to `false`
//! so a broken rule hides a question instead of failing the session.

use std::cmp::Ordering;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::context::Context;

static NULL: Value = Value::Null;

/// Closed set of supported operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Var,
    Equal,
    StrictEqual,
    NotEqual,
    StrictNotEqual,
    In,
    And,
    Or,
    Not,
    Negate,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
    If,
}

impl Operator {
    pub const ALL: [Operator; 15] = [
        Operator::Var,
        Operator::Equal,
        Operator::StrictEqual,
        Operator::NotEqual,
        Operator::StrictNotEqual,
        Operator::In,
        Operator::And,
        Operator::Or,
        Operator::Not,
        Operator::Negate,
        Operator::Greater,
        Operator::GreaterOrEqual,
        Operator::Less,
        Operator::LessOrEqual,
        Operator::If,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operator::Var => "var",
            Operator::Equal => "==",
            Operator::StrictEqual => "===",
            Operator::NotEqual => "!=",
            Operator::StrictNotEqual => "!==",
            Operator::In => "in",
            Operator::And => "and",
            Operator::Or => "or",
            Operator::Not => "not",
            Operator::Negate => "!",
            Operator::Greater => ">",
            Operator::GreaterOrEqual => ">=",
            Operator::Less => "<",
            Operator::LessOrEqual => "<=",
            Operator::If => "if",
        }
    }
}

/// Operands as written: a bare value or an argument list.
#[derive(Debug, Clone, PartialEq)]
pub enum Operands {
    Single(Box<Rule>),
    List(Vec<Rule>),
}

impl Operands {
    fn compile(value: &Value) -> Self {
        match value {
            Value::Array(items) => Operands::List(items.iter().map(Rule::compile).collect()),
            other => Operands::Single(Box::new(Rule::compile(other))),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Operands::Single(rule) => rule.to_value(),
            Operands::List(rules) => Value::Array(rules.iter().map(Rule::to_value).collect()),
        }
    }

    fn pair(&self) -> Option<(&Rule, &Rule)> {
        match self {
            Operands::List(rules) if rules.len() == 2 => Some((&rules[0], &rules[1])),
            _ => None,
        }
    }

    fn unary(&self) -> Option<&Rule> {
        match self {
            Operands::Single(rule) => Some(rule),
            Operands::List(rules) if rules.len() == 1 => Some(&rules[0]),
            Operands::List(_) => None,
        }
    }
}

/// Compiled rule tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    /// Anything that is not a single-key object evaluates to itself.
    Literal(Value),
    Apply { op: Operator, operands: Operands },
    Unknown { name: String, operands: Value },
}

/// Result of evaluating a rule.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// `var` found nothing at the requested path.
    Undefined,
    /// `if` whose condition failed and that has no else branch.
    NoValue,
    Value(Value),
}

impl Outcome {
    pub fn is_truthy(&self) -> bool {
        match self {
            Outcome::Undefined | Outcome::NoValue => false,
            Outcome::Value(value) => truthy(value),
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Outcome::Undefined)
    }

    /// Borrowed JSON view. `NoValue` reads as null, `Undefined` as nothing.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Outcome::Undefined => None,
            Outcome::NoValue => Some(&NULL),
            Outcome::Value(value) => Some(value),
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Outcome::Undefined => None,
            Outcome::NoValue => Some(Value::Null),
            Outcome::Value(value) => Some(value),
        }
    }
}

impl From<bool> for Outcome {
    fn from(value: bool) -> Self {
        Outcome::Value(Value::Bool(value))
    }
}

impl From<Value> for Outcome {
    fn from(value: Value) -> Self {
        Outcome::Value(value)
    }
}

impl Rule {
    pub fn compile(value: &Value) -> Self {
        let Value::Object(map) = value else {
            return Rule::Literal(value.clone());
        };
        if map.len() != 1 {
            return Rule::Literal(value.clone());
        }
        let Some((name, operands)) = map.iter().next() else {
            return Rule::Literal(value.clone());
        };
        match Operator::from_name(name) {
            Some(op) => Rule::Apply {
                op,
                operands: Operands::compile(operands),
            },
            None => Rule::Unknown {
                name: name.clone(),
                operands: operands.clone(),
            },
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Rule::Literal(value) => value.clone(),
            Rule::Apply { op, operands } => {
                let mut map = Map::new();
                map.insert(op.name().to_string(), operands.to_value());
                Value::Object(map)
            }
            Rule::Unknown { name, operands } => {
                let mut map = Map::new();
                map.insert(name.clone(), operands.clone());
                Value::Object(map)
            }
        }
    }

    pub fn evaluate(&self, ctx: &Context) -> Outcome {
        match self {
            Rule::Literal(value) => Outcome::Value(value.clone()),
            Rule::Apply { op, operands } => apply(*op, operands, ctx),
            Rule::Unknown { name, .. } => {
                tracing::warn!(operator = %name, "unknown rule operator, evaluating to false");
                Outcome::from(false)
            }
        }
    }

    /// Shorthand for `evaluate(..).is_truthy()`.
    pub fn holds(&self, ctx: &Context) -> bool {
        self.evaluate(ctx).is_truthy()
    }
}

impl Serialize for Rule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Rule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(|value| Rule::compile(&value))
    }
}

/// Evaluates a raw JSON rule against `ctx`.
pub fn evaluate(rule: &Value, ctx: &Context) -> Outcome {
    Rule::compile(rule).evaluate(ctx)
}

fn apply(op: Operator, operands: &Operands, ctx: &Context) -> Outcome {
    match op {
        Operator::Var => match var_path(operands) {
            Some(path) => ctx
                .lookup(&path)
                .map(Outcome::Value)
                .unwrap_or(Outcome::Undefined),
            None => Outcome::from(false),
        },
        Operator::Equal | Operator::StrictEqual => binary(operands, ctx, |left, right| {
            outcomes_equal(&left, &right)
        }),
        Operator::NotEqual | Operator::StrictNotEqual => binary(operands, ctx, |left, right| {
            !outcomes_equal(&left, &right)
        }),
        Operator::In => binary(operands, ctx, |needle, haystack| match haystack.as_value() {
            Some(Value::Array(items)) => items
                .iter()
                .any(|item| outcomes_equal(&needle, &Outcome::Value(item.clone()))),
            _ => false,
        }),
        Operator::And => match operands {
            Operands::List(rules) => Outcome::from(rules.iter().all(|rule| rule.holds(ctx))),
            Operands::Single(_) => Outcome::from(false),
        },
        Operator::Or => match operands {
            Operands::List(rules) => Outcome::from(rules.iter().any(|rule| rule.holds(ctx))),
            Operands::Single(_) => Outcome::from(false),
        },
        Operator::Not | Operator::Negate => match operands.unary() {
            Some(rule) => Outcome::from(!rule.holds(ctx)),
            None => Outcome::from(false),
        },
        Operator::Greater => binary(operands, ctx, |left, right| {
            compare(&left, &right) == Some(Ordering::Greater)
        }),
        Operator::GreaterOrEqual => binary(operands, ctx, |left, right| {
            matches!(compare(&left, &right), Some(Ordering::Greater | Ordering::Equal))
        }),
        Operator::Less => binary(operands, ctx, |left, right| {
            compare(&left, &right) == Some(Ordering::Less)
        }),
        Operator::LessOrEqual => binary(operands, ctx, |left, right| {
            matches!(compare(&left, &right), Some(Ordering::Less | Ordering::Equal))
        }),
        Operator::If => match operands {
            Operands::List(rules) if rules.len() >= 2 => {
                if rules[0].holds(ctx) {
                    rules[1].evaluate(ctx)
                } else if let Some(otherwise) = rules.get(2) {
                    otherwise.evaluate(ctx)
                } else {
                    Outcome::NoValue
                }
            }
            _ => Outcome::NoValue,
        },
    }
}

fn binary(
    operands: &Operands,
    ctx: &Context,
    check: impl FnOnce(Outcome, Outcome) -> bool,
) -> Outcome {
    match operands.pair() {
        Some((left, right)) => Outcome::from(check(left.evaluate(ctx), right.evaluate(ctx))),
        None => Outcome::from(false),
    }
}

fn var_path(operands: &Operands) -> Option<String> {
    match operands.unary()? {
        Rule::Literal(Value::String(path)) => Some(path.clone()),
        Rule::Literal(Value::Number(index)) => Some(index.to_string()),
        Rule::Literal(Value::Null) => Some(String::new()),
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn outcomes_equal(left: &Outcome, right: &Outcome) -> bool {
    match (left.as_value(), right.as_value()) {
        (Some(left), Some(right)) => strict_equals(left, right),
        (None, None) => true,
        _ => false,
    }
}

/// Equality without type coercion. Numbers compare by value, so `1` and
/// `1.0` are equal; arrays and objects compare structurally.
pub fn strict_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| strict_equals(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(key, x)| b.get(key).is_some_and(|y| strict_equals(x, y)))
        }
        _ => false,
    }
}

fn compare(left: &Outcome, right: &Outcome) -> Option<Ordering> {
    if let (Some(Value::String(a)), Some(Value::String(b))) = (left.as_value(), right.as_value()) {
        return Some(a.cmp(b));
    }
    let a = to_number(left)?;
    let b = to_number(right)?;
    a.partial_cmp(&b)
}

fn to_number(outcome: &Outcome) -> Option<f64> {
    match outcome.as_value()? {
        Value::Null => Some(0.0),
        Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        Value::Number(number) => number.as_f64(),
        Value::String(text) if text.trim().is_empty() => Some(0.0),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        Value::Array(_) | Value::Object(_) => None,
    }
}
