//! Layer 6: Schema rules
//!
//! A declarative constraint set checked against the working clone before a
//! change commits. Rules assert the JSON type at a `$`-rooted path; every
//! rule is evaluated and violations are collected, not short-circuited.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::root::{Element, Root};
use crate::value::Value;

/// The JSON type a rule expects at its path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    Object,
    String,
    Number,
    Boolean,
    Null,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::Object => "object",
            RuleKind::String => "string",
            RuleKind::Number => "number",
            RuleKind::Boolean => "boolean",
            RuleKind::Null => "null",
        }
    }

    fn matches(&self, element: &Element) -> bool {
        match (self, element) {
            (RuleKind::Object, Element::Object(_)) => true,
            (RuleKind::String, Element::Primitive(Value::Str(_))) => true,
            (RuleKind::Number, Element::Primitive(Value::Long(_))) => true,
            (RuleKind::Number, Element::Primitive(Value::Double(_))) => true,
            (RuleKind::Boolean, Element::Primitive(Value::Bool(_))) => true,
            (RuleKind::Null, Element::Primitive(Value::Null)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One constraint: the element at `path` must exist and be of `kind`.
///
/// Paths are `$`-rooted and dot-separated: `$.user.name`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub path: String,
    pub kind: RuleKind,
}

impl Rule {
    pub fn new(path: impl Into<String>, kind: RuleKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
}

/// Check every rule against the live tree.
pub fn validate(root: &Root, rules: &[Rule]) -> ValidationResult {
    let mut errors = Vec::new();
    for rule in rules {
        match resolve(root, &rule.path) {
            Some(element) if rule.kind.matches(element) => {}
            Some(_) => errors.push(ValidationError {
                path: rule.path.clone(),
                message: format!("expected {} at {}", rule.kind, rule.path),
            }),
            None => errors.push(ValidationError {
                path: rule.path.clone(),
                message: format!("missing {} at {}", rule.kind, rule.path),
            }),
        }
    }
    ValidationResult {
        valid: errors.is_empty(),
        errors,
    }
}

fn resolve<'a>(root: &'a Root, path: &str) -> Option<&'a Element> {
    let trimmed = path.strip_prefix("$.").or_else(|| path.strip_prefix('$'))?;
    if trimmed.is_empty() {
        return None;
    }
    let mut segs = trimmed.split('.');
    let first = segs.next()?;
    let mut element = root.object().get_live(first)?;
    for seg in segs {
        let Element::Object(node) = element else {
            return None;
        };
        element = node.get_live(seg)?;
    }
    Some(element)
}
