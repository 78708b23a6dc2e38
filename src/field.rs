//! Field paths and field-level violations.
//!
//! A [`FieldPath`] is built incrementally while walking a document
//! (`spec.containers[0].image`) and a [`Violation`] records what went wrong at
//! that path. [`Violations`] is the aggregate check result handed back by the
//! checker and the expectation evaluator.

use std::fmt;

use serde_json::Value;
use strum_macros::{AsRefStr, Display};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

/// Path of a field inside a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldPath {
    segments: Vec<Segment>,
}

impl FieldPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn child(&self, key: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Key(key.into()));
        Self { segments }
    }

    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Index(index));
        Self { segments }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Key(key) if i == 0 => write!(f, "{}", key)?,
                Segment::Key(key) => write!(f, ".{}", key)?,
                Segment::Index(index) => write!(f, "[{}]", index)?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
pub enum ViolationKind {
    #[strum(serialize = "Required value")]
    Required,
    #[strum(serialize = "Invalid value")]
    Invalid,
    #[strum(serialize = "Invalid type")]
    TypeInvalid,
    #[strum(serialize = "Internal error")]
    Internal,
}

/// A single field-level failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub struct Violation {
    pub kind: ViolationKind,
    pub field: String,
    pub bad_value: Option<Value>,
    pub detail: String,
}

impl Violation {
    pub fn required(path: &FieldPath, detail: impl Into<String>) -> Self {
        Self::new(ViolationKind::Required, path, None, detail)
    }

    pub fn invalid(path: &FieldPath, value: &Value, detail: impl Into<String>) -> Self {
        Self::new(ViolationKind::Invalid, path, Some(value.clone()), detail)
    }

    pub fn type_invalid(path: &FieldPath, value: &Value, detail: impl Into<String>) -> Self {
        Self::new(ViolationKind::TypeInvalid, path, Some(value.clone()), detail)
    }

    pub fn internal(path: &FieldPath, detail: impl Into<String>) -> Self {
        Self::new(ViolationKind::Internal, path, None, detail)
    }

    fn new(
        kind: ViolationKind,
        path: &FieldPath,
        bad_value: Option<Value>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            field: path.to_string(),
            bad_value,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.field.is_empty() {
            write!(f, "{}: ", self.field)?;
        }
        write!(f, "{}", self.kind)?;
        if let Some(value) = &self.bad_value {
            write!(f, ": {}", value)?;
        }
        if !self.detail.is_empty() {
            write!(f, ": {}", self.detail)?;
        }
        Ok(())
    }
}

/// Aggregate check result. Empty means the check passed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Violations(Vec<Violation>);

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, violation: Violation) {
        self.0.push(violation);
    }

    pub fn extend(&mut self, other: Violations) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Violation> {
        self.0.iter()
    }

    /// Rendered lines, sorted so repeated runs produce identical output.
    pub fn sorted_lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self.0.iter().map(|v| v.to_string()).collect();
        lines.sort();
        lines
    }

    /// Converts into a combined error, `None` when there is nothing to report.
    pub fn into_error(self) -> Option<AggregateError> {
        if self.0.is_empty() {
            None
        } else {
            Some(AggregateError(self))
        }
    }
}

impl From<Vec<Violation>> for Violations {
    fn from(value: Vec<Violation>) -> Self {
        Self(value)
    }
}

impl IntoIterator for Violations {
    type Item = Violation;
    type IntoIter = std::vec::IntoIter<Violation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Non-empty [`Violations`] viewed as a single error.
#[derive(Debug, Clone, PartialEq, Error)]
pub struct AggregateError(pub Violations);

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines = self.0.sorted_lines();
        if lines.len() == 1 {
            write!(f, "{}", lines[0])
        } else {
            write!(f, "[{}]", lines.join(", "))
        }
    }
}
