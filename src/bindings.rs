//! Persistent binding store.
//!
//! [`Bindings`] is a layered lookup chain: every registration allocates a new
//! frame pointing at its parent, so a derived store never leaks writes back to
//! the store it was derived from. Cloning is a reference-count bump.

use std::fmt;
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::expression::Compilers;
use crate::mutate::{mutate, TemplateError};

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^\w+$").expect("valid identifier regex");
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BindingError {
    #[error("invalid binding name {0}")]
    InvalidName(String),
    #[error("binding name must evaluate to a string, got {0}")]
    NameNotString(Value),
    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// A named value declared in a test document. Both the name and the value
/// may hold embedded expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    pub name: String,
    pub value: Value,
}

impl Binding {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

struct Frame {
    name: String,
    value: Value,
    parent: Option<Arc<Frame>>,
}

#[derive(Clone, Default)]
pub struct Bindings {
    head: Option<Arc<Frame>>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new store with `name` bound to `value`.
    ///
    /// A leading `$` sigil is accepted and ignored. Later registrations shadow
    /// earlier ones with the same name.
    pub fn register(&self, name: &str, value: Value) -> Result<Bindings, BindingError> {
        let name = name.strip_prefix('$').unwrap_or(name);
        check_binding_name(name)?;
        Ok(Bindings {
            head: Some(Arc::new(Frame {
                name: name.to_string(),
                value,
                parent: self.head.clone(),
            })),
        })
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        let name = name.strip_prefix('$').unwrap_or(name);
        let mut current = self.head.as_deref();
        while let Some(frame) = current {
            if frame.name == name {
                return Some(&frame.value);
            }
            current = frame.parent.as_deref();
        }
        None
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Visible names, innermost first, without duplicates.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let mut current = self.head.as_deref();
        while let Some(frame) = current {
            if !names.iter().any(|n| n == &frame.name) {
                names.push(frame.name.clone());
            }
            current = frame.parent.as_deref();
        }
        names
    }
}

impl fmt::Debug for Bindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for name in self.names() {
            map.entry(&name, &self.get(&name));
        }
        map.finish()
    }
}

pub fn check_binding_name(name: &str) -> Result<(), BindingError> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(BindingError::InvalidName(name.to_string()))
    }
}

/// Resolves the name and value of `binding`. The value is templated with
/// `input` as the projection root.
pub fn resolve_binding(
    bindings: &Bindings,
    compilers: &Compilers,
    input: &Value,
    binding: &Binding,
) -> Result<(String, Value), BindingError> {
    let name = match mutate(
        &Value::String(binding.name.clone()),
        &Value::Null,
        bindings,
        compilers,
    )? {
        Value::String(name) => name,
        other => return Err(BindingError::NameNotString(other)),
    };
    check_binding_name(&name)?;
    let value = mutate(&binding.value, input, bindings, compilers)?;
    Ok((name, value))
}

/// Registers `declared` in order; later bindings can reference earlier ones.
pub fn register_bindings(
    bindings: &Bindings,
    compilers: &Compilers,
    declared: &[Binding],
) -> Result<Bindings, BindingError> {
    let mut bindings = bindings.clone();
    for binding in declared {
        let (name, value) = resolve_binding(&bindings, compilers, &Value::Null, binding)?;
        bindings = bindings.register(&name, value)?;
    }
    Ok(bindings)
}
