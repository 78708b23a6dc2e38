//! Human-readable diagnostics for failed resource expectations.

mod diff;

pub use diff::pretty_diff;

use std::fmt;

use serde_json::Value;

use crate::bindings::Bindings;
use crate::client::Resource;
use crate::expression::Compilers;
use crate::field::Violations;
use crate::mutate::template_and_merge;

/// A resource that did not satisfy an expectation.
///
/// Renders a header naming the resource, the sorted violation lines and a
/// unified diff between the expected document (re-templated when templating
/// is enabled) and the actual one.
#[derive(Debug, Clone)]
pub struct ResourceError {
    expected: Value,
    actual: Resource,
    template: Option<(Bindings, Compilers)>,
    violations: Violations,
}

impl ResourceError {
    pub fn new(expected: Value, actual: Resource, violations: Violations) -> Self {
        Self {
            expected,
            actual,
            template: None,
            violations,
        }
    }

    /// Re-renders the expected document with `bindings` before diffing.
    pub fn with_template(mut self, bindings: Bindings, compilers: Compilers) -> Self {
        self.template = Some((bindings, compilers));
        self
    }

    pub fn violations(&self) -> &Violations {
        &self.violations
    }

    pub fn actual(&self) -> &Resource {
        &self.actual
    }
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header = self.actual.key().to_string();
        let separator = "-".repeat(header.len());
        let mut lines = vec![separator.clone(), header, separator];
        lines.extend(
            self.violations
                .sorted_lines()
                .into_iter()
                .map(|line| format!("* {}", line)),
        );

        let mut expected = self.expected.clone();
        if let Some((bindings, compilers)) = &self.template {
            match template_and_merge(
                expected.clone(),
                bindings,
                compilers,
                std::slice::from_ref(&expected),
            ) {
                Ok(merged) => expected = merged,
                Err(e) => lines.push(format!(
                    "* ERROR: failed to compute expected template: {}",
                    e
                )),
            }
        }

        match pretty_diff(&expected, self.actual.as_value()) {
            Ok(diff) => {
                lines.push(String::new());
                lines.push(diff.trim_end().to_string());
            }
            Err(e) => lines.push(format!("* {}", e)),
        }
        write!(f, "{}", lines.join("\n"))
    }
}

impl std::error::Error for ResourceError {}
