use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::{check, CheckError};
use crate::bindings::Bindings;
use crate::expression::Compilers;
use crate::field::{AggregateError, Violations};

/// A check gated by an optional match filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expectation {
    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    pub match_: Option<Value>,
    pub check: Value,
}

impl Expectation {
    pub fn new(check: Value) -> Self {
        Self {
            match_: None,
            check,
        }
    }

    pub fn with_match(mut self, filter: Value) -> Self {
        self.match_ = Some(filter);
        self
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpectError {
    #[error(transparent)]
    Check(#[from] CheckError),
    #[error(transparent)]
    Failed(#[from] AggregateError),
}

/// Runs `expectations` in order against `obj`.
///
/// Returns whether any expectation's match held, and the combined violations
/// of every check that ran. An expectation whose match fails is skipped and
/// contributes nothing, and so does one whose match cannot be evaluated. A
/// check that cannot be evaluated ends the evaluation with that error.
pub fn expect(
    obj: &Value,
    bindings: &Bindings,
    compilers: &Compilers,
    expectations: &[Expectation],
) -> (bool, Result<(), ExpectError>) {
    let mut matched = false;
    let mut results = Violations::new();
    for expectation in expectations {
        if let Some(filter) = expectation.match_.as_ref().filter(|m| !m.is_null()) {
            match check(obj, filter, bindings, compilers) {
                Ok(violations) if violations.is_empty() => {}
                Ok(_) => continue,
                Err(e) => {
                    tracing::debug!("skipping expectation, match failed: {}", e);
                    continue;
                }
            }
        }
        matched = true;
        match check(obj, &expectation.check, bindings, compilers) {
            Err(e) => return (true, Err(ExpectError::Check(e))),
            Ok(violations) => results.extend(violations),
        }
    }
    match results.into_error() {
        Some(e) => (matched, Err(ExpectError::Failed(e))),
        None => (matched, Ok(())),
    }
}
