//! Structured operation events.
//!
//! Every event is a `tracing` event carrying an `operation` and a `status`
//! field, plus the resource it is about when there is one.

use std::fmt::Display;

use strum_macros::{AsRefStr, Display};

use crate::client::ObjectKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    Apply,
    Assert,
    Catch,
    Cleanup,
    #[strum(serialize = "CMD")]
    Command,
    Create,
    Delete,
    Error,
    Finally,
    Patch,
    Script,
    Sleep,
    Stderr,
    Stdout,
    Try,
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Begin,
    Done,
    End,
    Error,
    Log,
    Run,
    Warn,
}

fn resource_field(resource: Option<&ObjectKey>) -> String {
    resource.map(ToString::to_string).unwrap_or_default()
}

pub fn log(operation: Operation, status: Status, resource: Option<&ObjectKey>, message: &str) {
    let resource = resource_field(resource);
    match status {
        Status::Error => tracing::error!(
            operation = operation.as_ref(),
            status = status.as_ref(),
            resource = %resource,
            "{}",
            message
        ),
        Status::Warn => tracing::warn!(
            operation = operation.as_ref(),
            status = status.as_ref(),
            resource = %resource,
            "{}",
            message
        ),
        _ => tracing::info!(
            operation = operation.as_ref(),
            status = status.as_ref(),
            resource = %resource,
            "{}",
            message
        ),
    }
}

pub fn log_start(operation: Operation, resource: Option<&ObjectKey>) {
    log(operation, Status::Run, resource, "");
}

/// Terminal event of an operation: `DONE` on success, `ERROR` with the
/// rendered error otherwise.
pub fn log_end<T, E: Display>(
    operation: Operation,
    resource: Option<&ObjectKey>,
    result: &Result<T, E>,
) {
    match result {
        Ok(_) => log(operation, Status::Done, resource, ""),
        Err(e) => log(operation, Status::Error, resource, &e.to_string()),
    }
}

/// A named block of text, such as captured command output.
pub fn log_section(operation: Operation, name: Operation, body: &str) {
    log(
        operation,
        Status::Log,
        None,
        &format!("=== {}\n{}", name, body.trim_end()),
    );
}
