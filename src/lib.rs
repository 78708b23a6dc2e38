//! # Chainsaw: Declarative End-to-End Testing for Kubernetes-style Clusters
//!
//! A test is a sequence of steps. Each step runs operations (create, apply,
//! patch, update, delete, assert, error, command, script, sleep) against a
//! cluster and checks the outcome against *partial* resource documents that
//! may embed expressions.
//!
//! ## Documents and Expressions
//!
//! - Binding store ([`bindings`]): persistent name to value map threaded
//!   through every operation
//! - Expressions ([`expression`], [`tokenizer`]): the built-in `jp` dialect
//!   and the [`expression::Compiler`] seam for others
//! - Templates ([`mutate`]): evaluate every embedded `(expression)` in a
//!   document
//! - Checks ([`check`]): subset matching that reports field-precise
//!   [`field::Violation`]s
//! - Outputs ([`outputs`]): named values extracted after an operation
//!
//! ## Cluster Access
//!
//! - Client capability ([`client`]): Get/List/Create/Update/Patch/Delete
//! - Default namespace injection ([`namespacer`])
//! - Reverse-order teardown ([`cleanup`])
//!
//! ## Execution
//!
//! ```text
//! Test → Step (try / catch / finally) → Operation → Client
//! ```
//!
//! - Operation state machines ([`operations`]), one per verb
//! - Deadlines and cancellation ([`context`])
//! - Step driver and parallel test runner ([`runner`])
//! - Diagnostics ([`report`], [`logging`])

pub mod bindings;
pub mod check;
pub mod cleanup;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod expression;
pub mod field;
pub mod logging;
pub mod model;
pub mod mutate;
pub mod namespacer;
pub mod operations;
pub mod outputs;
pub mod report;
pub mod runner;
pub mod tokenizer;

// Re-exports
pub use bindings::{Binding, Bindings};
pub use client::{Client, ClientError, ObjectKey, Resource};
pub use config::Configuration;
pub use context::ExecutionContext;
pub use error::*;
pub use model::Test;
pub use runner::{TestReport, TestRunner};

#[cfg(test)]
mod tests {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    #[ctor::ctor]
    fn init_tests() {
        // テストの前に一度だけ実行したい処理
        // tracing_subscriberの初期化
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .expect("Failed to set tracing subscriber");
    }
}
