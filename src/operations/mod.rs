//! # Operations
//!
//! One state machine per verb. Each operation is built from its declaration
//! and the [`Services`] of the step it runs in, then executed against a
//! [`Bindings`] store under an [`ExecutionContext`]. The outputs it returns
//! are folded into the bindings of the following operations by the step
//! driver.
//!
//! Resource verbs share a skeleton: template the declared document, inject
//! the default namespace, log `RUN`, run the verb loop, log `DONE` or
//! `ERROR`, then extract the declared outputs.

mod apply;
mod assert;
mod command;
mod create;
mod delete;
mod internal;
mod patch;
mod process;
mod refute;
mod script;
mod sleep;
mod update;

pub use apply::Apply;
pub use assert::Assert;
pub use command::Command;
pub use create::Create;
pub use delete::Delete;
pub use patch::Patch;
pub use process::Process;
pub use refute::Refute;
pub use script::Script;
pub use sleep::Sleep;
pub use update::Update;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::bindings::{BindingError, Bindings};
use crate::check::{CheckError, ExpectError};
use crate::cleanup::Cleaner;
use crate::client::{Client, ClientError, ObjectKey, PropagationPolicy, WaitError};
use crate::context::{ContextError, ExecutionContext};
use crate::expression::Compilers;
use crate::field::AggregateError;
use crate::mutate::TemplateError;
use crate::namespacer::{Namespacer, NamespacerError};
use crate::outputs::{OutputError, Outputs};
use crate::report::ResourceError;

#[derive(Error, Debug)]
pub enum OperationError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Check(#[from] CheckError),
    #[error(transparent)]
    Expect(#[from] ExpectError),
    #[error(transparent)]
    Violations(#[from] AggregateError),
    #[error(transparent)]
    Namespacer(#[from] NamespacerError),
    #[error(transparent)]
    Binding(#[from] BindingError),
    #[error(transparent)]
    Output(#[from] OutputError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("the resource already exists in the cluster")]
    AlreadyExists,
    #[error("actual resource not found")]
    ActualNotFound,
    #[error("no actual resource found")]
    NoActualResource,
    #[error("expectation matched")]
    ExpectationMatched,
    #[error("{0} - resource matches expectation")]
    ResourceMatches(ObjectKey),
    #[error("value must be a string ({0})")]
    EnvNotString(String),
    #[error("{0}")]
    Exit(String),
    #[error("{}", join_errors(.0))]
    Combined(Vec<OperationError>),
}

fn join_errors(errors: &[OperationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

impl From<WaitError> for OperationError {
    fn from(e: WaitError) -> Self {
        match e {
            WaitError::Client(e) => Self::Client(e),
            WaitError::Context(e) => Self::Context(e),
        }
    }
}

impl OperationError {
    /// Folds several errors into one, keeping a lone error as is.
    pub fn combine(mut errors: Vec<OperationError>) -> Option<OperationError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Self::Combined(errors)),
        }
    }

    /// Worth another attempt inside a poll loop.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Client(e) if e.is_transient())
    }
}

pub type OperationResult = Result<Outputs, OperationError>;

#[async_trait]
pub trait Operation: Send + Sync {
    async fn exec(&self, ctx: &ExecutionContext, bindings: &Bindings) -> OperationResult;
}

/// What the operations of a step share: the cluster, the expression
/// compilers and the step's namespace handling.
#[derive(Clone)]
pub struct Services {
    pub client: Arc<dyn Client>,
    pub compilers: Compilers,
    pub namespacer: Option<Namespacer>,
    pub cleaner: Option<Cleaner>,
    pub poll_interval: Duration,
    pub propagation: PropagationPolicy,
    pub template: bool,
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("compilers", &self.compilers)
            .field("namespacer", &self.namespacer)
            .field("cleaner", &self.cleaner)
            .field("poll_interval", &self.poll_interval)
            .field("propagation", &self.propagation)
            .field("template", &self.template)
            .finish_non_exhaustive()
    }
}

impl Services {
    pub fn new(client: Arc<dyn Client>) -> Self {
        Self {
            client,
            compilers: Compilers::default(),
            namespacer: None,
            cleaner: None,
            poll_interval: Duration::from_secs(1),
            propagation: PropagationPolicy::default(),
            template: true,
        }
    }

    pub fn with_compilers(mut self, compilers: Compilers) -> Self {
        self.compilers = compilers;
        self
    }

    pub fn with_namespacer(mut self, namespacer: Namespacer) -> Self {
        self.namespacer = Some(namespacer);
        self
    }

    pub fn with_cleaner(mut self, cleaner: Cleaner) -> Self {
        self.cleaner = Some(cleaner);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_propagation(mut self, propagation: PropagationPolicy) -> Self {
        self.propagation = propagation;
        self
    }

    pub fn with_template(mut self, template: bool) -> Self {
        self.template = template;
        self
    }
}
