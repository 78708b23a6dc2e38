use thiserror::Error;

use crate::bindings::BindingError;
use crate::check::CheckError;
use crate::client::{ClientError, WaitError};
use crate::config::ConfigError;
use crate::context::ContextError;
use crate::expression::ExpressionError;
use crate::mutate::TemplateError;
use crate::namespacer::NamespacerError;
use crate::operations::OperationError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Binding error: {0}")]
    Binding(#[from] BindingError),
    #[error("Expression error: {0}")]
    Expression(#[from] ExpressionError),
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),
    #[error("Check error: {0}")]
    Check(#[from] CheckError),
    #[error("Client error: {0}")]
    Client(#[from] ClientError),
    #[error("Namespacer error: {0}")]
    Namespacer(#[from] NamespacerError),
    // operation failures are already rendered with their diagnostic
    #[error(transparent)]
    Operation(#[from] OperationError),
    #[error("Cleanup error: {0}")]
    Cleanup(#[from] WaitError),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ChainsawResult<T> = Result<T, Error>;

impl Error {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }
}
