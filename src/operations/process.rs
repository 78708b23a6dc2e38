use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use serde_json::Value;
use tempfile::NamedTempFile;

use super::internal::register_envs;
use super::{OperationError, OperationResult};
use crate::bindings::{Binding, Bindings};
use crate::check::check;
use crate::context::ExecutionContext;
use crate::expression::Compilers;
use crate::logging::{self, Operation};
use crate::outputs::{self, Output};

/// Everything an external process invocation needs besides the program
/// itself. Shared by [`Command`](super::Command) and
/// [`Script`](super::Script).
#[derive(Debug, Clone, Default)]
pub struct Process {
    compilers: Compilers,
    namespace: String,
    base_path: PathBuf,
    work_dir: Option<PathBuf>,
    env: Vec<Binding>,
    kubeconfig: Option<String>,
    check: Option<Value>,
    outputs: Vec<Output>,
    skip_log_output: bool,
}

/// Captured output of a finished process.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(super) struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CapturedOutput {
    /// Non-empty streams, in `STDOUT`, `STDERR` order.
    pub fn sections(&self) -> Vec<(Operation, &str)> {
        [
            (Operation::Stdout, self.stdout.as_str()),
            (Operation::Stderr, self.stderr.as_str()),
        ]
        .into_iter()
        .filter(|(_, body)| !body.is_empty())
        .collect()
    }
}

fn exit_error(status: ExitStatus) -> Option<OperationError> {
    if status.success() {
        return None;
    }
    Some(OperationError::Exit(match status.code() {
        Some(code) => format!("exit status {}", code),
        None => "signal: killed".to_string(),
    }))
}

impl Process {
    pub fn new(compilers: Compilers, namespace: impl Into<String>) -> Self {
        Self {
            compilers,
            namespace: namespace.into(),
            base_path: PathBuf::from("."),
            ..Self::default()
        }
    }

    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = path.into();
        self
    }

    /// Relative to the base path unless absolute.
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    pub fn with_env(mut self, env: Vec<Binding>) -> Self {
        self.env = env;
        self
    }

    /// Credentials of the bound cluster, exposed to the process through a
    /// transient `KUBECONFIG` file.
    pub fn with_kubeconfig(mut self, kubeconfig: impl Into<String>) -> Self {
        self.kubeconfig = Some(kubeconfig.into());
        self
    }

    pub fn with_check(mut self, check: Value) -> Self {
        self.check = Some(check);
        self
    }

    pub fn with_outputs(mut self, outputs: Vec<Output>) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn with_skip_log_output(mut self, skip: bool) -> Self {
        self.skip_log_output = skip;
        self
    }

    pub(super) fn envs(&self, bindings: &Bindings) -> Result<BTreeMap<String, String>, OperationError> {
        register_envs(&self.compilers, &self.namespace, bindings, &self.env)
    }

    fn current_dir(&self) -> PathBuf {
        match &self.work_dir {
            Some(dir) => self.base_path.join(dir),
            None => self.base_path.clone(),
        }
    }

    fn write_kubeconfig(&self) -> Result<Option<NamedTempFile>, OperationError> {
        let Some(kubeconfig) = &self.kubeconfig else {
            return Ok(None);
        };
        let mut file = tempfile::Builder::new()
            .prefix("chainsaw-kubeconfig-")
            .tempfile()?;
        file.write_all(kubeconfig.as_bytes())?;
        file.flush()?;
        Ok(Some(file))
    }

    /// Runs `program` to completion and turns its outcome into bindings,
    /// check verdict and outputs.
    pub(super) async fn run(
        &self,
        ctx: &ExecutionContext,
        bindings: &Bindings,
        operation: Operation,
        program: &str,
        args: Vec<String>,
        envs: BTreeMap<String, String>,
    ) -> OperationResult {
        let kubeconfig = self.write_kubeconfig()?;
        let result = self
            .spawn(ctx, bindings, operation, program, args, envs, kubeconfig.as_ref().map(NamedTempFile::path))
            .await;
        if let Some(file) = kubeconfig {
            if let Err(e) = file.close() {
                logging::log(operation, logging::Status::Warn, None, &e.to_string());
            }
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn spawn(
        &self,
        ctx: &ExecutionContext,
        bindings: &Bindings,
        operation: Operation,
        program: &str,
        args: Vec<String>,
        envs: BTreeMap<String, String>,
        kubeconfig: Option<&Path>,
    ) -> OperationResult {
        let mut cmd = tokio::process::Command::new(program);
        cmd.args(&args)
            .envs(&envs)
            .current_dir(self.current_dir())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(path) = kubeconfig {
            cmd.env("KUBECONFIG", path);
        }
        logging::log(
            operation,
            logging::Status::Run,
            None,
            &format!("{} {}", program, args.join(" ")),
        );
        let output = tokio::select! {
            output = cmd.output() => output?,
            e = ctx.done() => return Err(e.into()),
        };
        let captured = CapturedOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        if !self.skip_log_output {
            for (name, body) in captured.sections() {
                logging::log_section(operation, name, body);
            }
        }
        self.evaluate(bindings, captured, exit_error(output.status))
    }

    pub(super) fn evaluate(
        &self,
        bindings: &Bindings,
        captured: CapturedOutput,
        error: Option<OperationError>,
    ) -> OperationResult {
        let bindings = bindings
            .register("stdout", Value::String(captured.stdout))?
            .register("stderr", Value::String(captured.stderr))?
            .register(
                "error",
                error
                    .as_ref()
                    .map_or(Value::Null, |e| Value::String(e.to_string())),
            )?;
        let verdict = match self.check.as_ref().filter(|c| !c.is_null()) {
            Some(expected) => check(&Value::Null, expected, &bindings, &self.compilers)?.into_error().map(Into::into),
            None => error,
        };
        if let Some(e) = verdict {
            return Err(e);
        }
        Ok(outputs::process(&bindings, &self.compilers, &Value::Null, &self.outputs)?)
    }
}
