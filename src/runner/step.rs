use std::path::PathBuf;
use std::sync::Arc;

use crate::bindings::{register_bindings, Bindings};
use crate::cleanup::Cleaner;
use crate::client::{Client, Resource};
use crate::config::Configuration;
use crate::context::ExecutionContext;
use crate::error::{ChainsawResult, Error};
use crate::expression::Compilers;
use crate::logging::{self, Status};
use crate::model::{self, Action, ProcessOptions, Step};
use crate::namespacer::Namespacer;
use crate::operations::{
    Apply, Assert, Command, Create, Delete, Operation, Patch, Process, Refute, Script, Services,
    Sleep, Update,
};

#[derive(Debug, Default)]
pub(crate) struct StepReport {
    pub failed: bool,
    pub errors: Vec<Error>,
}

impl StepReport {
    fn fail(&mut self, error: Error) {
        self.failed = true;
        self.errors.push(error);
    }
}

/// Drives the `try`, `catch` and `finally` blocks of a step for one test.
pub(crate) struct StepRunner {
    pub config: Arc<Configuration>,
    pub client: Arc<dyn Client>,
    pub compilers: Compilers,
    pub namespace: String,
    pub base_path: PathBuf,
    pub kubeconfig: Option<String>,
    pub cleaner: Option<Cleaner>,
}

impl StepRunner {
    pub async fn run(&self, ctx: &ExecutionContext, step: &Step, bindings: &Bindings) -> StepReport {
        let mut report = StepReport::default();
        let mut bindings = match register_bindings(bindings, &self.compilers, &step.bindings) {
            Ok(bindings) => bindings,
            Err(e) => {
                report.fail(e.into());
                return report;
            }
        };
        self.run_block(ctx, logging::Operation::Try, &step.try_, &mut bindings, &mut report, true)
            .await;
        if report.failed && !step.catch.is_empty() {
            self.run_block(ctx, logging::Operation::Catch, &step.catch, &mut bindings, &mut report, false)
                .await;
        }
        if !step.finally.is_empty() {
            self.run_block(ctx, logging::Operation::Finally, &step.finally, &mut bindings, &mut report, false)
                .await;
        }
        report
    }

    async fn run_block(
        &self,
        ctx: &ExecutionContext,
        phase: logging::Operation,
        operations: &[model::Operation],
        bindings: &mut Bindings,
        report: &mut StepReport,
        stop_on_error: bool,
    ) {
        logging::log(phase, Status::Begin, None, "");
        for operation in operations {
            match self.run_operation(ctx, operation, bindings).await {
                Ok(next) => *bindings = next,
                Err(e) => {
                    report.fail(e);
                    if stop_on_error && !operation.continue_on_error {
                        break;
                    }
                }
            }
        }
        logging::log(phase, Status::End, None, "");
    }

    /// Runs one operation and returns `bindings` extended with its outputs.
    /// Operation-level bindings are visible to the operation only.
    async fn run_operation(
        &self,
        ctx: &ExecutionContext,
        operation: &model::Operation,
        bindings: &Bindings,
    ) -> ChainsawResult<Bindings> {
        let scoped = register_bindings(bindings, &self.compilers, &operation.bindings)?;
        let ctx = match operation.effective_timeout(&self.config.timeouts) {
            Some(timeout) => ctx.with_timeout(timeout),
            None => ctx.child(),
        };
        let outputs = self.build(&operation.action).exec(&ctx, &scoped).await?;
        let mut bindings = bindings.clone();
        for (name, value) in outputs {
            bindings = bindings.register(&name, value)?;
        }
        Ok(bindings)
    }

    fn services(&self, template: Option<bool>) -> Services {
        Services::new(self.client.clone())
            .with_compilers(self.compilers.clone())
            .with_namespacer(Namespacer::new(self.namespace.clone()))
            .with_poll_interval(self.config.poll_interval)
            .with_propagation(self.config.deletion_propagation)
            .with_template(template.unwrap_or(self.config.template))
    }

    fn cleaned(&self, services: Services) -> Services {
        match &self.cleaner {
            Some(cleaner) => services.with_cleaner(cleaner.clone()),
            None => services,
        }
    }

    fn process(&self, options: &ProcessOptions) -> Process {
        let mut process = Process::new(self.compilers.clone(), self.namespace.clone())
            .with_base_path(self.base_path.clone())
            .with_env(options.env.clone())
            .with_outputs(options.outputs.clone())
            .with_skip_log_output(options.skip_log_output);
        if let Some(dir) = &options.work_dir {
            process = process.with_work_dir(dir);
        }
        if let Some(check) = &options.check {
            process = process.with_check(check.clone());
        }
        if let Some(kubeconfig) = &self.kubeconfig {
            process = process.with_kubeconfig(kubeconfig.clone());
        }
        process
    }

    fn build(&self, action: &Action) -> Box<dyn Operation> {
        match action {
            Action::Create(a) => Box::new(
                Create::new(self.cleaned(self.services(a.template)), Resource::new(a.resource.clone()))
                    .with_expect(a.expect.clone())
                    .with_outputs(a.outputs.clone()),
            ),
            Action::Apply(a) => Box::new(
                Apply::new(self.cleaned(self.services(a.template)), Resource::new(a.resource.clone()))
                    .with_expect(a.expect.clone())
                    .with_outputs(a.outputs.clone()),
            ),
            Action::Patch(a) => Box::new(
                Patch::new(self.services(a.template), Resource::new(a.resource.clone()))
                    .with_expect(a.expect.clone())
                    .with_outputs(a.outputs.clone()),
            ),
            Action::Update(a) => Box::new(
                Update::new(self.services(a.template), Resource::new(a.resource.clone()))
                    .with_expect(a.expect.clone())
                    .with_outputs(a.outputs.clone()),
            ),
            Action::Delete(a) => Box::new(
                Delete::new(self.services(a.template), Resource::new(a.reference.clone()))
                    .with_expect(a.expect.clone()),
            ),
            Action::Assert(a) => Box::new(Assert::new(
                self.services(a.template),
                Resource::new(a.resource.clone()),
            )),
            Action::Error(a) => Box::new(Refute::new(
                self.services(a.template),
                Resource::new(a.resource.clone()),
            )),
            Action::Command(a) => Box::new(Command::new(
                self.process(&a.options),
                a.entrypoint.clone(),
                a.args.clone(),
            )),
            Action::Script(a) => {
                let script = Script::new(self.process(&a.options), a.content.clone());
                Box::new(match &a.shell {
                    Some(shell) => script.with_shell(shell.clone(), a.shell_args.clone()),
                    None => script,
                })
            }
            Action::Sleep(a) => Box::new(Sleep::new(a.duration)),
        }
    }
}
