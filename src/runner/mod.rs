//! # Test Runner
//!
//! Runs [`Test`] documents against a cluster. Tests run in parallel, one
//! task each; the steps of a test and the operations of a step run in
//! order. Resources created by a test are deleted after its last step
//! unless deletion is skipped.

mod step;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use tracing::{error, info};

use crate::bindings::{register_bindings, Bindings};
use crate::cleanup::Cleaner;
use crate::client::Client;
use crate::config::Configuration;
use crate::context::ExecutionContext;
use crate::error::{ChainsawResult, Error};
use crate::expression::Compilers;
use crate::model::Test;

use step::StepRunner;

/// Outcome of one test. Console or JUnit rendering is up to the caller.
#[derive(Debug)]
pub struct TestReport {
    pub name: String,
    pub failed: bool,
    pub errors: Vec<Error>,
}

impl TestReport {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            failed: false,
            errors: Vec::new(),
        }
    }

    fn fail(&mut self, error: Error) {
        self.failed = true;
        self.errors.push(error);
    }

    pub fn is_success(&self) -> bool {
        !self.failed
    }
}

#[derive(Clone)]
pub struct TestRunner {
    config: Arc<Configuration>,
    client: Arc<dyn Client>,
    compilers: Compilers,
    base_path: PathBuf,
    kubeconfig: Option<String>,
}

impl fmt::Debug for TestRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestRunner")
            .field("config", &self.config)
            .field("compilers", &self.compilers)
            .field("base_path", &self.base_path)
            .finish_non_exhaustive()
    }
}

impl TestRunner {
    /// `config.default_compiler` must name a built-in dialect; register
    /// other dialects with [`TestRunner::with_compilers`].
    pub fn new(config: Configuration, client: Arc<dyn Client>) -> ChainsawResult<Self> {
        config.validate()?;
        let compilers = Compilers::default().with_default(&config.default_compiler)?;
        Ok(Self {
            config: Arc::new(config),
            client,
            compilers,
            base_path: PathBuf::from("."),
            kubeconfig: None,
        })
    }

    pub fn with_compilers(mut self, compilers: Compilers) -> Self {
        self.compilers = compilers;
        self
    }

    /// Directory command and script working directories resolve against.
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = path.into();
        self
    }

    /// Credentials handed to commands and scripts through `KUBECONFIG`.
    pub fn with_kubeconfig(mut self, kubeconfig: impl Into<String>) -> Self {
        self.kubeconfig = Some(kubeconfig.into());
        self
    }

    /// Runs every test concurrently. Reports come back in the order of
    /// `tests`.
    pub async fn run(&self, ctx: &ExecutionContext, tests: Vec<Test>) -> Vec<TestReport> {
        let names: Vec<String> = tests.iter().map(|t| t.name.clone()).collect();
        let handles = tests.into_iter().map(|test| {
            let runner = self.clone();
            let ctx = ctx.child();
            tokio::spawn(async move { runner.run_test(&ctx, &test).await })
        });
        join_all(handles)
            .await
            .into_iter()
            .zip(names)
            .map(|(result, name)| match result {
                Ok(report) => report,
                Err(e) => {
                    let mut report = TestReport::new(&name);
                    report.fail(Error::internal(format!("test task failed: {}", e)));
                    report
                }
            })
            .collect()
    }

    pub async fn run_test(&self, ctx: &ExecutionContext, test: &Test) -> TestReport {
        info!(test = %test.name, "test started");
        let namespace = test
            .namespace
            .clone()
            .unwrap_or_else(|| self.config.namespace.clone());
        let skip_delete = test.skip_delete.unwrap_or(self.config.skip_delete);
        let cleaner = (!skip_delete).then(|| {
            Cleaner::new(
                self.config.timeouts.cleanup,
                self.config.delay_before_cleanup,
                self.config.deletion_propagation,
            )
            .with_poll_interval(self.config.poll_interval)
        });
        let steps = StepRunner {
            config: self.config.clone(),
            client: self.client.clone(),
            compilers: self.compilers.clone(),
            namespace: namespace.clone(),
            base_path: self.base_path.clone(),
            kubeconfig: self.kubeconfig.clone(),
            cleaner: cleaner.clone(),
        };

        let mut report = TestReport::new(&test.name);
        match self.bindings(test, &namespace) {
            Err(e) => report.fail(e),
            Ok(bindings) => {
                for step in &test.steps {
                    let result = steps.run(ctx, step, &bindings).await;
                    report.errors.extend(result.errors);
                    if result.failed {
                        report.failed = true;
                        break;
                    }
                }
            }
        }

        if let Some(cleaner) = cleaner {
            // a cancelled test still tears down what it created
            for e in cleaner.run(&ExecutionContext::new()).await {
                report.fail(e.into());
            }
        }
        if report.failed {
            error!(test = %test.name, errors = report.errors.len(), "test failed");
        } else {
            info!(test = %test.name, "test passed");
        }
        report
    }

    fn bindings(&self, test: &Test, namespace: &str) -> ChainsawResult<Bindings> {
        let bindings = Bindings::new().register("namespace", Value::String(namespace.to_string()))?;
        Ok(register_bindings(&bindings, &self.compilers, &test.bindings)?)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::client::memory::{MemoryClient, Verb};
    use crate::client::Resource;
    use crate::config::Timeouts;

    fn config() -> Configuration {
        Configuration {
            timeouts: Timeouts {
                apply: Duration::from_secs(2),
                assert: Duration::from_millis(50),
                cleanup: Duration::from_secs(2),
                delete: Duration::from_secs(2),
                error: Duration::from_millis(50),
                exec: Duration::from_secs(5),
            },
            poll_interval: Duration::from_millis(5),
            namespace: "e2e".to_string(),
            ..Configuration::default()
        }
    }

    fn runner(client: Arc<MemoryClient>) -> TestRunner {
        TestRunner::new(config(), client).unwrap()
    }

    async fn exists(client: &MemoryClient, name: &str) -> bool {
        let key = Resource::new(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": name, "namespace": "e2e"}
        }))
        .key();
        client.get(&key).await.is_ok()
    }

    #[tokio::test]
    async fn test_outputs_flow_between_operations() {
        let client = Arc::new(MemoryClient::new());
        let test = Test::from_yaml_str(
            r#"
name: outputs
skipDelete: true
bindings:
  - name: prefix
    value: cm
steps:
  - try:
      - create:
          resource:
            apiVersion: v1
            kind: ConfigMap
            metadata:
              name: (concat($prefix, '-a'))
            data:
              ns: ($namespace)
          outputs:
            - name: created
              value: (metadata.name)
      - assert:
          resource:
            apiVersion: v1
            kind: ConfigMap
            metadata:
              name: ($created)
            data:
              ns: e2e
"#,
        )
        .unwrap();
        let report = runner(client.clone())
            .run_test(&ExecutionContext::new(), &test)
            .await;
        assert!(report.is_success(), "{:?}", report.errors);
        assert!(exists(&client, "cm-a").await);
    }

    #[tokio::test]
    async fn test_catch_and_finally() {
        let client = Arc::new(MemoryClient::new());
        let test = Test::from_yaml_str(
            r#"
name: recovery
skipDelete: true
steps:
  - try:
      - assert:
          resource:
            apiVersion: v1
            kind: ConfigMap
            metadata:
              name: missing
      - create:
          resource:
            apiVersion: v1
            kind: ConfigMap
            metadata:
              name: skipped
    catch:
      - create:
          resource:
            apiVersion: v1
            kind: ConfigMap
            metadata:
              name: caught
    finally:
      - create:
          resource:
            apiVersion: v1
            kind: ConfigMap
            metadata:
              name: finalized
  - try:
      - create:
          resource:
            apiVersion: v1
            kind: ConfigMap
            metadata:
              name: next-step
"#,
        )
        .unwrap();
        let report = runner(client.clone())
            .run_test(&ExecutionContext::new(), &test)
            .await;
        assert!(report.failed);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].to_string(), "actual resource not found");
        assert!(!exists(&client, "skipped").await);
        assert!(exists(&client, "caught").await);
        assert!(exists(&client, "finalized").await);
        assert!(!exists(&client, "next-step").await);
    }

    #[tokio::test]
    async fn test_continue_on_error() {
        let client = Arc::new(MemoryClient::new());
        let test = Test::from_yaml_str(
            r#"
name: continue
skipDelete: true
steps:
  - try:
      - error:
          resource:
            ($namespace): e2e
        continueOnError: true
      - create:
          resource:
            apiVersion: v1
            kind: ConfigMap
            metadata:
              name: after
"#,
        )
        .unwrap();
        let report = runner(client.clone())
            .run_test(&ExecutionContext::new(), &test)
            .await;
        assert!(report.failed);
        assert_eq!(report.errors[0].to_string(), "expectation matched");
        assert!(exists(&client, "after").await);
    }

    #[tokio::test]
    async fn test_cleanup_deletes_created_resources() {
        let client = Arc::new(MemoryClient::new());
        let test = Test::from_yaml_str(
            r#"
name: cleanup
steps:
  - try:
      - create:
          resource:
            apiVersion: v1
            kind: ConfigMap
            metadata:
              name: first
      - apply:
          resource:
            apiVersion: v1
            kind: ConfigMap
            metadata:
              name: second
"#,
        )
        .unwrap();
        let report = runner(client.clone())
            .run_test(&ExecutionContext::new(), &test)
            .await;
        assert!(report.is_success(), "{:?}", report.errors);
        assert!(client.is_empty().await);
        assert_eq!(client.calls(Verb::Delete).await, 2);
    }

    #[tokio::test]
    async fn test_parallel_reports_keep_order() {
        let client = Arc::new(MemoryClient::new());
        let tests = (0..4)
            .map(|i| {
                Test::from_yaml_str(&format!(
                    "name: t{i}\nnamespace: ns-{i}\nsteps:\n  - try:\n      - sleep:\n          duration: {}\n      - assert:\n          resource:\n            ($namespace): ns-{i}\n",
                    (4 - i) * 10
                ))
                .unwrap()
            })
            .collect();
        let reports = runner(client).run(&ExecutionContext::new(), tests).await;
        let names: Vec<&str> = reports.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["t0", "t1", "t2", "t3"]);
        assert!(reports.iter().all(TestReport::is_success));
    }

    #[tokio::test]
    async fn test_invalid_binding_fails_test() {
        let client = Arc::new(MemoryClient::new());
        let test = Test::from_yaml_str(
            "name: bad\nbindings:\n  - name: not valid\n    value: 1\nsteps:\n  - try:\n      - sleep:\n          duration: 1\n",
        )
        .unwrap();
        let report = runner(client)
            .run_test(&ExecutionContext::new(), &test)
            .await;
        assert!(report.failed);
        assert!(matches!(report.errors[0], Error::Binding(_)));
    }

    #[test]
    fn test_unknown_default_dialect() {
        let config = Configuration {
            default_compiler: "cel".to_string(),
            ..config()
        };
        let err = TestRunner::new(config, Arc::new(MemoryClient::new())).unwrap_err();
        assert!(matches!(err, Error::Expression(_)));
    }
}
