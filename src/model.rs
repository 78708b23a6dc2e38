//! Declarative test documents.
//!
//! These types mirror the YAML a test author writes. Locating and reading
//! test files is left to the caller; [`Test::from_yaml_str`] only parses a
//! document that is already in memory.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bindings::Binding;
use crate::check::Expectation;
use crate::config::{duration_ms, option_duration_ms, Timeouts};
use crate::outputs::Output;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Test {
    pub name: String,
    /// Overrides the configured default namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bindings: Vec<Binding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_delete: Option<bool>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Test {
    pub fn from_yaml_str(s: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bindings: Vec<Binding>,
    #[serde(rename = "try", default)]
    pub try_: Vec<Operation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub catch: Vec<Operation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finally: Vec<Operation>,
}

/// One entry of a `try`, `catch` or `finally` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub continue_on_error: bool,
    #[serde(default, with = "option_duration_ms", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bindings: Vec<Binding>,
    #[serde(flatten)]
    pub action: Action,
}

impl Operation {
    pub fn new(action: Action) -> Self {
        Self {
            description: None,
            continue_on_error: false,
            timeout: None,
            bindings: Vec::new(),
            action,
        }
    }

    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_bindings(mut self, bindings: Vec<Binding>) -> Self {
        self.bindings = bindings;
        self
    }

    /// Declared timeout, or the configured one for this kind of action.
    /// Sleep is only bounded by its parent.
    pub fn effective_timeout(&self, timeouts: &Timeouts) -> Option<Duration> {
        self.timeout.or(match &self.action {
            Action::Create(_) | Action::Apply(_) | Action::Patch(_) | Action::Update(_) => {
                Some(timeouts.apply)
            }
            Action::Delete(_) => Some(timeouts.delete),
            Action::Assert(_) => Some(timeouts.assert),
            Action::Error(_) => Some(timeouts.error),
            Action::Command(_) | Action::Script(_) => Some(timeouts.exec),
            Action::Sleep(_) => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    Create(ResourceAction),
    Apply(ResourceAction),
    Patch(ResourceAction),
    Update(ResourceAction),
    Delete(DeleteAction),
    Assert(CheckAction),
    Error(CheckAction),
    Command(CommandAction),
    Script(ScriptAction),
    Sleep(SleepAction),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceAction {
    pub resource: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expect: Vec<Expectation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<Output>,
}

impl ResourceAction {
    pub fn new(resource: Value) -> Self {
        Self {
            resource,
            template: None,
            expect: Vec::new(),
            outputs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAction {
    /// Either a named resource or a kind with a label selector.
    #[serde(rename = "ref")]
    pub reference: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expect: Vec<Expectation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckAction {
    pub resource: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessOptions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<Binding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<Output>,
    #[serde(default)]
    pub skip_log_output: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandAction {
    pub entrypoint: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(flatten)]
    pub options: ProcessOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptAction {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shell_args: Vec<String>,
    #[serde(flatten)]
    pub options: ProcessOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepAction {
    #[serde(with = "duration_ms")]
    pub duration: Duration,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    const BASIC: &str = r#"
name: basic
bindings:
  - name: suffix
    value: one
steps:
  - name: create
    try:
      - create:
          resource:
            apiVersion: v1
            kind: ConfigMap
            metadata:
              name: (concat('cm-', $suffix))
          outputs:
            - name: version
              value: (metadata.resourceVersion)
      - assert:
          resource:
            apiVersion: v1
            kind: ConfigMap
            data:
              foo: bar
        timeout: 1500
        continueOnError: true
    catch:
      - script:
          content: echo failed
          skipLogOutput: true
    finally:
      - sleep:
          duration: 10
      - delete:
          ref:
            apiVersion: v1
            kind: ConfigMap
            metadata:
              name: cm-one
"#;

    #[test]
    fn test_parse() {
        let test = Test::from_yaml_str(BASIC).unwrap();
        assert_eq!(test.name, "basic");
        assert_eq!(test.bindings, vec![Binding::new("suffix", json!("one"))]);
        let step = &test.steps[0];
        assert_eq!(step.name.as_deref(), Some("create"));
        assert_eq!(step.try_.len(), 2);

        let Action::Create(create) = &step.try_[0].action else {
            panic!("expected create, got {:?}", step.try_[0].action);
        };
        assert_eq!(
            create.resource["metadata"]["name"],
            json!("(concat('cm-', $suffix))")
        );
        assert_eq!(
            create.outputs,
            vec![Output::new("version", json!("(metadata.resourceVersion)"))]
        );

        let assert = &step.try_[1];
        assert!(matches!(assert.action, Action::Assert(_)));
        assert!(assert.continue_on_error);
        assert_eq!(assert.timeout, Some(Duration::from_millis(1500)));

        let Action::Script(script) = &step.catch[0].action else {
            panic!("expected script");
        };
        assert_eq!(script.content, "echo failed");
        assert!(script.options.skip_log_output);

        assert_eq!(
            step.finally[0].action,
            Action::Sleep(SleepAction {
                duration: Duration::from_millis(10)
            })
        );
        assert!(matches!(step.finally[1].action, Action::Delete(_)));
    }

    #[test]
    fn test_effective_timeout() {
        let timeouts = Timeouts::default();
        let create = Operation::new(Action::Create(ResourceAction::new(json!({}))));
        assert_eq!(create.effective_timeout(&timeouts), Some(timeouts.apply));
        let create = create.with_timeout(Duration::from_millis(5));
        assert_eq!(
            create.effective_timeout(&timeouts),
            Some(Duration::from_millis(5))
        );
        let error = Operation::new(Action::Error(CheckAction {
            resource: json!({}),
            template: None,
        }));
        assert_eq!(error.effective_timeout(&timeouts), Some(timeouts.error));
        let sleep = Operation::new(Action::Sleep(SleepAction {
            duration: Duration::from_secs(1),
        }));
        assert_eq!(sleep.effective_timeout(&timeouts), None);
    }

    #[test]
    fn test_command_with_env() {
        let op: Operation = serde_yaml::from_str(
            "command:\n  entrypoint: echo\n  args: [\"$GREETING\"]\n  env:\n    - name: GREETING\n      value: hello\n  check:\n    ($error): null\n",
        )
        .unwrap();
        let Action::Command(command) = op.action else {
            panic!("expected command");
        };
        assert_eq!(command.entrypoint, "echo");
        assert_eq!(command.args, vec!["$GREETING".to_string()]);
        assert_eq!(
            command.options.env,
            vec![Binding::new("GREETING", json!("hello"))]
        );
        assert_eq!(command.options.check, Some(json!({"($error)": null})));
    }
}
