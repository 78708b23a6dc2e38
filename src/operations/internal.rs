use std::borrow::Cow;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde_json::Value;

use super::{OperationError, OperationResult, Services};
use crate::bindings::{resolve_binding, Binding, Bindings};
use crate::check::{expect, Expectation};
use crate::client::{Client, ClientResult, ListOptions, Resource, ALL_NAMESPACES};
use crate::context::ExecutionContext;
use crate::expression::Compilers;
use crate::logging;
use crate::mutate::{template_and_merge, template_resource_ref};
use crate::outputs::{self, Output};

lazy_static! {
    static ref ENV_REFERENCE: Regex =
        Regex::new(r"\$\$|\$\{(\w+)\}|\$(\w+)").expect("valid env reference regex");
}

/// Renders the whole declared document against itself when templating is on.
pub(crate) fn template_document(
    services: &Services,
    bindings: &Bindings,
    obj: &Resource,
) -> Result<Resource, OperationError> {
    if !services.template {
        return Ok(obj.clone());
    }
    let merged = template_and_merge(
        obj.as_value().clone(),
        bindings,
        &services.compilers,
        std::slice::from_ref(obj.as_value()),
    )?;
    Ok(Resource::new(merged))
}

/// Renders only the fields that address the resource.
pub(crate) fn template_reference(
    services: &Services,
    bindings: &Bindings,
    obj: &Resource,
) -> Result<Resource, OperationError> {
    if !services.template {
        return Ok(obj.clone());
    }
    let rendered = template_resource_ref(obj.as_value().clone(), bindings, &services.compilers)?;
    Ok(Resource::new(rendered))
}

pub(crate) async fn apply_namespacer(
    services: &Services,
    obj: &mut Resource,
) -> Result<(), OperationError> {
    if let Some(namespacer) = &services.namespacer {
        namespacer.apply(services.client.as_ref(), obj).await?;
    }
    Ok(())
}

/// Runs `run` on the prepared object between its `RUN` and terminal events,
/// both naming the prepared object. When preparation fails, the terminal
/// event names the declared document.
pub(crate) async fn traced<F, Fut>(
    operation: logging::Operation,
    declared: &Resource,
    prepared: Result<Resource, OperationError>,
    run: F,
) -> OperationResult
where
    F: FnOnce(Resource) -> Fut,
    Fut: Future<Output = OperationResult>,
{
    let obj = match prepared {
        Ok(obj) => obj,
        Err(e) => {
            let result = Err(e);
            logging::log_end(operation, Some(&declared.key()), &result);
            return result;
        }
    };
    let key = obj.key();
    logging::log_start(operation, Some(&key));
    let result = run(obj).await;
    logging::log_end(operation, Some(&key), &result);
    result
}

/// Resolves the resources a document refers to: a point lookup when it
/// names one, a listing by namespace and labels otherwise.
pub(crate) async fn read(client: &dyn Client, obj: &Resource) -> ClientResult<Vec<Resource>> {
    if !obj.name().is_empty() {
        let mut key = obj.key();
        if key.namespace == ALL_NAMESPACES {
            key.namespace.clear();
        }
        return Ok(vec![client.get(&key).await?]);
    }
    let namespace = match obj.namespace() {
        "" | ALL_NAMESPACES => None,
        namespace => Some(namespace.to_string()),
    };
    let options = ListOptions {
        namespace,
        labels: obj.labels(),
    };
    client.list(obj.api_version(), obj.kind(), &options).await
}

/// Runs `attempt` immediately, then every `interval` while it fails with a
/// transient error. When the context ends first, the last transient error is
/// reported rather than the bare deadline.
pub(crate) async fn retry<F, Fut>(
    ctx: &ExecutionContext,
    interval: Duration,
    mut attempt: F,
) -> OperationResult
where
    F: FnMut() -> Fut,
    Fut: Future<Output = OperationResult>,
{
    let mut poller = ctx.poller(interval);
    let mut last = None;
    loop {
        if let Err(e) = poller.tick().await {
            return Err(last.unwrap_or(e.into()));
        }
        match attempt().await {
            Ok(outputs) => {
                poller.confirm()?;
                return Ok(outputs);
            }
            Err(e) if e.is_transient() => {
                tracing::debug!("retrying after transient error: {}", e);
                last = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
}

/// Polls `attempt` until it reports no errors. An `Err` aborts at once; on
/// deadline the errors of the last completed attempt win over the bare
/// context error.
pub(crate) async fn poll<F, Fut>(
    ctx: &ExecutionContext,
    interval: Duration,
    mut attempt: F,
) -> Result<(), OperationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Vec<OperationError>, OperationError>>,
{
    let mut poller = ctx.poller(interval);
    let mut last = Vec::new();
    loop {
        if let Err(e) = poller.tick().await {
            return Err(OperationError::combine(last).unwrap_or(e.into()));
        }
        let errors = attempt().await?;
        if errors.is_empty() {
            poller.confirm()?;
            return Ok(());
        }
        last = errors;
    }
}

/// Binds `$error`, lets the expectations override the raw result and
/// extracts outputs when the final verdict is a success.
pub(crate) fn handle_check(
    compilers: &Compilers,
    bindings: &Bindings,
    obj: &Value,
    result: Result<(), OperationError>,
    expectations: &[Expectation],
    declared: &[Output],
) -> OperationResult {
    let error = match &result {
        Ok(()) => Value::Null,
        Err(e) => Value::String(e.to_string()),
    };
    let bindings = bindings.register("error", error)?;
    let result = match expect(obj, &bindings, compilers, expectations) {
        (true, verdict) => verdict.map_err(OperationError::from),
        (false, _) => result,
    };
    result?;
    Ok(outputs::process(&bindings, compilers, obj, declared)?)
}

/// Resolves declared env bindings to strings and adds `NAMESPACE`.
pub(crate) fn register_envs(
    compilers: &Compilers,
    namespace: &str,
    bindings: &Bindings,
    envs: &[Binding],
) -> Result<BTreeMap<String, String>, OperationError> {
    let mut out = BTreeMap::new();
    for env in envs {
        let (name, value) = resolve_binding(bindings, compilers, &Value::Null, env)?;
        match value {
            Value::String(value) => {
                out.insert(name, value);
            }
            _ => return Err(OperationError::EnvNotString(env.name.clone())),
        }
    }
    out.insert("NAMESPACE".to_string(), namespace.to_string());
    Ok(out)
}

/// Expands `$VAR` and `${VAR}` from `env`, then from the process
/// environment. Unknown references are kept and `$$` yields `$`.
pub(crate) fn expand<'a>(env: &BTreeMap<String, String>, input: &'a str) -> Cow<'a, str> {
    ENV_REFERENCE.replace_all(input, |caps: &Captures| {
        let Some(name) = caps.get(1).or_else(|| caps.get(2)) else {
            return "$".to_string();
        };
        env.get(name.as_str())
            .cloned()
            .or_else(|| std::env::var(name.as_str()).ok())
            .unwrap_or_else(|| caps[0].to_string())
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use mockall::predicate::eq;
    use serde_json::json;

    use super::*;
    use crate::client::{ClientError, MockClient, ObjectKey, StatusReason};

    #[tokio::test]
    async fn test_read_by_name() {
        let mut client = MockClient::new();
        client
            .expect_get()
            .with(eq(ObjectKey::new("v1", "Pod", Some("ns"), "p")))
            .times(1)
            .returning(|key| Ok(Resource::new(json!({"metadata": {"name": key.name.clone()}}))));
        let obj = Resource::new(json!({
            "apiVersion": "v1", "kind": "Pod", "metadata": {"name": "p", "namespace": "ns"}
        }));
        let found = read(&client, &obj).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name(), "p");
    }

    #[tokio::test]
    async fn test_read_not_found_is_an_error() {
        let mut client = MockClient::new();
        client
            .expect_get()
            .returning(|key| Err(ClientError::not_found(key)));
        let obj = Resource::new(json!({"apiVersion": "v1", "kind": "Pod", "metadata": {"name": "p"}}));
        assert!(read(&client, &obj).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_read_lists_across_namespaces() {
        let mut client = MockClient::new();
        client
            .expect_list()
            .withf(|api_version, kind, options| {
                api_version == "v1"
                    && kind == "Pod"
                    && options.namespace.is_none()
                    && options.labels.get("app").map(String::as_str) == Some("web")
            })
            .times(1)
            .returning(|_, _, _| Ok(vec![]));
        let obj = Resource::new(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"namespace": "*", "labels": {"app": "web"}}
        }));
        assert!(read(&client, &obj).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_namespacer_is_optional() {
        let client = MockClient::new();
        let services = Services::new(Arc::new(client));
        let mut obj = Resource::new(json!({"apiVersion": "v1", "kind": "Pod"}));
        apply_namespacer(&services, &mut obj).await.unwrap();
        assert_eq!(obj.namespace(), "");
    }

    #[test]
    fn test_handle_check_expectation_replaces_error() {
        let compilers = Compilers::default();
        let expectations = vec![Expectation::new(json!({"($error != `null`)": true}))];
        let err = OperationError::from(ClientError::new(StatusReason::Forbidden, "denied"));
        let result = handle_check(
            &compilers,
            &Bindings::new(),
            &json!({}),
            Err(err),
            &expectations,
            &[],
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_handle_check_unmatched_keeps_error() {
        let compilers = Compilers::default();
        let expectations = vec![Expectation::new(json!({"($error)": "nope"}))
            .with_match(json!({"kind": "Secret"}))];
        let err = OperationError::from(ClientError::new(StatusReason::Forbidden, "denied"));
        let result = handle_check(
            &compilers,
            &Bindings::new(),
            &json!({"kind": "ConfigMap"}),
            Err(err),
            &expectations,
            &[],
        );
        assert_eq!(result.unwrap_err().to_string(), "denied");
    }

    #[test]
    fn test_handle_check_outputs() {
        let compilers = Compilers::default();
        let declared = vec![
            Output::new("name", json!("(metadata.name)")),
            Output::new("failed", json!("($error)")),
        ];
        let outputs = handle_check(
            &compilers,
            &Bindings::new(),
            &json!({"metadata": {"name": "cm"}}),
            Ok(()),
            &[],
            &declared,
        )
        .unwrap();
        assert_eq!(outputs["name"], json!("cm"));
        assert_eq!(outputs["failed"], Value::Null);
    }

    #[test]
    fn test_register_envs() {
        let compilers = Compilers::default();
        let bindings = Bindings::new().register("who", json!("world")).unwrap();
        let envs = register_envs(
            &compilers,
            "ns",
            &bindings,
            &[Binding::new("GREETING", json!("(concat('hello ', $who))"))],
        )
        .unwrap();
        assert_eq!(envs["GREETING"], "hello world");
        assert_eq!(envs["NAMESPACE"], "ns");

        let err = register_envs(&compilers, "ns", &bindings, &[Binding::new("N", json!(1))])
            .unwrap_err();
        assert_eq!(err.to_string(), "value must be a string (N)");
    }

    #[test]
    fn test_expand() {
        let env: BTreeMap<String, String> =
            [("NAMESPACE".to_string(), "foo".to_string())].into_iter().collect();
        assert_eq!(expand(&env, "$NAMESPACE"), "foo");
        assert_eq!(expand(&env, "${NAMESPACE}-x"), "foo-x");
        assert_eq!(expand(&env, "DO $$ END"), "DO $ END");
        assert_eq!(expand(&env, "$$$$"), "$$");
        assert_eq!(expand(&env, "$$literal"), "$literal");
        assert_eq!(
            expand(&BTreeMap::new(), "$CHAINSAW_SURELY_UNDEFINED"),
            "$CHAINSAW_SURELY_UNDEFINED"
        );
    }
}
