#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chainsaw::client::memory::MemoryClient;
use chainsaw::namespacer::Namespacer;
use chainsaw::operations::Services;
use chainsaw::ExecutionContext;
use serde_json::{json, Value};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[ctor::ctor]
fn init_tests() {
    // テストの前に一度だけ実行したい処理
    // tracing_subscriberの初期化
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

pub const NAMESPACE: &str = "chainsaw-test";

/// An empty in-memory cluster.
pub fn cluster() -> Arc<MemoryClient> {
    Arc::new(MemoryClient::new())
}

/// Services for one step against `client`, polling fast.
pub fn services(client: Arc<MemoryClient>) -> Services {
    Services::new(client)
        .with_namespacer(Namespacer::new(NAMESPACE))
        .with_poll_interval(Duration::from_millis(5))
}

pub fn ctx(timeout_ms: u64) -> ExecutionContext {
    ExecutionContext::new().with_timeout(Duration::from_millis(timeout_ms))
}

pub fn config_map(name: &str, data: Value) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {"name": name, "namespace": NAMESPACE},
        "data": data
    })
}
