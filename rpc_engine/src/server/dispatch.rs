//! The per-message pipeline and its batch fan-out.
//!
//! Stages run in order and the first failure becomes the response:
//! parse, validate, rate gate, resolve method, resolve service, bind params,
//! before-hook, invoke, after-hook, build response.

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;

use super::{
    errors::{DispatchError, RegistryError},
    rate_limit::{RateLimitConfig, RateLimiter},
    registry::{resolve_method_name, ServiceBuilder, ServiceRegistry},
};
use crate::protocol::{codec, JsonRpcError, JsonRpcRequest, JsonRpcResponse};

/// Runs before invocation with `(id, method, params)`.
pub type BeforeInvoke = Arc<dyn Fn(Option<&str>, &str, &Value) -> anyhow::Result<()> + Send + Sync>;

/// Runs after a successful invocation with `(id, method, result)`.
pub type AfterInvoke = Arc<dyn Fn(Option<&str>, &str, &Value) -> anyhow::Result<()> + Send + Sync>;

#[derive(Clone, Default)]
pub struct Hooks {
    pub before: Option<BeforeInvoke>,
    pub after: Option<AfterInvoke>,
}

/// Reply to one payload: a single response or a batch of them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Single(JsonRpcResponse),
    Batch(Vec<JsonRpcResponse>),
}

#[derive(Default)]
pub struct Dispatcher {
    registry: ServiceRegistry,
    hooks: Hooks,
    rate_limiter: Option<RateLimiter>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: ServiceRegistry) -> Self {
        Self {
            registry,
            ..Self::default()
        }
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn register<S>(&self, service: ServiceBuilder<S>) -> Result<(), RegistryError>
    where
        S: Send + Sync + 'static,
    {
        self.registry.register(service)
    }

    pub fn set_before_invoke<F>(&mut self, hook: F)
    where
        F: Fn(Option<&str>, &str, &Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.hooks.before = Some(Arc::new(hook));
    }

    pub fn set_after_invoke<F>(&mut self, hook: F)
    where
        F: Fn(Option<&str>, &str, &Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.hooks.after = Some(Arc::new(hook));
    }

    pub fn set_rate_limit(&mut self, config: RateLimitConfig) {
        self.rate_limiter = Some(RateLimiter::new(config));
    }

    /// Decodes a payload, dispatches it and returns the encoded reply.
    pub async fn handle(&self, payload: &[u8]) -> Vec<u8> {
        match codec::decode(payload) {
            Ok(message) => codec::encode(&self.handle_value(message).await),
            Err(error) => codec::encode(&JsonRpcResponse::error(None, error)),
        }
    }

    /// Routes a decoded payload: arrays are batches, objects single calls.
    ///
    /// An empty array is answered with one InvalidRequest object rather than
    /// an empty array; anything that is neither array nor object is answered
    /// the same way.
    pub async fn handle_value(&self, message: Value) -> Reply {
        match message {
            Value::Array(batch) if batch.is_empty() => Reply::Single(JsonRpcResponse::error(
                None,
                JsonRpcError::invalid_request("batch must not be empty"),
            )),
            Value::Array(batch) => {
                // join_all keeps input order whatever order the calls finish in
                let responses =
                    join_all(batch.into_iter().map(|entry| self.dispatch(entry))).await;
                Reply::Batch(responses)
            }
            Value::Object(_) => Reply::Single(self.dispatch(message).await),
            _ => Reply::Single(JsonRpcResponse::error(
                None,
                JsonRpcError::invalid_request("payload must be an object or an array"),
            )),
        }
    }

    /// Runs the pipeline for one message.
    pub async fn dispatch(&self, message: Value) -> JsonRpcResponse {
        let request = match JsonRpcRequest::from_value(message) {
            Ok(request) => request,
            Err((id, error)) => {
                tracing::debug!("rejecting malformed request: {}", error.data);
                return JsonRpcResponse::error(id, error);
            }
        };

        let id = request.id.clone();
        match self.invoke(request).await {
            Ok(result) => codec::build_success(id, result),
            Err(err) => err.to_response(id),
        }
    }

    async fn invoke(&self, request: JsonRpcRequest) -> Result<Value, DispatchError> {
        let JsonRpcRequest {
            id, method, params, ..
        } = request;

        if let Some(limiter) = &self.rate_limiter {
            if !limiter.allow() {
                tracing::debug!(method = %method, "request refused by rate limiter");
                return Err(DispatchError::RateLimited);
            }
        }

        let (service_name, method_name) = resolve_method_name(&method).map_err(|err| {
            tracing::debug!("{err}");
            DispatchError::MethodNotFound(method.clone())
        })?;

        let target = self
            .registry
            .lookup(&service_name, &method_name)
            .ok_or_else(|| DispatchError::MethodNotFound(method.clone()))?;

        let hook_params = self.hooks.before.as_ref().map(|_| params.clone());
        let call = target
            .bind(params)
            .map_err(|err| DispatchError::InvalidParams(err.to_string()))?;

        if let (Some(before), Some(params)) = (&self.hooks.before, &hook_params) {
            before(id.as_deref(), &method, params)
                .map_err(|err| DispatchError::Rejected(err.to_string()))?;
        }

        let result = call.await.map_err(|err| {
            tracing::warn!(method = %method, "method invocation failed: {err:#}");
            DispatchError::Internal
        })?;

        if let Some(after) = &self.hooks.after {
            after(id.as_deref(), &method, &result)
                .map_err(|err| DispatchError::Rejected(err.to_string()))?;
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use crate::server::errors::RATE_LIMITED_MESSAGE;
    use anyhow::bail;
    use serde::Deserialize;
    use serde_json::json;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    #[derive(Default)]
    struct Calc {
        calls: AtomicUsize,
    }

    #[derive(Deserialize)]
    struct Operands {
        #[serde(rename = "A")]
        a: i64,
        #[serde(rename = "B")]
        b: i64,
    }

    impl Calc {
        fn add(&self, params: Operands, result: &mut i64) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *result = params.a + params.b;
            Ok(())
        }

        fn div(&self, params: Operands, result: &mut i64) -> anyhow::Result<()> {
            if params.b == 0 {
                bail!("division by zero in Calc.div");
            }
            *result = params.a / params.b;
            Ok(())
        }
    }

    fn calc_dispatcher() -> (Dispatcher, Arc<Calc>) {
        let calc = Arc::new(Calc::default());
        let dispatcher = Dispatcher::new();
        dispatcher
            .register(
                ServiceBuilder::from_arc(Arc::clone(&calc))
                    .method("add", Calc::add)
                    .method("div", Calc::div)
                    .method_async("slow_echo", |_: Arc<Calc>, delay_ms: u64| async move {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        Ok::<_, anyhow::Error>(delay_ms)
                    }),
            )
            .expect("register Calc");
        (dispatcher, calc)
    }

    async fn handle_json(dispatcher: &Dispatcher, payload: Value) -> Value {
        let bytes = dispatcher.handle(payload.to_string().as_bytes()).await;
        serde_json::from_slice(&bytes).expect("reply is JSON")
    }

    #[tokio::test]
    async fn dispatch__registered_method__then_success_with_same_id() {
        let (dispatcher, _) = calc_dispatcher();
        let reply = handle_json(
            &dispatcher,
            json!({"id": "1", "jsonrpc": "2.0", "method": "Calc.Add", "params": {"A": 2, "B": 3}}),
        )
        .await;

        assert_eq!(reply, json!({"id": "1", "jsonrpc": "2.0", "result": 5}));
    }

    #[tokio::test]
    async fn dispatch__notification__then_executes_and_replies_without_id() {
        let (dispatcher, calc) = calc_dispatcher();
        let reply = handle_json(
            &dispatcher,
            json!({"jsonrpc": "2.0", "method": "Calc/Add", "params": {"A": 2, "B": 3}}),
        )
        .await;

        assert_eq!(reply, json!({"jsonrpc": "2.0", "result": 5}));
        assert_eq!(calc.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dispatch__unresolvable_methods__then_method_not_found_with_id() {
        let (dispatcher, _) = calc_dispatcher();

        for method in ["Calc", "Calc.Add.More", "Missing.Add", "Calc.Pow"] {
            let reply = handle_json(
                &dispatcher,
                json!({"id": "7", "jsonrpc": "2.0", "method": method, "params": {}}),
            )
            .await;

            assert_eq!(reply["id"], "7", "{method}");
            assert_eq!(reply["error"]["code"], -32601, "{method}");
            assert_eq!(reply["error"]["data"], method);
        }
    }

    #[tokio::test]
    async fn dispatch__lowercase_and_snake_case_names__then_resolved() {
        let (dispatcher, _) = calc_dispatcher();

        for method in ["calc.add", "/Calc.add", "calc/Add"] {
            let reply = handle_json(
                &dispatcher,
                json!({"id": "1", "jsonrpc": "2.0", "method": method, "params": {"A": 1, "B": 1}}),
            )
            .await;
            assert_eq!(reply["result"], 2, "{method}");
        }
    }

    #[tokio::test]
    async fn dispatch__params_of_wrong_shape__then_invalid_params() {
        let (dispatcher, calc) = calc_dispatcher();
        let reply = handle_json(
            &dispatcher,
            json!({"id": "3", "jsonrpc": "2.0", "method": "Calc.Add", "params": {"A": "x"}}),
        )
        .await;

        assert_eq!(reply["id"], "3");
        assert_eq!(reply["error"]["code"], -32602);
        assert_eq!(calc.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dispatch__method_fails__then_internal_error_without_details() {
        let (dispatcher, _) = calc_dispatcher();
        let reply = handle_json(
            &dispatcher,
            json!({"id": "4", "jsonrpc": "2.0", "method": "Calc.Div", "params": {"A": 1, "B": 0}}),
        )
        .await;

        assert_eq!(reply["error"]["code"], -32603);
        assert_eq!(reply["error"]["message"], "Internal error");
        assert_eq!(reply["error"]["data"], Value::Null);
        assert!(!reply.to_string().contains("division by zero"));
    }

    #[tokio::test]
    async fn dispatch__invalid_json__then_parse_error() {
        let (dispatcher, _) = calc_dispatcher();
        let bytes = dispatcher.handle(b"{\"jsonrpc\":").await;
        let reply: Value = serde_json::from_slice(&bytes).expect("reply is JSON");

        assert_eq!(reply["error"]["code"], -32700);
        assert!(reply.get("id").is_none());
    }

    #[tokio::test]
    async fn dispatch__scalar_payload__then_invalid_request_not_array() {
        let (dispatcher, _) = calc_dispatcher();

        for payload in [json!(42), json!("text"), json!(null), json!([])] {
            let reply = handle_json(&dispatcher, payload).await;
            assert!(reply.is_object());
            assert_eq!(reply["error"]["code"], -32600);
        }
    }

    #[tokio::test]
    async fn dispatch__batch_with_unknown_service__then_positional_responses() {
        let (dispatcher, _) = calc_dispatcher();
        let reply = handle_json(
            &dispatcher,
            json!([
                {"id": "a", "jsonrpc": "2.0", "method": "Calc.Add", "params": {"A": 1, "B": 2}},
                {"id": "b", "jsonrpc": "2.0", "method": "Nope.Add", "params": {"A": 1, "B": 2}}
            ]),
        )
        .await;

        let entries = reply.as_array().expect("batch reply");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["result"], 3);
        assert_eq!(entries[1]["error"]["code"], -32601);
        assert_eq!(entries[1]["id"], "b");
    }

    #[tokio::test]
    async fn dispatch__batch_finishing_out_of_order__then_keeps_request_order() {
        let (dispatcher, _) = calc_dispatcher();
        let delays = [40u64, 5, 20, 0];
        let batch: Vec<Value> = delays
            .iter()
            .enumerate()
            .map(|(index, delay)| {
                json!({
                    "id": index.to_string(),
                    "jsonrpc": "2.0",
                    "method": "Calc.slow_echo",
                    "params": delay
                })
            })
            .collect();

        let reply = handle_json(&dispatcher, Value::Array(batch)).await;
        let entries = reply.as_array().expect("batch reply");

        for (index, delay) in delays.iter().enumerate() {
            assert_eq!(entries[index]["id"], index.to_string());
            assert_eq!(entries[index]["result"], *delay);
        }
    }

    #[tokio::test]
    async fn dispatch__batch_with_malformed_entry__then_isolated_error() {
        let (dispatcher, _) = calc_dispatcher();
        let reply = handle_json(
            &dispatcher,
            json!([
                7,
                {"id": "ok", "jsonrpc": "2.0", "method": "Calc.Add", "params": {"A": 0, "B": 1}}
            ]),
        )
        .await;

        assert_eq!(reply[0]["error"]["code"], -32600);
        assert_eq!(reply[1]["result"], 1);
    }

    #[tokio::test]
    async fn dispatch__rate_limit_zero__then_custom_error_and_handler_not_invoked() {
        let (mut dispatcher, calc) = calc_dispatcher();
        dispatcher.set_rate_limit(RateLimitConfig::new(0.0, 0));

        let reply = handle_json(
            &dispatcher,
            json!({"id": "1", "jsonrpc": "2.0", "method": "Calc.Add", "params": {"A": 2, "B": 3}}),
        )
        .await;

        assert_eq!(reply["error"]["code"], -32000);
        assert_eq!(reply["error"]["message"], RATE_LIMITED_MESSAGE);
        assert_eq!(calc.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dispatch__before_hook_rejects__then_custom_error_and_invocation_skipped() {
        let (mut dispatcher, calc) = calc_dispatcher();
        dispatcher.set_before_invoke(|id, method, params| {
            assert_eq!(id, Some("5"));
            assert_eq!(method, "Calc.Add");
            assert_eq!(params["A"], 2);
            bail!("caller not allowed")
        });

        let reply = handle_json(
            &dispatcher,
            json!({"id": "5", "jsonrpc": "2.0", "method": "Calc.Add", "params": {"A": 2, "B": 3}}),
        )
        .await;

        assert_eq!(reply["error"]["code"], -32000);
        assert_eq!(reply["error"]["message"], "caller not allowed");
        assert_eq!(calc.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dispatch__before_hook_rejects_async_method__then_handler_never_runs() {
        #[derive(Default)]
        struct Tally {
            hits: AtomicUsize,
        }

        let tally = Arc::new(Tally::default());
        let mut dispatcher = Dispatcher::new();
        dispatcher
            .register(ServiceBuilder::from_arc(Arc::clone(&tally)).method_async(
                "bump",
                |tally: Arc<Tally>, _: Value| {
                    tally.hits.fetch_add(1, Ordering::SeqCst);
                    async move { Ok::<_, anyhow::Error>(1u8) }
                },
            ))
            .expect("register Tally");
        dispatcher.set_before_invoke(|_, _, _| bail!("denied"));

        let reply = handle_json(
            &dispatcher,
            json!({"id": "1", "jsonrpc": "2.0", "method": "Tally.bump", "params": null}),
        )
        .await;

        assert_eq!(reply["error"]["code"], -32000);
        assert_eq!(reply["error"]["message"], "denied");
        assert_eq!(tally.hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dispatch__before_hook_not_reached_on_bad_params__then_invalid_params() {
        let (mut dispatcher, _) = calc_dispatcher();
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        dispatcher.set_before_invoke(move |_, _, _| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let reply = handle_json(
            &dispatcher,
            json!({"id": "5", "jsonrpc": "2.0", "method": "Calc.Add", "params": [1]}),
        )
        .await;

        assert_eq!(reply["error"]["code"], -32602);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dispatch__after_hook_rejects__then_result_discarded() {
        let (mut dispatcher, calc) = calc_dispatcher();
        dispatcher.set_after_invoke(|_, _, result| {
            if result == &json!(5) {
                bail!("result withheld");
            }
            Ok(())
        });

        let reply = handle_json(
            &dispatcher,
            json!({"id": "6", "jsonrpc": "2.0", "method": "Calc.Add", "params": {"A": 2, "B": 3}}),
        )
        .await;

        assert_eq!(reply["error"]["message"], "result withheld");
        assert!(reply.get("result").is_none());
        assert_eq!(calc.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dispatch__validation_failure__then_invalid_request_keeps_id() {
        let (dispatcher, _) = calc_dispatcher();
        let reply = handle_json(
            &dispatcher,
            json!({"id": "8", "jsonrpc": "1.0", "method": "Calc.Add"}),
        )
        .await;

        assert_eq!(reply["id"], "8");
        assert_eq!(reply["error"]["code"], -32600);
    }
}
