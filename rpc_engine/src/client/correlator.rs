//! Request building and response correlation for the client role.
//!
//! Single calls match their one reply directly. Batches are correlated by
//! position: the i-th element of the reply array answers the i-th queued call.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use super::errors::ClientError;
use crate::{
    framing::FramingOptions,
    protocol::{codec, JsonRpcError},
};

/// One request/reply exchange over some transport.
#[async_trait]
pub trait Exchange: Send {
    async fn round_trip(&mut self, payload: Vec<u8>) -> Result<Vec<u8>, ClientError>;

    /// Only meaningful for stream transports.
    fn set_framing_options(&mut self, _options: FramingOptions) {}
}

#[async_trait]
impl Exchange for Box<dyn Exchange> {
    async fn round_trip(&mut self, payload: Vec<u8>) -> Result<Vec<u8>, ClientError> {
        (**self).round_trip(payload).await
    }

    fn set_framing_options(&mut self, options: FramingOptions) {
        (**self).set_framing_options(options);
    }
}

/// Receives the outcome of one batched call once the batch has been sent.
pub struct BatchSlot<R> {
    cell: Arc<Mutex<Option<Result<R, ClientError>>>>,
}

impl<R> BatchSlot<R> {
    pub fn is_filled(&self) -> bool {
        self.cell.lock().is_some()
    }

    /// Takes the outcome; `None` until the batch has been called.
    pub fn take(&self) -> Option<Result<R, ClientError>> {
        self.cell.lock().take()
    }
}

type Sink = Box<dyn FnOnce(Result<Value, ClientError>) + Send>;

struct PendingCall {
    method: String,
    params: Value,
    notify: bool,
    sink: Sink,
}

pub struct Client<E> {
    exchange: E,
    pending: Vec<PendingCall>,
}

impl<E: Exchange> Client<E> {
    pub fn new(exchange: E) -> Self {
        Self {
            exchange,
            pending: Vec::new(),
        }
    }

    pub fn exchange(&self) -> &E {
        &self.exchange
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn set_framing_options(&mut self, options: FramingOptions) {
        self.exchange.set_framing_options(options);
    }

    /// Sends one request and decodes its result.
    ///
    /// A notification still waits for the server's reply, which carries the
    /// result without an id.
    pub async fn call<P, R>(
        &mut self,
        method: &str,
        params: P,
        notify: bool,
    ) -> Result<R, ClientError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let params = serde_json::to_value(params).map_err(ClientError::Encode)?;
        let request = codec::build_request(request_id(notify), method, params);
        tracing::debug!(method, notify, "sending rpc call");

        let reply = self.exchange.round_trip(codec::encode(&request)).await?;
        let reply: Value = serde_json::from_slice(&reply)?;
        let result = into_outcome(reply)?;
        Ok(serde_json::from_value(result)?)
    }

    /// Queues a call for the next [`Client::batch_call`]; nothing is sent yet.
    pub fn batch_append<P, R>(
        &mut self,
        method: &str,
        params: P,
        notify: bool,
    ) -> Result<BatchSlot<R>, ClientError>
    where
        P: Serialize,
        R: DeserializeOwned + Send + 'static,
    {
        let params = serde_json::to_value(params).map_err(ClientError::Encode)?;
        let cell = Arc::new(Mutex::new(None));
        let target = Arc::clone(&cell);
        let sink: Sink = Box::new(move |outcome: Result<Value, ClientError>| {
            let decoded = outcome.and_then(|value| Ok(serde_json::from_value::<R>(value)?));
            *target.lock() = Some(decoded);
        });

        self.pending.push(PendingCall {
            method: method.to_string(),
            params,
            notify,
            sink,
        });
        Ok(BatchSlot { cell })
    }

    /// Sends every queued call as one array and fills the slots by position.
    ///
    /// The queue is emptied whatever the outcome. Per-entry failures land in
    /// their own slot; an `Err` here means the batch as a whole failed, in
    /// which case every slot holds [`ClientError::BatchAborted`].
    pub async fn batch_call(&mut self) -> Result<(), ClientError> {
        let pending = std::mem::take(&mut self.pending);
        if pending.is_empty() {
            return Ok(());
        }

        let requests: Vec<_> = pending
            .iter()
            .map(|call| {
                codec::build_request(request_id(call.notify), &call.method, call.params.clone())
            })
            .collect();
        tracing::debug!(calls = requests.len(), "sending rpc batch");

        let replies = match self.batch_round_trip(codec::encode(&requests)).await {
            Ok(replies) => replies,
            Err(err) => {
                let reason = err.to_string();
                for call in pending {
                    (call.sink)(Err(ClientError::BatchAborted(reason.clone())));
                }
                return Err(err);
            }
        };

        let mut replies = replies.into_iter();
        for (index, call) in pending.into_iter().enumerate() {
            let outcome = match replies.next() {
                Some(reply) => into_outcome(reply),
                None => Err(ClientError::MissingResponse(index)),
            };
            (call.sink)(outcome);
        }
        Ok(())
    }

    async fn batch_round_trip(&mut self, payload: Vec<u8>) -> Result<Vec<Value>, ClientError> {
        let reply = self.exchange.round_trip(payload).await?;
        match serde_json::from_slice::<Value>(&reply)? {
            Value::Array(replies) => Ok(replies),
            // a whole-batch rejection comes back as one error object
            single => match into_outcome(single) {
                Err(err) => Err(err),
                Ok(_) => Err(ClientError::UnexpectedReply(
                    "expected an array answering the batch".into(),
                )),
            },
        }
    }
}

fn request_id(notify: bool) -> Option<String> {
    if notify {
        None
    } else {
        Some(chrono::Utc::now().timestamp_micros().to_string())
    }
}

/// Splits one reply object into its result or its error.
fn into_outcome(reply: Value) -> Result<Value, ClientError> {
    let Value::Object(mut fields) = reply else {
        return Err(ClientError::UnexpectedReply("reply is not an object".into()));
    };

    match fields.remove("error") {
        Some(Value::Null) | None => {}
        Some(error) => {
            let error: JsonRpcError = serde_json::from_value(error)?;
            return Err(error.into());
        }
    }

    fields
        .remove("result")
        .ok_or_else(|| ClientError::UnexpectedReply("reply has neither result nor error".into()))
}
