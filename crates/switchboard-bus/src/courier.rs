//! Courier broker: endpoint registry, round-robin delivery and request /
//! reply correlation.
//!
//! Every endpoint instance owns an unbounded inbox. A call picks one
//! instance of the target endpoint name, pushes a [`Request`] into its
//! inbox and, for awaited calls, parks a oneshot under the request id until
//! the handler's result comes back through [`Courier::complete`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::endpoint::{Endpoint, HandlerResult};
use crate::error::BusError;

/// One message travelling to an endpoint instance.
#[derive(Debug)]
pub(crate) struct Request {
    pub id: Uuid,
    pub event: String,
    pub params: Value,
    /// `false` for `call_no_wait` and `broadcast`.
    pub expects_reply: bool,
}

pub(crate) type Inbox = mpsc::UnboundedSender<Request>;

#[derive(Default)]
struct Slot {
    instances: Vec<Inbox>,
    next: usize,
}

#[derive(Default)]
struct Inner {
    endpoints: Mutex<HashMap<String, Slot>>,
    pending: Mutex<HashMap<Uuid, oneshot::Sender<HandlerResult>>>,
}

/// Cloneable handle to the bus.
#[derive(Clone, Default)]
pub struct Courier {
    inner: Arc<Inner>,
}

impl Courier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new instance of the endpoint `name`. Install handlers
    /// with [`Endpoint::on`], then call [`Endpoint::start`].
    pub fn register_endpoint(&self, name: &str) -> Endpoint {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut endpoints = self.inner.endpoints.lock().unwrap_or_else(PoisonError::into_inner);
        endpoints.entry(name.to_string()).or_default().instances.push(tx);
        debug!(endpoint = name, "Endpoint registered");

        Endpoint::new(name, self.clone(), rx)
    }

    /// Call `event` on `target` and wait for the handler's result. The bus
    /// applies no timeout.
    pub async fn send<P, R>(&self, target: &str, event: &str, params: &P) -> Result<R, BusError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        self.lock_pending().insert(id, tx);

        let request = Request {
            id,
            event: event.to_string(),
            params: serde_json::to_value(params)?,
            expects_reply: true,
        };

        if let Err(e) = self.deliver(target, request) {
            self.lock_pending().remove(&id);
            return Err(e);
        }

        let value = rx.await.map_err(|_| BusError::NoReply(id))??;
        Ok(serde_json::from_value(value)?)
    }

    /// Fire `event` at one instance of `target` without waiting.
    pub fn call_no_wait<P>(&self, target: &str, event: &str, params: &P) -> Result<(), BusError>
    where
        P: Serialize + ?Sized,
    {
        let request = Request {
            id: Uuid::new_v4(),
            event: event.to_string(),
            params: serde_json::to_value(params)?,
            expects_reply: false,
        };
        self.deliver(target, request)
    }

    /// Fire `event` at one instance of every registered endpoint. Endpoints
    /// without a handler for it ignore it. Returns the number of endpoints
    /// reached.
    pub fn broadcast<P>(&self, event: &str, params: &P) -> Result<usize, BusError>
    where
        P: Serialize + ?Sized,
    {
        let params = serde_json::to_value(params)?;
        let names: Vec<String> = self
            .inner
            .endpoints
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();

        let mut reached = 0;
        for name in names {
            let request = Request {
                id: Uuid::new_v4(),
                event: event.to_string(),
                params: params.clone(),
                expects_reply: false,
            };
            if self.deliver(&name, request).is_ok() {
                reached += 1;
            }
        }
        Ok(reached)
    }

    /// Route a handler result back to the caller waiting on `id`.
    pub(crate) fn complete(&self, id: Uuid, result: HandlerResult) {
        match self.lock_pending().remove(&id) {
            Some(tx) => {
                let _ = tx.send(result);
            }
            None => trace!(request = %id, "Reply for unknown or abandoned request"),
        }
    }

    /// Hand the request to the next live instance of `target`. Instances
    /// whose inbox is closed are pruned on the way.
    fn deliver(&self, target: &str, mut request: Request) -> Result<(), BusError> {
        let mut endpoints = self.inner.endpoints.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = endpoints
            .get_mut(target)
            .ok_or_else(|| BusError::Unavailable(target.to_string()))?;

        while !slot.instances.is_empty() {
            let index = slot.next % slot.instances.len();
            match slot.instances[index].send(request) {
                Ok(()) => {
                    slot.next = index + 1;
                    return Ok(());
                }
                Err(mpsc::error::SendError(returned)) => {
                    debug!(endpoint = target, "Pruning stopped endpoint instance");
                    slot.instances.remove(index);
                    request = returned;
                }
            }
        }

        endpoints.remove(target);
        Err(BusError::Unavailable(target.to_string()))
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, oneshot::Sender<HandlerResult>>> {
        self.inner.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
