use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::courier::{Courier, Request};
use crate::error::BusError;
use crate::lanes::{lane_key, Lanes};

pub type HandlerResult = Result<Value, BusError>;

/// Type-erased event handler.
pub type Handler = Arc<dyn Fn(Value) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// One registered instance of a named endpoint.
pub struct Endpoint {
    name: String,
    courier: Courier,
    inbox: mpsc::UnboundedReceiver<Request>,
    handlers: HashMap<String, Handler>,
}

impl Endpoint {
    pub(crate) fn new(name: &str, courier: Courier, inbox: mpsc::UnboundedReceiver<Request>) -> Self {
        Self {
            name: name.to_string(),
            courier,
            inbox,
            handlers: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Install the handler for `event`. Parameters are decoded from JSON
    /// before the handler runs; a decoding failure is returned to the caller
    /// as [`BusError::Serialization`].
    pub fn on<P, F, Fut>(&mut self, event: &str, handler: F) -> &mut Self
    where
        P: DeserializeOwned + Send + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |value: Value| match serde_json::from_value::<P>(value) {
            Ok(params) => handler(params).boxed(),
            Err(e) => future::ready(Err(BusError::from(e))).boxed(),
        });
        self.handlers.insert(event.to_string(), handler);
        self
    }

    /// Start the dispatch loop.
    ///
    /// Requests carrying both `userId` and `network` run one after another
    /// on the lane of that pair; everything else runs on its own task. A
    /// handler must not await a call that lands on its own lane.
    pub fn start(self) -> JoinHandle<()> {
        let Endpoint {
            name,
            courier,
            mut inbox,
            handlers,
        } = self;

        tokio::spawn(async move {
            let mut lanes = Lanes::default();

            while let Some(request) = inbox.recv().await {
                let Some(handler) = handlers.get(&request.event).cloned() else {
                    debug!(endpoint = %name, event = %request.event, "No handler for event");
                    if request.expects_reply {
                        courier.complete(
                            request.id,
                            Err(BusError::UnknownEvent {
                                endpoint: name.clone(),
                                event: request.event,
                            }),
                        );
                    }
                    continue;
                };

                let lane = lane_key(&request.params);
                let job = run_handler(name.clone(), courier.clone(), handler, request);

                match lane {
                    Some(lane) => lanes.run(lane, job),
                    None => {
                        tokio::spawn(job);
                    }
                }
            }

            debug!(endpoint = %name, "Endpoint inbox closed");
        })
    }
}

fn run_handler(
    endpoint: String,
    courier: Courier,
    handler: Handler,
    request: Request,
) -> BoxFuture<'static, ()> {
    async move {
        let Request {
            id,
            event,
            params,
            expects_reply,
        } = request;

        let result = handler(params).await;
        if let Err(e) = &result {
            warn!(endpoint = %endpoint, event = %event, error = %e, "Handler failed");
        }
        if expects_reply {
            courier.complete(id, result);
        }
    }
    .boxed()
}
