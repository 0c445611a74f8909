use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use switchboard_bus::{BusError, Courier, Endpoint};
use switchboard_store::StateStore;

use crate::config::ServerConfig;
use crate::error::Result;
use crate::outbox::Outbox;

/// Handles shared by every backend of the relay.
#[derive(Clone)]
pub struct Context {
    pub store: StateStore,
    pub outbox: Outbox,
    pub courier: Courier,
    pub config: Arc<ServerConfig>,
}

impl Context {
    pub fn new(store: StateStore, courier: Courier, config: ServerConfig) -> Self {
        Self {
            outbox: Outbox::new(store.clone()),
            store,
            courier,
            config: Arc::new(config),
        }
    }
}

/// Install `handler` for `event` on `endpoint`, handing it a clone of
/// `service`. Handler errors travel back to the caller as
/// [`BusError::Handler`].
pub fn route<S, P, F, Fut>(endpoint: &mut Endpoint, event: &str, service: &S, handler: F)
where
    S: Clone + Send + Sync + 'static,
    P: DeserializeOwned + Send + 'static,
    F: Fn(S, P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let service = service.clone();
    let event_name = event.to_string();

    endpoint.on(event, move |params: P| {
        let fut = handler(service.clone(), params);
        let event = event_name.clone();
        async move {
            fut.await.map(|()| Value::Null).map_err(|e| {
                tracing::warn!(event = %event, error = %e, "Handler failed");
                BusError::Handler(e.to_string())
            })
        }
    });
}
