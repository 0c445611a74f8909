//! Sequential execution lanes keyed by `(userId, network)`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::mpsc;

/// Lane of a request: `"{userId}:{network}"` when both fields are present
/// as strings in the parameters.
pub fn lane_key(params: &Value) -> Option<String> {
    let user = params.get("userId")?.as_str()?;
    let network = params.get("network")?.as_str()?;
    Some(format!("{user}:{network}"))
}

struct Worker {
    jobs: mpsc::UnboundedSender<BoxFuture<'static, ()>>,
    /// Jobs queued or running.
    pending: Arc<AtomicUsize>,
}

/// One worker task per busy lane. A worker whose queue has run dry is
/// dropped on the next dispatch and its task exits.
#[derive(Default)]
pub(crate) struct Lanes {
    workers: HashMap<String, Worker>,
}

impl Lanes {
    pub fn run(&mut self, lane: String, job: BoxFuture<'static, ()>) {
        self.workers
            .retain(|_, worker| worker.pending.load(Ordering::Acquire) > 0);

        let job = match self.workers.get(&lane) {
            Some(worker) => {
                worker.pending.fetch_add(1, Ordering::AcqRel);
                match worker.jobs.send(job) {
                    Ok(()) => return,
                    Err(mpsc::error::SendError(job)) => job,
                }
            }
            None => job,
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<BoxFuture<'static, ()>>();
        let pending = Arc::new(AtomicUsize::new(1));
        let done = pending.clone();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job.await;
                done.fetch_sub(1, Ordering::AcqRel);
            }
        });

        let _ = tx.send(job);
        self.workers.insert(lane, Worker { jobs: tx, pending });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Courier;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[test]
    fn test_lane_key() {
        assert_eq!(
            lane_key(&json!({ "userId": "m1", "network": "IRCNet", "line": "x" })),
            Some("m1:IRCNet".to_string())
        );
        assert_eq!(lane_key(&json!({ "userId": "m1" })), None);
        assert_eq!(lane_key(&json!("bare")), None);
    }

    #[tokio::test]
    async fn test_same_lane_runs_in_order() {
        let courier = Courier::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut endpoint = courier.register_endpoint("gateway");
        let log = seen.clone();
        endpoint.on("data", move |params: Value| {
            let log = log.clone();
            async move {
                let seq = params["seq"].as_u64().unwrap_or_default();
                // Earlier lines take longer, so only lane ordering keeps them first.
                tokio::time::sleep(Duration::from_millis(30 - seq * 10)).await;
                log.lock().unwrap().push(seq);
                Ok(Value::Null)
            }
        });
        endpoint.start();

        for seq in 0..3u64 {
            courier
                .call_no_wait("gateway", "data", &json!({ "userId": "m1", "network": "IRCNet", "seq": seq }))
                .unwrap();
        }
        let _: () = courier
            .send("gateway", "data", &json!({ "userId": "m1", "network": "IRCNet", "seq": 3 }))
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_idle_lanes_are_dropped() {
        let mut lanes = Lanes::default();
        let (tx, mut rx) = mpsc::unbounded_channel();

        for lane in ["m1:IRCNet", "m2:IRCNet"] {
            let tx = tx.clone();
            lanes.run(lane.to_string(), Box::pin(async move {
                let _ = tx.send(());
            }));
        }
        rx.recv().await.unwrap();
        rx.recv().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let (release, gate) = oneshot::channel::<()>();
        lanes.run("m3:IRCNet".to_string(), Box::pin(async move {
            let _ = gate.await;
        }));
        assert_eq!(lanes.workers.keys().collect::<Vec<_>>(), vec!["m3:IRCNet"]);

        // A busy lane keeps its worker.
        let tx2 = tx.clone();
        lanes.run("m1:IRCNet".to_string(), Box::pin(async move {
            let _ = tx2.send(());
        }));
        assert!(lanes.workers.contains_key("m3:IRCNet"));
        rx.recv().await.unwrap();

        let _ = release.send(());
    }
}
