//! Durable notification delivery to client sessions.
//!
//! Producers queue notifications for one session or for every live session
//! of a user. Rows live in the store until the session's delivery task
//! acknowledges them, so a restart in between redelivers them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Notify;
use tracing::debug;

use switchboard_shared::protocol::Notification;
use switchboard_shared::types::{SessionId, UserId};
use switchboard_store::StateStore;

use crate::error::Result;

/// Upper bound of notifications handed out by one [`Outbox::next_batch`].
pub const MAX_BATCH: usize = 500;

#[derive(Clone)]
pub struct Outbox {
    store: StateStore,
    wakers: Arc<Mutex<HashMap<SessionId, Arc<Notify>>>>,
}

impl Outbox {
    pub fn new(store: StateStore) -> Self {
        Self {
            store,
            wakers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Make `session` a live session of `user`.
    pub async fn open_session(&self, user: &UserId, session: &SessionId) -> Result<()> {
        self.store
            .run(|db| db.register_session(user, session))
            .await?;
        self.waker(session);
        Ok(())
    }

    /// Drop the session and everything still queued for it.
    pub async fn close_session(&self, user: &UserId, session: &SessionId) -> Result<()> {
        self.store
            .run(|db| db.unregister_session(user, session))
            .await?;

        if let Some(waker) = self.lock_wakers().remove(session) {
            waker.notify_waiters();
        }
        Ok(())
    }

    /// Close every session that has not polled for `max_idle`, dropping
    /// its queued rows. Returns the closed sessions.
    pub async fn reap_idle(&self, max_idle: Duration) -> Result<Vec<(UserId, SessionId)>> {
        let cutoff = Utc::now().timestamp() - max_idle.as_secs() as i64;
        let idle = self
            .store
            .run(|db| {
                let idle = db.idle_sessions(cutoff)?;
                for (user, session) in &idle {
                    db.unregister_session(user, session)?;
                }
                Ok(idle)
            })
            .await?;

        let mut wakers = self.lock_wakers();
        for (_, session) in &idle {
            if let Some(waker) = wakers.remove(session) {
                waker.notify_waiters();
            }
        }
        Ok(idle)
    }

    pub async fn session_owner(&self, session: &SessionId) -> Result<Option<UserId>> {
        Ok(self.store.run(|db| db.session_owner(session)).await?)
    }

    /// Queue one notification for one session.
    pub async fn queue(&self, user: &UserId, session: &SessionId, ntf: Notification) -> Result<()> {
        self.queue_many(user, session, vec![ntf]).await
    }

    /// Queue a batch for one session. A session that is no longer live
    /// gets nothing.
    pub async fn queue_many(
        &self,
        user: &UserId,
        session: &SessionId,
        ntfs: Vec<Notification>,
    ) -> Result<()> {
        let queued = self
            .store
            .run(|db| {
                if !db.is_live_session(user, session)? {
                    return Ok(false);
                }
                db.enqueue_many(user, std::slice::from_ref(session), &ntfs)?;
                Ok(true)
            })
            .await?;

        if queued {
            self.wake(session);
        } else {
            debug!(user = %user, session = %session, "Dropping notification for a closed session");
        }
        Ok(())
    }

    /// Queue one notification for every live session of `user`.
    pub async fn queue_all(&self, user: &UserId, ntf: Notification) -> Result<()> {
        self.queue_all_many(user, vec![ntf]).await
    }

    /// Queue a batch for every live session of `user`. Sessions opened
    /// later do not see it; they rebuild their state from the bootstrap.
    pub async fn queue_all_many(&self, user: &UserId, ntfs: Vec<Notification>) -> Result<()> {
        let sessions = self
            .store
            .run(|db| {
                let sessions = db.live_sessions(user)?;
                if !sessions.is_empty() {
                    db.enqueue_many(user, &sessions, &ntfs)?;
                }
                Ok(sessions)
            })
            .await?;

        if sessions.is_empty() {
            debug!(user = %user, count = ntfs.len(), "No live sessions, notifications dropped");
        }
        for session in &sessions {
            self.wake(session);
        }
        Ok(())
    }

    /// Acknowledge everything up to `upto`, then return what is still
    /// pending. Waits up to `wait` for something to arrive when the queue is
    /// empty.
    pub async fn next_batch(
        &self,
        user: &UserId,
        session: &SessionId,
        upto: Option<i64>,
        wait: Duration,
    ) -> Result<Vec<(i64, Notification)>> {
        self.store
            .run(|db| {
                db.touch_session(session, Utc::now().timestamp())?;
                if let Some(upto) = upto {
                    db.ack(user, session, upto)?;
                }
                Ok(())
            })
            .await?;

        let batch = self.pending(user, session).await?;
        if !batch.is_empty() || wait.is_zero() {
            return Ok(batch);
        }

        let waker = self.waker(session);
        let _ = tokio::time::timeout(wait, waker.notified()).await;

        self.pending(user, session).await
    }

    async fn pending(&self, user: &UserId, session: &SessionId) -> Result<Vec<(i64, Notification)>> {
        Ok(self
            .store
            .run(|db| db.pending(user, session, MAX_BATCH))
            .await?)
    }

    fn waker(&self, session: &SessionId) -> Arc<Notify> {
        self.lock_wakers()
            .entry(session.clone())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    fn wake(&self, session: &SessionId) {
        self.waker(session).notify_one();
    }

    fn lock_wakers(&self) -> std::sync::MutexGuard<'_, HashMap<SessionId, Arc<Notify>>> {
        self.wakers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
