//! Durable per-session notification queues and the live session registry.
//!
//! Each row of the `outbox` table is one notification waiting for one
//! session. Rows are drained in `seq` order and removed once the session
//! acknowledges them.

use chrono::Utc;
use rusqlite::params;

use switchboard_shared::protocol::Notification;
use switchboard_shared::types::{SessionId, UserId};

use crate::database::Database;
use crate::error::Result;
use crate::keys;

impl Database {
    // ------------------------------------------------------------------
    // Session registry
    // ------------------------------------------------------------------

    pub fn register_session(&self, user: &UserId, session: &SessionId) -> Result<()> {
        self.sadd(&keys::sessions(user), &session.0)?;
        self.hset(keys::SESSION_OWNERS, &session.0, user.as_str())?;
        self.touch_session(session, Utc::now().timestamp())
    }

    /// Forget a session and drop everything still queued for it.
    pub fn unregister_session(&self, user: &UserId, session: &SessionId) -> Result<()> {
        self.srem(&keys::sessions(user), &session.0)?;
        self.hdel(keys::SESSION_OWNERS, &session.0)?;
        self.hdel(keys::SESSION_SEEN, &session.0)?;
        self.purge_session(user, session)
    }

    /// Record that the session polled at `now` (unix seconds).
    pub fn touch_session(&self, session: &SessionId, now: i64) -> Result<()> {
        self.hset(keys::SESSION_SEEN, &session.0, &now.to_string())
    }

    /// Sessions whose last poll is older than `cutoff` (unix seconds). A
    /// session with no recorded poll counts as idle.
    pub fn idle_sessions(&self, cutoff: i64) -> Result<Vec<(UserId, SessionId)>> {
        let seen = self.hgetall(keys::SESSION_SEEN)?;

        Ok(self
            .hgetall(keys::SESSION_OWNERS)?
            .into_iter()
            .filter(|(session, _)| {
                seen.get(session)
                    .and_then(|ts| ts.parse::<i64>().ok())
                    .map_or(true, |ts| ts < cutoff)
            })
            .map(|(session, user)| (UserId(user), SessionId(session)))
            .collect())
    }

    /// User owning a live session.
    pub fn session_owner(&self, session: &SessionId) -> Result<Option<UserId>> {
        Ok(self.hget(keys::SESSION_OWNERS, &session.0)?.map(UserId))
    }

    pub fn live_sessions(&self, user: &UserId) -> Result<Vec<SessionId>> {
        Ok(self
            .smembers(&keys::sessions(user))?
            .into_iter()
            .map(SessionId)
            .collect())
    }

    pub fn is_live_session(&self, user: &UserId, session: &SessionId) -> Result<bool> {
        self.sismember(&keys::sessions(user), &session.0)
    }

    // ------------------------------------------------------------------
    // Queue
    // ------------------------------------------------------------------

    /// Append one notification to a session queue, returning its sequence
    /// number.
    pub fn enqueue(
        &self,
        user: &UserId,
        session: &SessionId,
        notification: &Notification,
    ) -> Result<i64> {
        let payload = serde_json::to_string(notification)?;
        self.conn().execute(
            "INSERT INTO outbox (user_id, session_id, payload) VALUES (?1, ?2, ?3)",
            params![user.as_str(), session.0, payload],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    /// Append a batch of notifications to each of the given sessions in one
    /// transaction. Every session sees the batch contiguously and in order.
    pub fn enqueue_many(
        &mut self,
        user: &UserId,
        sessions: &[SessionId],
        notifications: &[Notification],
    ) -> Result<()> {
        let payloads = notifications
            .iter()
            .map(serde_json::to_string)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let tx = self.conn_mut().transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO outbox (user_id, session_id, payload) VALUES (?1, ?2, ?3)",
            )?;
            for session in sessions {
                for payload in &payloads {
                    stmt.execute(params![user.as_str(), session.0, payload])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Up to `limit` queued notifications of a session, oldest first.
    pub fn pending(
        &self,
        user: &UserId,
        session: &SessionId,
        limit: usize,
    ) -> Result<Vec<(i64, Notification)>> {
        let mut stmt = self.conn().prepare(
            "SELECT seq, payload FROM outbox
             WHERE user_id = ?1 AND session_id = ?2
             ORDER BY seq ASC LIMIT ?3",
        )?;

        let rows = stmt.query_map(params![user.as_str(), session.0, limit as i64], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut pending = Vec::new();
        for row in rows {
            let (seq, payload) = row?;
            pending.push((seq, serde_json::from_str(&payload)?));
        }
        Ok(pending)
    }

    /// Remove every notification of a session with `seq <= upto`.
    pub fn ack(&self, user: &UserId, session: &SessionId, upto: i64) -> Result<usize> {
        Ok(self.conn().execute(
            "DELETE FROM outbox WHERE user_id = ?1 AND session_id = ?2 AND seq <= ?3",
            params![user.as_str(), session.0, upto],
        )?)
    }

    pub fn purge_session(&self, user: &UserId, session: &SessionId) -> Result<()> {
        self.conn().execute(
            "DELETE FROM outbox WHERE user_id = ?1 AND session_id = ?2",
            params![user.as_str(), session.0],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_order_and_ack() {
        let db = Database::open_in_memory().unwrap();
        let user = UserId::new("m1");
        let session = SessionId::new();

        db.enqueue(&user, &session, &Notification::FinishInit).unwrap();
        let second = db
            .enqueue(&user, &session, &Notification::StartupSequence { length: 3 })
            .unwrap();

        let pending = db.pending(&user, &session, 10).unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].1, Notification::FinishInit);

        db.ack(&user, &session, pending[0].0).unwrap();
        let pending = db.pending(&user, &session, 10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].0, second);
    }

    #[test]
    fn test_batches_fan_out_per_session() {
        let mut db = Database::open_in_memory().unwrap();
        let user = UserId::new("m1");
        let a = SessionId::new();
        let b = SessionId::new();

        let batch = [
            Notification::StartupSequence { length: 1 },
            Notification::FinishInit,
        ];
        db.enqueue_many(&user, &[a.clone(), b.clone()], &batch).unwrap();

        for session in [&a, &b] {
            let kinds: Vec<_> = db
                .pending(&user, session, 10)
                .unwrap()
                .into_iter()
                .map(|(_, n)| n)
                .collect();
            assert_eq!(kinds, batch);
        }
    }

    #[test]
    fn test_idle_sessions_by_last_poll() {
        let db = Database::open_in_memory().unwrap();
        let user = UserId::new("m1");
        let (fresh, stale, untracked) = (SessionId::new(), SessionId::new(), SessionId::new());

        db.register_session(&user, &fresh).unwrap();
        db.register_session(&user, &stale).unwrap();
        db.register_session(&user, &untracked).unwrap();
        db.touch_session(&fresh, 1_000).unwrap();
        db.touch_session(&stale, 400).unwrap();
        db.hdel(keys::SESSION_SEEN, &untracked.0).unwrap();

        let mut idle: Vec<_> = db.idle_sessions(500).unwrap().into_iter().map(|(_, s)| s).collect();
        idle.sort();
        let mut expected = vec![stale.clone(), untracked.clone()];
        expected.sort();
        assert_eq!(idle, expected);

        db.unregister_session(&user, &stale).unwrap();
        assert_eq!(db.hget(keys::SESSION_SEEN, &stale.0).unwrap(), None);
    }

    #[test]
    fn test_unregister_purges_queue() {
        let db = Database::open_in_memory().unwrap();
        let user = UserId::new("m1");
        let session = SessionId::new();

        db.register_session(&user, &session).unwrap();
        db.enqueue(&user, &session, &Notification::FinishInit).unwrap();
        assert_eq!(db.live_sessions(&user).unwrap(), vec![session.clone()]);
        assert_eq!(db.session_owner(&session).unwrap(), Some(user.clone()));

        db.unregister_session(&user, &session).unwrap();
        assert!(db.live_sessions(&user).unwrap().is_empty());
        assert_eq!(db.session_owner(&session).unwrap(), None);
        assert!(db.pending(&user, &session, 10).unwrap().is_empty());
    }
}
