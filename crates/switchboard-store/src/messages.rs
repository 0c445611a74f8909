use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use switchboard_shared::types::{Gid, MessageStatus, UserId, WindowId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::keys;
use crate::models::{Message, NewMessage};

const COLUMNS: &str = "gid, window_id, user_id, body, cat, ts, status, updated_id, updated_ts";

impl Database {
    /// Allocate the next id from the global gid sequence. Message gids and
    /// edit ids share it, so an edit always sorts after every earlier line.
    pub fn next_gid(&self) -> Result<Gid> {
        Ok(Gid(self.hincrby(keys::COUNTERS, keys::GID_COUNTER, 1)? as u64))
    }

    /// Store a new original message and return it with its gid.
    pub fn insert_message(&self, new: NewMessage<'_>) -> Result<Message> {
        let gid = self.next_gid()?;

        self.conn().execute(
            "INSERT INTO messages (gid, window_id, user_id, body, cat, ts, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                gid.0 as i64,
                new.window_id.0 as i64,
                new.user_id.map(|u| u.as_str()),
                new.body,
                new.cat,
                new.ts,
                MessageStatus::Original.as_str(),
            ],
        )?;

        Ok(Message {
            gid,
            window_id: new.window_id,
            user_id: new.user_id.cloned(),
            body: new.body.to_string(),
            cat: new.cat.to_string(),
            ts: new.ts,
            status: MessageStatus::Original,
            updated_id: None,
            updated_ts: None,
        })
    }

    pub fn get_message(&self, gid: Gid) -> Result<Message> {
        self.conn()
            .query_row(
                &format!("SELECT {COLUMNS} FROM messages WHERE gid = ?1"),
                params![gid.0 as i64],
                row_to_message,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("message {gid}")))?
    }

    /// All messages of a window in gid order.
    pub fn messages_for_window(&self, window_id: WindowId) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {COLUMNS} FROM messages WHERE window_id = ?1 ORDER BY gid ASC"
        ))?;

        let rows = stmt.query_map(params![window_id.0 as i64], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row??);
        }
        Ok(messages)
    }

    /// The newest `limit` messages of a window, returned in gid order.
    pub fn last_messages(&self, window_id: WindowId, limit: usize) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {COLUMNS} FROM messages WHERE window_id = ?1 ORDER BY gid DESC LIMIT ?2"
        ))?;

        let rows = stmt.query_map(params![window_id.0 as i64, limit as i64], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row??);
        }
        messages.reverse();
        Ok(messages)
    }

    /// Edited or deleted messages of a window whose `updated_id` is at or
    /// after `since`, in gid order. The window's whole history is searched.
    pub fn edits_since(&self, window_id: WindowId, since: Gid) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {COLUMNS} FROM messages
             WHERE window_id = ?1 AND status != ?2 AND updated_id >= ?3
             ORDER BY gid ASC"
        ))?;

        let rows = stmt.query_map(
            params![
                window_id.0 as i64,
                MessageStatus::Original.as_str(),
                since.0 as i64
            ],
            row_to_message,
        )?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row??);
        }
        Ok(messages)
    }

    /// Rewrite a message as `edited` (with the new body) or `deleted`
    /// (with an empty body). The record gets a fresh `updated_id` from the
    /// gid sequence so clients holding older watermarks pick the change up.
    ///
    /// Rewriting into `original` is rejected.
    pub fn update_message(
        &self,
        gid: Gid,
        status: MessageStatus,
        body: Option<&str>,
    ) -> Result<Message> {
        if status == MessageStatus::Original {
            return Err(StoreError::InvalidTransition(gid.0));
        }

        let mut message = self.get_message(gid)?;
        if message.status == MessageStatus::Deleted {
            return Err(StoreError::InvalidTransition(gid.0));
        }

        let updated_id = self.next_gid()?;
        let updated_ts = Utc::now().timestamp();

        message.body = match status {
            MessageStatus::Deleted => String::new(),
            _ => body.unwrap_or(&message.body).to_string(),
        };
        message.status = status;
        message.updated_id = Some(updated_id);
        message.updated_ts = Some(updated_ts);

        self.conn().execute(
            "UPDATE messages
             SET body = ?2, status = ?3, updated_id = ?4, updated_ts = ?5
             WHERE gid = ?1",
            params![
                gid.0 as i64,
                message.body,
                status.as_str(),
                updated_id.0 as i64,
                updated_ts,
            ],
        )?;

        Ok(message)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<Message>> {
    let gid: i64 = row.get(0)?;
    let window_id: i64 = row.get(1)?;
    let user_id: Option<String> = row.get(2)?;
    let body: String = row.get(3)?;
    let cat: String = row.get(4)?;
    let ts: i64 = row.get(5)?;
    let status: String = row.get(6)?;
    let updated_id: Option<i64> = row.get(7)?;
    let updated_ts: Option<i64> = row.get(8)?;

    Ok(status
        .parse::<MessageStatus>()
        .map_err(StoreError::from)
        .map(|status| Message {
            gid: Gid(gid as u64),
            window_id: WindowId(window_id as u64),
            user_id: user_id.map(UserId),
            body,
            cat,
            ts,
            status,
            updated_id: updated_id.map(|id| Gid(id as u64)),
            updated_ts,
        }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(db: &Database, window: u64, body: &str) -> Message {
        db.insert_message(NewMessage {
            window_id: WindowId(window),
            user_id: None,
            body,
            cat: "msg",
            ts: 1_700_000_000,
        })
        .unwrap()
    }

    #[test]
    fn test_gids_strictly_increase() {
        let db = Database::open_in_memory().unwrap();

        let a = line(&db, 1, "a");
        let b = line(&db, 2, "b");
        let c = line(&db, 1, "c");

        assert!(a.gid < b.gid && b.gid < c.gid);
        assert_eq!(db.messages_for_window(WindowId(1)).unwrap(), vec![a, c]);
    }

    #[test]
    fn test_last_messages_keeps_order() {
        let db = Database::open_in_memory().unwrap();
        for i in 0..5 {
            line(&db, 1, &format!("line {i}"));
        }

        let last = db.last_messages(WindowId(1), 2).unwrap();
        let bodies: Vec<_> = last.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, ["line 3", "line 4"]);
    }

    #[test]
    fn test_edit_gets_new_update_id() {
        let db = Database::open_in_memory().unwrap();
        let original = line(&db, 1, "teh");
        let later = line(&db, 1, "more");

        let edited = db
            .update_message(original.gid, MessageStatus::Edited, Some("the"))
            .unwrap();

        assert_eq!(edited.status, MessageStatus::Edited);
        assert_eq!(edited.body, "the");
        assert!(edited.updated_id.unwrap() > later.gid);
        assert_eq!(db.get_message(original.gid).unwrap(), edited);
    }

    #[test]
    fn test_original_rewrite_rejected() {
        let db = Database::open_in_memory().unwrap();
        let original = line(&db, 1, "x");

        assert!(matches!(
            db.update_message(original.gid, MessageStatus::Original, Some("y")),
            Err(StoreError::InvalidTransition(_))
        ));

        db.update_message(original.gid, MessageStatus::Deleted, None).unwrap();
        assert!(matches!(
            db.update_message(original.gid, MessageStatus::Edited, Some("z")),
            Err(StoreError::InvalidTransition(_))
        ));
        assert_eq!(db.get_message(original.gid).unwrap().body, "");
    }

    #[test]
    fn test_edits_since_searches_whole_window() {
        let db = Database::open_in_memory().unwrap();
        let first = line(&db, 1, "first");
        let second = line(&db, 1, "second");
        line(&db, 2, "elsewhere");
        for i in 0..5 {
            line(&db, 1, &format!("filler {i}"));
        }

        let deleted = db.update_message(first.gid, MessageStatus::Deleted, None).unwrap();
        let watermark = deleted.updated_id.unwrap();
        db.update_message(second.gid, MessageStatus::Edited, Some("2nd")).unwrap();

        let edits = db.edits_since(WindowId(1), watermark).unwrap();
        let gids: Vec<_> = edits.iter().map(|m| m.gid).collect();
        assert_eq!(gids, vec![first.gid, second.gid]);

        let later = db.edits_since(WindowId(1), Gid(watermark.0 + 1)).unwrap();
        assert_eq!(later.len(), 1);
        assert!(db.edits_since(WindowId(2), Gid(0)).unwrap().is_empty());
    }

    #[test]
    fn test_missing_message() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.get_message(Gid(42)),
            Err(StoreError::NotFound(_))
        ));
    }
}
