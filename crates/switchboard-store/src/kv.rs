//! Hash, set and counter primitives on top of the `kv_hash` / `kv_set`
//! tables.
//!
//! Every primitive is a single statement (or a single transaction), so each
//! one is atomic with respect to other users of the same connection.

use std::collections::{BTreeMap, BTreeSet};

use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::{Result, StoreError};

impl Database {
    // ------------------------------------------------------------------
    // Hashes
    // ------------------------------------------------------------------

    pub fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let value = self
            .conn()
            .query_row(
                "SELECT value FROM kv_hash WHERE key = ?1 AND field = ?2",
                params![key, field],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO kv_hash (key, field, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(key, field) DO UPDATE SET value = excluded.value",
            params![key, field, value],
        )?;
        Ok(())
    }

    /// Set several fields of one hash in a single transaction.
    pub fn hmset<'a, I>(&mut self, key: &str, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let tx = self.conn_mut().transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO kv_hash (key, field, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key, field) DO UPDATE SET value = excluded.value",
            )?;
            for (field, value) in fields {
                stmt.execute(params![key, field, value])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn hgetall(&self, key: &str) -> Result<BTreeMap<String, String>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT field, value FROM kv_hash WHERE key = ?1")?;
        let rows = stmt.query_map(params![key], |row| Ok((row.get(0)?, row.get(1)?)))?;

        let mut map = BTreeMap::new();
        for row in rows {
            let (field, value) = row?;
            map.insert(field, value);
        }
        Ok(map)
    }

    /// Remove a field. Returns `true` if it existed.
    pub fn hdel(&self, key: &str, field: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM kv_hash WHERE key = ?1 AND field = ?2",
            params![key, field],
        )?;
        Ok(affected > 0)
    }

    /// Atomically add `by` to an integer field (missing fields count as 0)
    /// and return the new value.
    pub fn hincrby(&self, key: &str, field: &str, by: i64) -> Result<i64> {
        let value: String = self.conn().query_row(
            "INSERT INTO kv_hash (key, field, value) VALUES (?1, ?2, CAST(?3 AS TEXT))
             ON CONFLICT(key, field) DO UPDATE
                SET value = CAST(CAST(value AS INTEGER) + ?3 AS TEXT)
             RETURNING value",
            params![key, field, by],
            |row| row.get(0),
        )?;
        parse_int(key, field, &value)
    }

    /// Read an integer field, `None` when missing.
    pub fn hget_int(&self, key: &str, field: &str) -> Result<Option<i64>> {
        self.hget(key, field)?
            .map(|value| parse_int(key, field, &value))
            .transpose()
    }

    /// Delete a whole key (hash and set).
    pub fn del(&self, key: &str) -> Result<()> {
        self.conn()
            .execute("DELETE FROM kv_hash WHERE key = ?1", params![key])?;
        self.conn()
            .execute("DELETE FROM kv_set WHERE key = ?1", params![key])?;
        Ok(())
    }

    /// Returns `true` if the hash has at least one field.
    pub fn exists(&self, key: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn()
            .query_row(
                "SELECT 1 FROM kv_hash WHERE key = ?1 LIMIT 1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    // ------------------------------------------------------------------
    // Sets
    // ------------------------------------------------------------------

    /// Add a member. Returns `true` if it was not present yet.
    pub fn sadd(&self, key: &str, member: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "INSERT OR IGNORE INTO kv_set (key, member) VALUES (?1, ?2)",
            params![key, member],
        )?;
        Ok(affected > 0)
    }

    pub fn srem(&self, key: &str, member: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM kv_set WHERE key = ?1 AND member = ?2",
            params![key, member],
        )?;
        Ok(affected > 0)
    }

    pub fn smembers(&self, key: &str) -> Result<BTreeSet<String>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT member FROM kv_set WHERE key = ?1")?;
        let rows = stmt.query_map(params![key], |row| row.get(0))?;

        let mut members = BTreeSet::new();
        for row in rows {
            members.insert(row?);
        }
        Ok(members)
    }

    pub fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn()
            .query_row(
                "SELECT 1 FROM kv_set WHERE key = ?1 AND member = ?2",
                params![key, member],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

fn parse_int(key: &str, field: &str, value: &str) -> Result<i64> {
    value.parse().map_err(|_| StoreError::CorruptNumber {
        key: key.to_string(),
        field: field.to_string(),
        value: value.to_string(),
    })
}
