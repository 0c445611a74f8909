//! Per-(user, network) connection records.

use std::collections::BTreeMap;

use rusqlite::{params, OptionalExtension};
use switchboard_shared::types::{NetworkState, UserId};

use crate::database::Database;
use crate::error::Result;
use crate::keys;
use crate::models::NetworkRecord;

const STATE: &str = "state";
const RETRY_COUNT: &str = "retryCount";
const CURRENT_NICK: &str = "currentNick";

impl Database {
    /// Full connection record. A network the user never touched reads as
    /// [`NetworkRecord::default`] (disconnected, no retries).
    pub fn network(&self, user: &UserId, network: &str) -> Result<NetworkRecord> {
        let fields = self.hgetall(&keys::network(user, network))?;
        let mut record = NetworkRecord::default();

        if let Some(state) = fields.get(STATE) {
            record.state = state.parse()?;
        }
        if let Some(count) = fields.get(RETRY_COUNT) {
            record.retry_count = count.parse().unwrap_or_default();
        }
        record.current_nick = fields.get(CURRENT_NICK).cloned();

        Ok(record)
    }

    /// Stored state, `None` if the network was never connected.
    pub fn network_state(&self, user: &UserId, network: &str) -> Result<Option<NetworkState>> {
        let state = self.hget(&keys::network(user, network), STATE)?;
        Ok(state.map(|s| s.parse::<NetworkState>()).transpose()?)
    }

    pub fn set_network_state(
        &self,
        user: &UserId,
        network: &str,
        state: NetworkState,
    ) -> Result<()> {
        self.hset(&keys::network(user, network), STATE, state.as_str())
    }

    /// Set the new state and return the previous one in one step.
    pub fn swap_network_state(
        &mut self,
        user: &UserId,
        network: &str,
        state: NetworkState,
    ) -> Result<Option<NetworkState>> {
        let tx = self.conn_mut().transaction()?;
        let key = keys::network(user, network);

        let previous: Option<String> = tx
            .query_row(
                "SELECT value FROM kv_hash WHERE key = ?1 AND field = ?2",
                params![key, STATE],
                |row| row.get(0),
            )
            .optional()?;
        tx.execute(
            "INSERT INTO kv_hash (key, field, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(key, field) DO UPDATE SET value = excluded.value",
            params![key, STATE, state.as_str()],
        )?;
        tx.commit()?;

        Ok(previous.map(|s| s.parse::<NetworkState>()).transpose()?)
    }

    pub fn retry_count(&self, user: &UserId, network: &str) -> Result<i64> {
        Ok(self
            .hget_int(&keys::network(user, network), RETRY_COUNT)?
            .unwrap_or(0))
    }

    /// Increment the retry counter, returning the new value.
    pub fn incr_retry_count(&self, user: &UserId, network: &str) -> Result<i64> {
        self.hincrby(&keys::network(user, network), RETRY_COUNT, 1)
    }

    pub fn reset_retry_count(&self, user: &UserId, network: &str) -> Result<()> {
        self.hset(&keys::network(user, network), RETRY_COUNT, "0")
    }

    pub fn current_nick(&self, user: &UserId, network: &str) -> Result<Option<String>> {
        self.hget(&keys::network(user, network), CURRENT_NICK)
    }

    pub fn set_current_nick(&self, user: &UserId, network: &str, nick: &str) -> Result<()> {
        self.hset(&keys::network(user, network), CURRENT_NICK, nick)
    }

    /// Current nick on each of the given networks, skipping networks with
    /// no recorded nick.
    pub fn current_nicks<'a, I>(&self, user: &UserId, networks: I) -> Result<BTreeMap<String, String>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut nicks = BTreeMap::new();
        for network in networks {
            if let Some(nick) = self.current_nick(user, network)? {
                nicks.insert(network.to_string(), nick);
            }
        }
        Ok(nicks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untouched_network_is_disconnected() {
        let db = Database::open_in_memory().unwrap();
        let user = UserId::new("m1");

        assert_eq!(db.network(&user, "IRCNet").unwrap(), NetworkRecord::default());
        assert_eq!(db.network_state(&user, "IRCNet").unwrap(), None);
        assert_eq!(db.retry_count(&user, "IRCNet").unwrap(), 0);
    }

    #[test]
    fn test_state_and_retry_count() {
        let mut db = Database::open_in_memory().unwrap();
        let user = UserId::new("m1");

        db.set_network_state(&user, "IRCNet", NetworkState::Connecting).unwrap();
        let previous = db
            .swap_network_state(&user, "IRCNet", NetworkState::Disconnected)
            .unwrap();
        assert_eq!(previous, Some(NetworkState::Connecting));

        assert_eq!(db.incr_retry_count(&user, "IRCNet").unwrap(), 1);
        assert_eq!(db.incr_retry_count(&user, "IRCNet").unwrap(), 2);
        db.reset_retry_count(&user, "IRCNet").unwrap();
        assert_eq!(db.retry_count(&user, "IRCNet").unwrap(), 0);

        let record = db.network(&user, "IRCNet").unwrap();
        assert_eq!(record.state, NetworkState::Disconnected);
    }

    #[test]
    fn test_current_nicks() {
        let db = Database::open_in_memory().unwrap();
        let user = UserId::new("m1");

        db.set_current_nick(&user, "IRCNet", "alice_").unwrap();

        let nicks = db.current_nicks(&user, ["MAS", "IRCNet"]).unwrap();
        assert_eq!(nicks.len(), 1);
        assert_eq!(nicks["IRCNet"], "alice_");
    }
}
