//! Users, their settings, friends, pending alerts and native groups.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use switchboard_shared::protocol::Settings;
use switchboard_shared::types::UserId;

use crate::database::Database;
use crate::error::Result;
use crate::keys;
use crate::models::Alert;

const NICK: &str = "nick";
const BODY: &str = "body";
const EXPIRES_AT: &str = "expiresAt";

impl Database {
    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    /// Create or update a user and add it to the user list.
    pub fn upsert_user(&self, user: &UserId, nick: &str) -> Result<()> {
        self.hset(&keys::user(user), NICK, nick)?;
        self.sadd(keys::USER_LIST, user.as_str())?;
        Ok(())
    }

    /// Preferred nick of a user.
    pub fn user_nick(&self, user: &UserId) -> Result<Option<String>> {
        self.hget(&keys::user(user), NICK)
    }

    pub fn user_list(&self) -> Result<Vec<UserId>> {
        Ok(self
            .smembers(keys::USER_LIST)?
            .into_iter()
            .map(UserId)
            .collect())
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    pub fn settings(&self, user: &UserId) -> Result<Settings> {
        let mut settings = Settings::new();
        for (name, raw) in self.hgetall(&keys::settings(user))? {
            settings.insert(name, serde_json::from_str(&raw)?);
        }
        Ok(settings)
    }

    /// Merge the given settings into the stored ones.
    pub fn update_settings(&mut self, user: &UserId, settings: &Settings) -> Result<()> {
        let encoded = settings
            .iter()
            .map(|(name, value)| Ok((name.as_str(), serde_json::to_string(value)?)))
            .collect::<Result<Vec<_>>>()?;

        self.hmset(
            &keys::settings(user),
            encoded.iter().map(|(name, value)| (*name, value.as_str())),
        )
    }

    // ------------------------------------------------------------------
    // Friends
    // ------------------------------------------------------------------

    pub fn friends(&self, user: &UserId) -> Result<BTreeSet<UserId>> {
        Ok(self
            .smembers(&keys::friends(user))?
            .into_iter()
            .map(UserId)
            .collect())
    }

    /// Record a mutual friendship.
    pub fn add_friend(&self, user: &UserId, friend: &UserId) -> Result<()> {
        self.sadd(&keys::friends(user), friend.as_str())?;
        self.sadd(&keys::friends(friend), user.as_str())?;
        self.srem(&keys::friend_requests(user), friend.as_str())?;
        Ok(())
    }

    pub fn add_friend_request(&self, user: &UserId, from: &UserId) -> Result<()> {
        self.sadd(&keys::friend_requests(user), from.as_str())?;
        Ok(())
    }

    pub fn friend_requests(&self, user: &UserId) -> Result<Vec<UserId>> {
        Ok(self
            .smembers(&keys::friend_requests(user))?
            .into_iter()
            .map(UserId)
            .collect())
    }

    // ------------------------------------------------------------------
    // Alerts
    // ------------------------------------------------------------------

    /// Store an alert and make it pending for the given users.
    pub fn create_alert<'a, I>(&self, body: &str, expires_at: DateTime<Utc>, users: I) -> Result<Alert>
    where
        I: IntoIterator<Item = &'a UserId>,
    {
        let id = self.hincrby(keys::COUNTERS, keys::ALERT_ID_COUNTER, 1)? as u64;
        let key = keys::alert(id);

        self.hset(&key, BODY, body)?;
        self.hset(&key, EXPIRES_AT, &expires_at.to_rfc3339())?;

        for user in users {
            self.sadd(&keys::pending_alerts(user), &id.to_string())?;
        }

        Ok(Alert {
            id,
            body: body.to_string(),
            expires_at,
        })
    }

    /// Pending alerts of a user, expired ones included. Alert ids without a
    /// record are skipped.
    pub fn pending_alerts(&self, user: &UserId) -> Result<Vec<Alert>> {
        let mut alerts = Vec::new();

        for id in self.smembers(&keys::pending_alerts(user))? {
            let Ok(id) = id.parse::<u64>() else {
                continue;
            };
            let fields = self.hgetall(&keys::alert(id))?;

            let (Some(body), Some(expires_at)) = (fields.get(BODY), fields.get(EXPIRES_AT)) else {
                continue;
            };
            let Ok(expires_at) = DateTime::parse_from_rfc3339(expires_at) else {
                tracing::warn!(alert = id, "alert has unparsable expiry");
                continue;
            };

            alerts.push(Alert {
                id,
                body: body.clone(),
                expires_at: expires_at.with_timezone(&Utc),
            });
        }

        alerts.sort_by_key(|a| a.id);
        Ok(alerts)
    }

    pub fn dismiss_alert(&self, user: &UserId, alert_id: u64) -> Result<bool> {
        self.srem(&keys::pending_alerts(user), &alert_id.to_string())
    }

    // ------------------------------------------------------------------
    // Native groups
    // ------------------------------------------------------------------

    /// Register a native group owned by `owner`. Returns `false` if the
    /// name is already taken.
    pub fn create_group(&self, name: &str, owner: &UserId, password: Option<&str>) -> Result<bool> {
        let key = keys::group(name);
        if self.exists(&key)? {
            return Ok(false);
        }

        self.hset(&key, "owner", owner.as_str())?;
        if let Some(password) = password {
            self.hset(&key, "password", password)?;
        }
        self.sadd(&keys::group_members(name), owner.as_str())?;
        Ok(true)
    }

    pub fn group_exists(&self, name: &str) -> Result<bool> {
        self.exists(&keys::group(name))
    }

    pub fn group_owner(&self, name: &str) -> Result<Option<UserId>> {
        Ok(self.hget(&keys::group(name), "owner")?.map(UserId))
    }

    pub fn group_password(&self, name: &str) -> Result<Option<String>> {
        self.hget(&keys::group(name), "password")
    }

    pub fn add_group_member(&self, name: &str, user: &UserId) -> Result<bool> {
        self.sadd(&keys::group_members(name), user.as_str())
    }

    pub fn remove_group_member(&self, name: &str, user: &UserId) -> Result<bool> {
        self.srem(&keys::group_members(name), user.as_str())
    }

    pub fn group_members(&self, name: &str) -> Result<Vec<UserId>> {
        Ok(self
            .smembers(&keys::group_members(name))?
            .into_iter()
            .map(UserId)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_users() {
        let db = Database::open_in_memory().unwrap();
        let user = UserId::new("m1");

        db.upsert_user(&user, "alice").unwrap();
        assert_eq!(db.user_nick(&user).unwrap().as_deref(), Some("alice"));
        assert_eq!(db.user_list().unwrap(), vec![user]);
    }

    #[test]
    fn test_settings_merge() {
        let mut db = Database::open_in_memory().unwrap();
        let user = UserId::new("m1");

        let mut first = Settings::new();
        first.insert("theme".into(), json!("dark"));
        first.insert("activeDesktop".into(), json!(1));
        db.update_settings(&user, &first).unwrap();

        let mut second = Settings::new();
        second.insert("activeDesktop".into(), json!(2));
        db.update_settings(&user, &second).unwrap();

        let settings = db.settings(&user).unwrap();
        assert_eq!(settings["theme"], json!("dark"));
        assert_eq!(settings["activeDesktop"], json!(2));
    }

    #[test]
    fn test_friends() {
        let db = Database::open_in_memory().unwrap();
        let alice = UserId::new("m1");
        let bob = UserId::new("m2");

        db.add_friend_request(&alice, &bob).unwrap();
        assert_eq!(db.friend_requests(&alice).unwrap(), vec![bob.clone()]);

        db.add_friend(&alice, &bob).unwrap();
        assert!(db.friend_requests(&alice).unwrap().is_empty());
        assert!(db.friends(&bob).unwrap().contains(&alice));
    }

    #[test]
    fn test_alerts() {
        let db = Database::open_in_memory().unwrap();
        let user = UserId::new("m1");
        let later = Utc::now() + Duration::hours(1);

        let alert = db.create_alert("maintenance", later, [&user]).unwrap();
        let pending = db.pending_alerts(&user).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].body, "maintenance");

        assert!(db.dismiss_alert(&user, alert.id).unwrap());
        assert!(db.pending_alerts(&user).unwrap().is_empty());
    }

    #[test]
    fn test_groups() {
        let db = Database::open_in_memory().unwrap();
        let owner = UserId::new("m1");
        let guest = UserId::new("m2");

        assert!(db.create_group("rust", &owner, Some("secret")).unwrap());
        assert!(!db.create_group("rust", &guest, None).unwrap());
        assert_eq!(db.group_password("rust").unwrap().as_deref(), Some("secret"));
        assert_eq!(db.group_owner("rust").unwrap(), Some(owner.clone()));

        db.add_group_member("rust", &guest).unwrap();
        assert_eq!(db.group_members("rust").unwrap(), vec![owner, guest]);
    }
}
