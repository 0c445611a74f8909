//! Async access to the shared [`Database`].

use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::database::Database;
use crate::error::Result;

/// Cloneable handle shared by every task of the relay.
///
/// All access is serialized through one connection, so a closure passed to
/// [`StateStore::run`] observes and updates state atomically with respect to
/// every other caller.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Mutex<Database>>,
}

impl StateStore {
    pub fn open_at(path: &Path) -> Result<Self> {
        Ok(Self::new(Database::open_at(path)?))
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    /// Run `f` with exclusive access to the database.
    pub async fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Database) -> Result<T>,
    {
        let mut db = self.db.lock().await;
        f(&mut db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_shared::types::UserId;

    #[tokio::test]
    async fn test_shared_between_clones() {
        let store = StateStore::in_memory().unwrap();
        let other = store.clone();
        let user = UserId::new("m1");

        store
            .run(|db| db.upsert_user(&user, "alice"))
            .await
            .unwrap();
        let nick = other.run(|db| db.user_nick(&user)).await.unwrap();
        assert_eq!(nick.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_file_backed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        let user = UserId::new("m1");

        {
            let store = StateStore::open_at(&path).unwrap();
            store.run(|db| db.upsert_user(&user, "bob")).await.unwrap();
        }

        let store = StateStore::open_at(&path).unwrap();
        let users = store.run(|db| db.user_list()).await.unwrap();
        assert_eq!(users, vec![user]);
    }
}
