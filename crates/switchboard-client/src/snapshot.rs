//! On-disk snapshot of the client model.
//!
//! The snapshot is plain JSON in the platform data directory:
//! - Linux:   `~/.local/share/switchboard/snapshot.json`
//! - macOS:   `~/Library/Application Support/org.switchboard.switchboard/snapshot.json`
//! - Windows: `{FOLDERID_RoamingAppData}\switchboard\switchboard\data\snapshot.json`

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use switchboard_shared::protocol::{FriendInfo, Member, MessageInfo, Settings, WindowInfo};
use switchboard_shared::types::{Gid, UserId};

use crate::error::{ClientError, Result};
use crate::store::{ClientStore, WindowModel};

pub const SNAPSHOT_VERSION: u32 = 1;

const SNAPSHOT_FILE: &str = "snapshot.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WindowSnapshot {
    pub window: WindowInfo,
    pub members: Vec<Member>,
    pub messages: Vec<MessageInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub version: u32,
    pub user_id: UserId,
    /// Highest gid among the saved messages.
    pub cached_upto: Gid,
    pub saved_at: DateTime<Utc>,
    pub windows: Vec<WindowSnapshot>,
    pub friends: Vec<FriendInfo>,
    pub networks: Vec<String>,
    pub nicks: BTreeMap<String, String>,
    pub settings: Settings,
}

impl Snapshot {
    /// Capture the model, keeping the newest `max_messages` of every window.
    /// Returns `None` until the first bootstrap has completed.
    pub fn capture(store: &ClientStore, max_messages: usize) -> Option<Self> {
        if !store.init_done() {
            return None;
        }

        let mut cached_upto = Gid(0);
        let windows = store
            .windows()
            .map(|w| {
                let skip = w.messages.len().saturating_sub(max_messages);
                let messages: Vec<MessageInfo> = w.messages.values().skip(skip).cloned().collect();
                if let Some(last) = messages.last() {
                    cached_upto = cached_upto.max(last.gid);
                }

                WindowSnapshot {
                    window: w.info.clone(),
                    members: w
                        .members
                        .iter()
                        .map(|(user_id, role)| Member {
                            user_id: user_id.clone(),
                            role: *role,
                        })
                        .collect(),
                    messages,
                }
            })
            .collect();

        Some(Self {
            version: SNAPSHOT_VERSION,
            user_id: store.user_id().clone(),
            cached_upto,
            saved_at: Utc::now(),
            windows,
            friends: store
                .friends()
                .iter()
                .map(|(user_id, online)| FriendInfo {
                    user_id: user_id.clone(),
                    online: *online,
                })
                .collect(),
            networks: store.networks().to_vec(),
            nicks: store.nicks().clone(),
            settings: store.settings().clone(),
        })
    }

    /// Rebuild a model for `user`. The model stays uninitialized until the
    /// relay's bootstrap finishes.
    pub fn restore(self, user: &UserId) -> Result<ClientStore> {
        if self.version != SNAPSHOT_VERSION {
            return Err(ClientError::UnsupportedVersion(self.version));
        }
        if &self.user_id != user {
            return Err(ClientError::WrongUser(self.user_id.to_string()));
        }

        let mut store = ClientStore::new(self.user_id);
        for saved in self.windows {
            let mut window = WindowModel::new(saved.window);
            window.set_members(saved.members, true);
            for message in saved.messages {
                window.upsert_message(message);
            }
            store.restore_window(window);
        }
        store.restore_friends(
            self.friends
                .into_iter()
                .map(|f| (f.user_id, f.online))
                .collect(),
        );
        store.restore_profile(self.networks, self.nicks, self.settings);

        debug!(cached_upto = %self.cached_upto, "Snapshot restored");
        Ok(store)
    }

    /// Default snapshot location, creating its directory if missing.
    pub fn default_path() -> Result<PathBuf> {
        let project_dirs =
            ProjectDirs::from("org", "switchboard", "switchboard").ok_or(ClientError::NoDataDir)?;

        let data_dir = project_dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;
        Ok(data_dir.join(SNAPSHOT_FILE))
    }

    /// Write through a temporary file so a crash never leaves half a
    /// snapshot behind.
    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(self)?)?;
        std::fs::rename(&tmp, path)?;

        info!(path = %path.display(), cached_upto = %self.cached_upto, "Snapshot saved");
        Ok(())
    }

    /// `None` when no snapshot has been saved yet.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let raw = match std::fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&raw)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{message, window};
    use switchboard_shared::protocol::{MembersUpdate, Notification, WindowMessages};
    use switchboard_shared::types::{Role, WindowId};
    use tempfile::TempDir;

    fn populated() -> ClientStore {
        let mut store = ClientStore::new(UserId::new("m1"));
        store.apply(Notification::StartupSequence { length: 4 });
        store.apply(Notification::AddWindow(window(1, "#rust")));
        store.apply(Notification::AddWindow(window(2, "#tokio")));
        store.apply(Notification::UpdateMembers(MembersUpdate {
            window_id: WindowId(1),
            reset: true,
            members: vec![Member {
                user_id: UserId::new("m1"),
                role: Role::Oper,
            }],
        }));
        store.apply(Notification::AddMessages {
            messages: vec![
                WindowMessages {
                    window_id: WindowId(1),
                    messages: (1..=5).map(|gid| message(gid, "rust")).collect(),
                },
                WindowMessages {
                    window_id: WindowId(2),
                    messages: vec![message(8, "tokio")],
                },
            ],
        });
        store.apply(Notification::FinishInit);
        store
    }

    #[test]
    fn test_capture_trims_backlog() {
        let snapshot = Snapshot::capture(&populated(), 2).unwrap();

        assert_eq!(snapshot.cached_upto, Gid(8));
        let rust = snapshot
            .windows
            .iter()
            .find(|w| w.window.window_id == WindowId(1))
            .unwrap();
        let gids: Vec<u64> = rust.messages.iter().map(|m| m.gid.0).collect();
        assert_eq!(gids, vec![4, 5]);
    }

    #[test]
    fn test_capture_waits_for_init() {
        let mut store = ClientStore::new(UserId::new("m1"));
        store.apply(Notification::StartupSequence { length: 1 });

        assert!(Snapshot::capture(&store, 100).is_none());
    }

    #[test]
    fn test_save_and_restore() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SNAPSHOT_FILE);
        let store = populated();

        assert!(Snapshot::load(&path).unwrap().is_none());

        Snapshot::capture(&store, 100).unwrap().save(&path).unwrap();
        let restored = Snapshot::load(&path)
            .unwrap()
            .unwrap()
            .restore(&UserId::new("m1"))
            .unwrap();

        assert!(!restored.init_done());
        assert_eq!(restored.cached_upto(), Gid(8));
        assert_eq!(restored.window(WindowId(1)), store.window(WindowId(1)));
        assert_eq!(restored.windows().count(), 2);
    }

    #[test]
    fn test_restore_rejects_foreign_snapshots() {
        let mut snapshot = Snapshot::capture(&populated(), 100).unwrap();

        assert!(matches!(
            snapshot.clone().restore(&UserId::new("m9")),
            Err(ClientError::WrongUser(_))
        ));

        snapshot.version = 0;
        assert!(matches!(
            snapshot.restore(&UserId::new("m1")),
            Err(ClientError::UnsupportedVersion(0))
        ));
    }
}
