//! Local cache backing the offline fallback mode.
//!
//! Mirrors the server's operations against per-user JSON files in a cache
//! directory. Locally-registered users keep their password in PLAINTEXT:
//! this is the accepted trade-off of a serverless fallback session, and the
//! cache contents are never trusted once a real server boundary is crossed.

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::{SearchField, field_matches};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalUser {
    pub username: String,
    pub password: String,
}

/// A cached client record. Unlike server records there is no owner field
/// (the cache file itself is per-user) and photos are embedded inline as a
/// `data:` URL instead of a reference path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalClient {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_data: Option<String>,
}

/// Shallow merge applied to a cached record. Every present field wins,
/// including empty strings.
#[derive(Debug, Clone, Default)]
pub struct LocalUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub photo_data: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OfflineCache {
    root: PathBuf,
}

impl OfflineCache {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn users_path(&self) -> PathBuf {
        self.root.join("users.json")
    }

    fn clients_path(&self, username: &str) -> PathBuf {
        // Usernames land in file names; keep anything path-hostile out.
        let safe: String = username
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect();
        self.root.join(format!("clients_{safe}.json"))
    }

    fn read_list<T: for<'de> Deserialize<'de>>(&self, path: &PathBuf) -> Vec<T> {
        std::fs::read(path)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default()
    }

    fn write_list<T: Serialize>(&self, path: &PathBuf, list: &[T]) -> Result<()> {
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create cache directory {}", self.root.display()))?;
        let json = serde_json::to_string_pretty(list).context("Failed to serialize cache")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write cache file {}", path.display()))?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    #[must_use]
    pub fn user(&self, username: &str) -> Option<LocalUser> {
        self.read_list::<LocalUser>(&self.users_path())
            .into_iter()
            .find(|u| u.username == username)
    }

    /// Stores a locally-registered user. Returns false without writing when
    /// the username is already taken locally.
    pub fn register_user(&self, username: &str, password: &str) -> Result<bool> {
        let mut users = self.read_list::<LocalUser>(&self.users_path());
        if users.iter().any(|u| u.username == username) {
            return Ok(false);
        }
        users.push(LocalUser {
            username: username.to_string(),
            password: password.to_string(),
        });
        self.write_list(&self.users_path(), &users)?;
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Clients
    // ------------------------------------------------------------------

    #[must_use]
    pub fn clients_for(&self, username: &str) -> Vec<LocalClient> {
        self.read_list(&self.clients_path(username))
    }

    pub fn add_client_for(&self, username: &str, client: LocalClient) -> Result<()> {
        let mut list = self.clients_for(username);
        list.push(client);
        self.write_list(&self.clients_path(username), &list)
    }

    /// Returns false when no record with that id exists.
    pub fn update_client_for(
        &self,
        username: &str,
        id: &str,
        update: &LocalUpdate,
    ) -> Result<bool> {
        let mut list = self.clients_for(username);
        let Some(client) = list.iter_mut().find(|c| c.id == id) else {
            return Ok(false);
        };

        if let Some(name) = &update.name {
            client.name = name.clone();
        }
        if let Some(email) = &update.email {
            client.email = email.clone();
        }
        if let Some(phone) = &update.phone {
            client.phone = phone.clone();
        }
        if let Some(photo_data) = &update.photo_data {
            client.photo_data = Some(photo_data.clone());
        }

        self.write_list(&self.clients_path(username), &list)?;
        Ok(true)
    }

    /// Returns false when no record with that id exists.
    pub fn remove_client_for(&self, username: &str, id: &str) -> Result<bool> {
        let mut list = self.clients_for(username);
        let len_before = list.len();
        list.retain(|c| c.id != id);
        let removed = list.len() < len_before;
        self.write_list(&self.clients_path(username), &list)?;
        Ok(removed)
    }

    /// Substring search with exactly the server's field-matching rules.
    #[must_use]
    pub fn search_for(&self, username: &str, query: &str, field: SearchField) -> Vec<LocalClient> {
        self.clients_for(username)
            .into_iter()
            .filter(|c| field_matches(&c.name, &c.email, &c.phone, query, field))
            .collect()
    }
}

/// Builds the unsigned offline session token. Its payload segment uses the
/// same base64url encoding as a real token so the shared unverified decode
/// works for both; the signature slot is a placeholder.
#[must_use]
pub fn offline_token(username: &str) -> String {
    let payload = serde_json::json!({ "username": username, "userId": username });
    format!("offline.{}.x", URL_SAFE_NO_PAD.encode(payload.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::decode_username_unverified;

    fn temp_cache() -> OfflineCache {
        OfflineCache::new(
            std::env::temp_dir().join(format!("clientele-cache-test-{}", uuid::Uuid::new_v4())),
        )
    }

    #[test]
    fn test_register_and_find_user() {
        let cache = temp_cache();
        assert!(cache.user("maria").is_none());

        assert!(cache.register_user("maria", "pass1234").unwrap());
        let user = cache.user("maria").unwrap();
        assert_eq!(user.password, "pass1234");

        // Second registration for the same name is refused.
        assert!(!cache.register_user("maria", "other999").unwrap());
    }

    #[test]
    fn test_client_crud_roundtrip() {
        let cache = temp_cache();

        cache
            .add_client_for(
                "maria",
                LocalClient {
                    id: "c_1".to_string(),
                    name: "Alice".to_string(),
                    ..LocalClient::default()
                },
            )
            .unwrap();

        let update = LocalUpdate {
            email: Some("alice@example.com".to_string()),
            ..LocalUpdate::default()
        };
        assert!(cache.update_client_for("maria", "c_1", &update).unwrap());
        assert!(!cache.update_client_for("maria", "missing", &update).unwrap());

        let list = cache.clients_for("maria");
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].email, "alice@example.com");

        assert!(cache.remove_client_for("maria", "c_1").unwrap());
        assert!(!cache.remove_client_for("maria", "c_1").unwrap());
        assert!(cache.clients_for("maria").is_empty());
    }

    #[test]
    fn test_caches_are_per_user() {
        let cache = temp_cache();
        cache
            .add_client_for(
                "maria",
                LocalClient {
                    id: "c_1".to_string(),
                    name: "Alice".to_string(),
                    ..LocalClient::default()
                },
            )
            .unwrap();

        assert!(cache.clients_for("joao").is_empty());
        assert_eq!(cache.clients_for("maria").len(), 1);
    }

    #[test]
    fn test_search_mirrors_server_rules() {
        let cache = temp_cache();
        for (id, name, email) in [
            ("c_1", "Alice", "alice@example.com"),
            ("c_2", "Bob", "bob@test.org"),
        ] {
            cache
                .add_client_for(
                    "maria",
                    LocalClient {
                        id: id.to_string(),
                        name: name.to_string(),
                        email: email.to_string(),
                        ..LocalClient::default()
                    },
                )
                .unwrap();
        }

        let hits = cache.search_for("maria", "EXAMPLE", SearchField::Email);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Alice");

        let hits = cache.search_for("maria", "bob", SearchField::Any);
        assert_eq!(hits.len(), 1);

        assert_eq!(cache.search_for("maria", "", SearchField::Any).len(), 2);
    }

    #[test]
    fn test_offline_token_decodes_to_username() {
        let token = offline_token("maria");
        assert_eq!(decode_username_unverified(&token).as_deref(), Some("maria"));
    }
}
