//! Library client for the HTTP API with an offline fallback mode.
//!
//! Every operation first attempts the network call. A transport failure
//! (the request itself never completes) switches that one operation to the
//! local [`OfflineCache`]; a server-reported business error is surfaced
//! as-is and never triggers the fallback. Offline identity comes from the
//! token payload decoded without verification, which is fine for keying a
//! local cache and nothing else.

use anyhow::Context;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub mod offline;

use crate::auth::decode_username_unverified;
use crate::models::SearchField;
use offline::{LocalClient, LocalUpdate, OfflineCache, offline_token};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Business error reported by the server; the request went through.
    #[error("{0}")]
    Api(String),

    /// Business error raised by the offline mirror.
    #[error("{0}")]
    Offline(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Where an operation actually ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Online,
    Offline,
}

/// A client record as seen by callers: server records carry `photo`
/// (a reference path), offline records carry `photo_data` (an inline
/// data URL). Never both.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientView {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_data: Option<String>,
}

impl From<LocalClient> for ClientView {
    fn from(local: LocalClient) -> Self {
        Self {
            id: local.id,
            name: local.name,
            email: local.email,
            phone: local.phone,
            photo: None,
            photo_data: local.photo_data,
        }
    }
}

/// Photo attachment for create/upload calls.
#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl PhotoUpload {
    fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.content_type,
            STANDARD.encode(&self.bytes)
        )
    }
}

/// Partial update; absent fields are not sent.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClientUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    cache: OfflineCache,
    token: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Deserialize)]
struct RemovedResponse {
    removed: ClientView,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, cache_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {e}"))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cache: OfflineCache::new(cache_dir),
            token: None,
        })
    }

    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Username from the current token, decoded without verification.
    #[must_use]
    pub fn username(&self) -> Option<String> {
        self.token.as_deref().and_then(decode_username_unverified)
    }

    #[must_use]
    pub fn cache(&self) -> &OfflineCache {
        &self.cache
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn require_token(&self) -> Result<&str, ClientError> {
        self.token
            .as_deref()
            .ok_or_else(|| ClientError::Other(anyhow::anyhow!("No session token, log in first")))
    }

    fn cached_username(&self) -> String {
        self.username().unwrap_or_else(|| "guest".to_string())
    }

    async fn api_error(response: reqwest::Response) -> ClientError {
        let status = response.status();
        let message = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|v| {
                v.get("error")
                    .and_then(serde_json::Value::as_str)
                    .map(ToString::to_string)
            })
            .unwrap_or_else(|| format!("Request failed with status {status}"));
        ClientError::Api(message)
    }

    // ------------------------------------------------------------------
    // Auth
    // ------------------------------------------------------------------

    /// Registers and logs in. Offline, the user is stored in the local
    /// cache and an unsigned offline session token is synthesized.
    pub async fn register(&mut self, username: &str, password: &str) -> Result<Mode, ClientError> {
        let body = serde_json::json!({ "username": username, "password": password });

        match self
            .http
            .post(self.url("/api/register"))
            .json(&body)
            .send()
            .await
        {
            Ok(response) => {
                if !response.status().is_success() {
                    return Err(Self::api_error(response).await);
                }
                self.login(username, password).await?;
                Ok(Mode::Online)
            }
            Err(e) => {
                tracing::warn!("Register request failed ({e}), using offline cache");
                if !self.cache.register_user(username, password)? {
                    return Err(ClientError::Offline(
                        "User already exists locally".to_string(),
                    ));
                }
                self.token = Some(offline_token(username));
                Ok(Mode::Offline)
            }
        }
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Result<Mode, ClientError> {
        let body = serde_json::json!({ "username": username, "password": password });

        match self
            .http
            .post(self.url("/api/login"))
            .json(&body)
            .send()
            .await
        {
            Ok(response) => {
                if !response.status().is_success() {
                    return Err(Self::api_error(response).await);
                }
                let parsed: TokenResponse = response
                    .json()
                    .await
                    .context("Failed to parse login response")?;
                self.token = Some(parsed.token);
                Ok(Mode::Online)
            }
            Err(e) => {
                tracing::warn!("Login request failed ({e}), using offline cache");
                let Some(user) = self.cache.user(username) else {
                    return Err(ClientError::Offline("User not found (offline)".to_string()));
                };
                if user.password != password {
                    return Err(ClientError::Offline("Wrong password (offline)".to_string()));
                }
                self.token = Some(offline_token(username));
                Ok(Mode::Offline)
            }
        }
    }

    // ------------------------------------------------------------------
    // Clients
    // ------------------------------------------------------------------

    /// Lists (or searches, for a non-empty query) the caller's clients.
    pub async fn clients(
        &self,
        query: &str,
        field: Option<&str>,
    ) -> Result<Vec<ClientView>, ClientError> {
        let token = self.require_token()?;

        let mut request = self
            .http
            .get(self.url("/api/clients"))
            .bearer_auth(token)
            .query(&[("q", query)]);
        if let Some(field) = field {
            request = request.query(&[("field", field)]);
        }

        match request.send().await {
            Ok(response) => {
                if !response.status().is_success() {
                    return Err(Self::api_error(response).await);
                }
                response
                    .json::<Vec<ClientView>>()
                    .await
                    .context("Failed to parse client list")
                    .map_err(Into::into)
            }
            Err(e) => {
                tracing::warn!("Client list request failed ({e}), using offline cache");
                Ok(self
                    .cache
                    .search_for(&self.cached_username(), query, SearchField::parse(field))
                    .into_iter()
                    .map(ClientView::from)
                    .collect())
            }
        }
    }

    /// Creates a client. Online, an attached photo is uploaded afterwards
    /// and stored as a reference path; offline it is embedded inline.
    pub async fn create_client(
        &self,
        name: &str,
        email: &str,
        phone: &str,
        photo: Option<PhotoUpload>,
    ) -> Result<ClientView, ClientError> {
        let token = self.require_token()?;
        let body = serde_json::json!({ "name": name, "email": email, "phone": phone });

        match self
            .http
            .post(self.url("/api/clients"))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
        {
            Ok(response) => {
                if !response.status().is_success() {
                    return Err(Self::api_error(response).await);
                }
                let mut created: ClientView = response
                    .json()
                    .await
                    .context("Failed to parse created client")?;

                if let Some(photo) = photo {
                    match self.upload_photo_online(&created.id, photo).await {
                        Ok(path) => created.photo = Some(path),
                        Err(ClientError::Api(msg)) => return Err(ClientError::Api(msg)),
                        Err(e) => {
                            tracing::warn!("Photo upload failed after create: {e}");
                        }
                    }
                }

                Ok(created)
            }
            Err(e) => {
                tracing::warn!("Create request failed ({e}), using offline cache");
                let local = LocalClient {
                    id: format!(
                        "c_{}_{}",
                        Utc::now().timestamp_millis(),
                        rand::rng().random_range(0..10_000u32)
                    ),
                    name: name.to_string(),
                    email: email.to_string(),
                    phone: phone.to_string(),
                    photo_data: photo.as_ref().map(PhotoUpload::to_data_url),
                };
                self.cache
                    .add_client_for(&self.cached_username(), local.clone())?;
                Ok(ClientView::from(local))
            }
        }
    }

    /// Attaches a photo to an existing client.
    pub async fn upload_photo(
        &self,
        id: &str,
        photo: PhotoUpload,
    ) -> Result<ClientView, ClientError> {
        let data_url = photo.to_data_url();

        match self.upload_photo_online(id, photo).await {
            Ok(path) => {
                let mut view = self.fetch_client(id).await?;
                view.photo = Some(path);
                Ok(view)
            }
            Err(ClientError::Api(msg)) => Err(ClientError::Api(msg)),
            Err(e) => {
                tracing::warn!("Photo upload failed ({e}), using offline cache");
                let username = self.cached_username();
                let update = LocalUpdate {
                    photo_data: Some(data_url),
                    ..LocalUpdate::default()
                };
                if !self.cache.update_client_for(&username, id, &update)? {
                    return Err(ClientError::Offline(
                        "Client not found (offline)".to_string(),
                    ));
                }
                self.local_client(&username, id)
            }
        }
    }

    pub async fn update_client(
        &self,
        id: &str,
        update: ClientUpdate,
    ) -> Result<ClientView, ClientError> {
        let token = self.require_token()?;

        match self
            .http
            .put(self.url(&format!("/api/clients/{id}")))
            .bearer_auth(token)
            .json(&update)
            .send()
            .await
        {
            Ok(response) => {
                if !response.status().is_success() {
                    return Err(Self::api_error(response).await);
                }
                response
                    .json::<ClientView>()
                    .await
                    .context("Failed to parse updated client")
                    .map_err(Into::into)
            }
            Err(e) => {
                tracing::warn!("Update request failed ({e}), using offline cache");
                let username = self.cached_username();
                let local_update = LocalUpdate {
                    name: update.name,
                    email: update.email,
                    phone: update.phone,
                    photo_data: None,
                };
                if !self.cache.update_client_for(&username, id, &local_update)? {
                    return Err(ClientError::Offline(
                        "Client not found (offline)".to_string(),
                    ));
                }
                self.local_client(&username, id)
            }
        }
    }

    /// Deletes a client and returns the removed record.
    pub async fn delete_client(&self, id: &str) -> Result<ClientView, ClientError> {
        let token = self.require_token()?;

        match self
            .http
            .delete(self.url(&format!("/api/clients/{id}")))
            .bearer_auth(token)
            .send()
            .await
        {
            Ok(response) => {
                if !response.status().is_success() {
                    return Err(Self::api_error(response).await);
                }
                let parsed: RemovedResponse = response
                    .json()
                    .await
                    .context("Failed to parse delete response")?;
                Ok(parsed.removed)
            }
            Err(e) => {
                tracing::warn!("Delete request failed ({e}), using offline cache");
                let username = self.cached_username();
                let removed = self.local_client(&username, id);
                if !self.cache.remove_client_for(&username, id)? {
                    return Err(ClientError::Offline(
                        "Client not found (offline)".to_string(),
                    ));
                }
                removed
            }
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    async fn upload_photo_online(
        &self,
        id: &str,
        photo: PhotoUpload,
    ) -> Result<String, ClientError> {
        let token = self.require_token()?;

        let part = reqwest::multipart::Part::bytes(photo.bytes)
            .file_name(photo.file_name)
            .mime_str(&photo.content_type)
            .map_err(|e| anyhow::anyhow!("Invalid photo content type: {e}"))?;
        let form = reqwest::multipart::Form::new().part("photo", part);

        let response = self
            .http
            .post(self.url(&format!("/api/clients/{id}/photo")))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ClientError::Other(anyhow::anyhow!("Photo upload failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let value: serde_json::Value = response
            .json()
            .await
            .context("Failed to parse photo response")?;
        value
            .get("photo")
            .and_then(serde_json::Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| ClientError::Other(anyhow::anyhow!("Photo response missing path")))
    }

    async fn fetch_client(&self, id: &str) -> Result<ClientView, ClientError> {
        self.clients("", None)
            .await?
            .into_iter()
            .find(|c| c.id == id)
            .ok_or_else(|| ClientError::Api("Client not found".to_string()))
    }

    fn local_client(&self, username: &str, id: &str) -> Result<ClientView, ClientError> {
        self.cache
            .clients_for(username)
            .into_iter()
            .find(|c| c.id == id)
            .map(ClientView::from)
            .ok_or_else(|| ClientError::Offline("Client not found (offline)".to_string()))
    }
}
