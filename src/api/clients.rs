use axum::{
    Extension, Json,
    extract::{Multipart, Path, Query, State},
};
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::{ApiError, AppState};
use crate::api::auth::Identity;
use crate::models::{ClientRecord, SearchField};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub q: String,
    pub field: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateClientRequest {
    #[serde(default)]
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Partial update. Absent fields are left untouched; `name` is additionally
/// ignored when present but empty, while an explicit empty `email`/`phone`
/// clears the stored value. That asymmetry is part of the wire contract.
#[derive(Deserialize, Default)]
pub struct UpdateClientRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Serialize)]
pub struct PhotoResponse {
    pub success: bool,
    pub photo: String,
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub removed: ClientRecord,
}

// ============================================================================
// Handlers (all owner-scoped via the verified Identity extension)
// ============================================================================

/// GET /api/clients
/// List the caller's clients, optionally filtered by substring search.
pub async fn list_clients(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<ClientRecord>> {
    let document = state.store.load().await;
    let field = SearchField::parse(query.field.as_deref());

    let clients = document
        .clients
        .into_iter()
        .filter(|c| c.user_id == identity.user_id)
        .filter(|c| c.matches(&query.q, field))
        .collect();

    Json(clients)
}

/// POST /api/clients
pub async fn create_client(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<CreateClientRequest>,
) -> Result<Json<ClientRecord>, ApiError> {
    if payload.name.is_empty() {
        return Err(ApiError::validation("Name is required"));
    }

    let client = ClientRecord {
        id: Uuid::new_v4().to_string(),
        user_id: identity.user_id,
        name: payload.name,
        email: payload.email.unwrap_or_default(),
        phone: payload.phone.unwrap_or_default(),
        photo: None,
    };

    let mut document = state.store.load().await;
    document.clients.push(client.clone());
    state.store.save(&document).await?;

    Ok(Json(client))
}

/// POST /api/clients/{id}/photo
/// Attach an image from the multipart field "photo". The file lands in the
/// uploads directory and the record stores its reference path.
pub async fn upload_photo(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<PhotoResponse>, ApiError> {
    let mut document = state.store.load().await;

    let client = document
        .clients
        .iter_mut()
        .find(|c| c.id == id)
        .ok_or_else(ApiError::client_not_found)?;
    if client.user_id != identity.user_id {
        return Err(ApiError::not_owner());
    }

    let mut photo = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(format!("Invalid upload: {e}")))?
    {
        if field.name() == Some("photo") {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let content_type = field.content_type().unwrap_or_default().to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::validation(format!("Invalid upload: {e}")))?;
            photo = Some((file_name, content_type, data));
            break;
        }
    }

    let Some((file_name, content_type, data)) = photo else {
        return Err(ApiError::validation("No file received"));
    };

    if !content_type.starts_with("image/") {
        return Err(ApiError::validation("Only images are allowed"));
    }

    if data.len() as u64 > state.config.storage.max_upload_bytes {
        return Err(ApiError::validation("File is too large"));
    }

    let extension = std::path::Path::new(&file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();
    let stored_name = format!(
        "{}-{}{}",
        Utc::now().timestamp_millis(),
        rand::rng().random_range(0..1_000_000_000u32),
        extension
    );

    let uploads_dir = std::path::Path::new(&state.config.storage.uploads_path);
    tokio::fs::create_dir_all(uploads_dir)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create uploads directory: {e}")))?;
    tokio::fs::write(uploads_dir.join(&stored_name), &data)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to store upload: {e}")))?;

    let photo_path = format!("/uploads/{stored_name}");
    client.photo = Some(photo_path.clone());
    state.store.save(&document).await?;

    Ok(Json(PhotoResponse {
        success: true,
        photo: photo_path,
    }))
}

/// PUT /api/clients/{id}
pub async fn update_client(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateClientRequest>,
) -> Result<Json<ClientRecord>, ApiError> {
    let mut document = state.store.load().await;

    let client = document
        .clients
        .iter_mut()
        .find(|c| c.id == id)
        .ok_or_else(ApiError::client_not_found)?;
    if client.user_id != identity.user_id {
        return Err(ApiError::not_owner());
    }

    if let Some(name) = payload.name
        && !name.is_empty()
    {
        client.name = name;
    }
    if let Some(email) = payload.email {
        client.email = email;
    }
    if let Some(phone) = payload.phone {
        client.phone = phone;
    }

    let updated = client.clone();
    state.store.save(&document).await?;

    Ok(Json(updated))
}

/// DELETE /api/clients/{id}
pub async fn delete_client(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let mut document = state.store.load().await;

    let index = document
        .clients
        .iter()
        .position(|c| c.id == id)
        .ok_or_else(ApiError::client_not_found)?;
    if document.clients[index].user_id != identity.user_id {
        return Err(ApiError::not_owner());
    }

    let removed = document.clients.remove(index);
    state.store.save(&document).await?;

    Ok(Json(DeleteResponse {
        success: true,
        removed,
    }))
}
