//! `/vfs` handlers. Each maps one request to one store operation.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mkdedit_core::storage::validate_name;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{error::ApiError, SharedStore};

#[derive(Debug, Default, Deserialize)]
pub struct VfsQuery {
    pub cmd: Option<String>,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteQuery {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct WriteBody {
    #[serde(default)]
    pub name: String,
    /// Absent or `null` content writes an empty file.
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RenameBody {
    #[serde(default)]
    pub old: String,
    #[serde(default)]
    pub new: String,
}

/// PUT carries either a rename (`old`/`new`) or a write (`name`/`content`).
#[derive(Debug, Default, Deserialize)]
struct PutBody {
    name: Option<String>,
    content: Option<String>,
    old: Option<String>,
    new: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub list: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ReadResponse {
    pub content: String,
}

/// `GET /vfs?cmd=list|read|exists[&name=X]`
pub async fn query(
    State(store): State<SharedStore>,
    Query(params): Query<VfsQuery>,
) -> Result<Response, ApiError> {
    match params.cmd.as_deref() {
        Some("list") => list(&store).await,
        Some("read") => read(&store, &params.name).await,
        Some("exists") => exists(&store, &params.name).await,
        Some(other) => Err(ApiError::bad_request(format!("unknown cmd: {other}"))),
        None => Err(ApiError::bad_request("cmd is required")),
    }
}

async fn list(store: &SharedStore) -> Result<Response, ApiError> {
    let list = store.list().await?;
    debug!(count = list.len(), "listed files");
    Ok(Json(ListResponse { list }).into_response())
}

async fn read(store: &SharedStore, name: &str) -> Result<Response, ApiError> {
    validate_name("name", name)?;
    let bytes = store.get(name).await?;
    let content = String::from_utf8_lossy(&bytes).into_owned();
    Ok(Json(ReadResponse { content }).into_response())
}

async fn exists(store: &SharedStore, name: &str) -> Result<Response, ApiError> {
    if !name.is_empty() && store.exists(name).await? {
        Ok(StatusCode::OK.into_response())
    } else {
        Ok(StatusCode::NOT_FOUND.into_response())
    }
}

/// `POST /vfs` with `{"name","content"}`.
pub async fn write(State(store): State<SharedStore>, body: Bytes) -> Result<StatusCode, ApiError> {
    let body: WriteBody = decode(&body)?;
    put_file(&store, body).await
}

/// `PUT /vfs` with `{"old","new"}` (rename) or `{"name","content"}` (write).
pub async fn modify(State(store): State<SharedStore>, body: Bytes) -> Result<StatusCode, ApiError> {
    let body: PutBody = decode(&body)?;
    if body.old.is_none() && body.new.is_none() && body.name.is_some() {
        let write = WriteBody {
            name: body.name.unwrap_or_default(),
            content: body.content,
        };
        return put_file(&store, write).await;
    }

    let rename = RenameBody {
        old: body.old.unwrap_or_default(),
        new: body.new.unwrap_or_default(),
    };
    rename_file(&store, rename).await
}

/// `DELETE /vfs?name=X`. 404 when nothing was there to remove.
pub async fn remove(
    State(store): State<SharedStore>,
    Query(params): Query<DeleteQuery>,
) -> Result<StatusCode, ApiError> {
    validate_name("name", &params.name)?;
    if store.delete(&params.name).await? {
        debug!(name = %params.name, "deleted file");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(&params.name))
    }
}

async fn put_file(store: &SharedStore, body: WriteBody) -> Result<StatusCode, ApiError> {
    validate_name("name", &body.name)?;
    let content = body.content.unwrap_or_default();
    store.put(&body.name, content.as_bytes()).await?;
    debug!(name = %body.name, bytes = content.len(), "wrote file");
    Ok(StatusCode::CREATED)
}

async fn rename_file(store: &SharedStore, body: RenameBody) -> Result<StatusCode, ApiError> {
    validate_name("old", &body.old)?;
    validate_name("new", &body.new)?;
    store.rename(&body.old, &body.new).await?;
    debug!(old = %body.old, new = %body.new, "renamed file");
    Ok(StatusCode::OK)
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| {
        warn!(error = %e, "rejected undecodable request body");
        ApiError::internal(format!("invalid body: {e}"))
    })
}
