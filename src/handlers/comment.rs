// src/handlers/comment.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppError,
    models::comment::{CommentListParams, CreateCommentRequest, SubtreeParams},
    store::{CommentStore, ListQuery},
};

/// Create a new comment, either a root or a reply to `parent_id`.
pub async fn create_comment(
    State(store): State<CommentStore>,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let comment = store
        .create_comment(payload.parent_id, &payload.content)
        .await?;

    Ok((StatusCode::CREATED, Json(comment)))
}

/// Get a comment and all of its nested replies, oldest first.
pub async fn get_subtree(
    State(store): State<CommentStore>,
    Query(params): Query<SubtreeParams>,
) -> Result<impl IntoResponse, AppError> {
    let root_id = params
        .parent
        .ok_or(AppError::BadRequest("parent id is required".to_string()))?;

    let comments = store.fetch_subtree(root_id).await?;

    Ok(Json(comments))
}

/// List comments with optional parent scope, search, sort and pagination.
/// Unparsable `limit`/`offset` fall back to their defaults.
pub async fn list_comments(
    State(store): State<CommentStore>,
    Query(params): Query<CommentListParams>,
) -> Result<impl IntoResponse, AppError> {
    let query = ListQuery {
        parent_id: params.parent,
        search: params.search,
        sort: params.sort,
        limit: params.limit.and_then(|l| l.trim().parse().ok()),
        offset: params.offset.and_then(|o| o.trim().parse().ok()),
    };

    let comments = store.list_comments(&query).await?;

    Ok(Json(comments))
}

/// Delete a comment together with every descendant.
pub async fn delete_comment(
    State(store): State<CommentStore>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let deleted = store.delete_subtree(id).await?;

    Ok(Json(serde_json::json!({ "deleted": deleted })))
}
