use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::error::StoreError;

/// Upper bound on comment length, in characters.
pub const MAX_CONTENT_LEN: usize = 1000;

/// Represents the 'comments' table in the database.
///
/// `parent_id` is `None` for a root. Ids are UUIDv7, so ordering by
/// `(created_at, id)` reproduces insertion order even when two rows share a
/// timestamp.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Checks the content bounds enforced on every insert.
pub fn validate_content(content: &str) -> Result<(), StoreError> {
    let len = content.chars().count();
    if content.trim().is_empty() {
        return Err(StoreError::Validation(
            "Comment content must not be empty".to_string(),
        ));
    }
    if len > MAX_CONTENT_LEN {
        return Err(StoreError::Validation(format!(
            "Comment must be at most {MAX_CONTENT_LEN} characters (got {len})"
        )));
    }
    Ok(())
}

/// DTO for creating a new comment.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCommentRequest {
    #[validate(length(
        min = 1,
        max = 1000,
        message = "Comment must be between 1 and 1000 characters"
    ))]
    pub content: String,

    /// Optional: the ID of the comment being replied to.
    pub parent_id: Option<Uuid>,
}

/// Query parameters for fetching a subtree.
#[derive(Debug, Deserialize)]
pub struct SubtreeParams {
    /// Root of the subtree to return.
    pub parent: Option<Uuid>,
}

/// Query parameters for the flat listing.
///
/// `limit` and `offset` are kept as raw strings so that garbage values fall
/// back to the defaults instead of rejecting the request.
#[derive(Debug, Default, Deserialize)]
pub struct CommentListParams {
    pub parent: Option<Uuid>,
    pub search: Option<String>,
    pub sort: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}
