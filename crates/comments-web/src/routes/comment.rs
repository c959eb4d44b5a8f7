//! `PUT|GET|POST|DELETE /api/comment/[{id}/]` — `spec.md` §6,
//! `views/comments_rest.py` in `original_source/`.

use axum::Json;
use axum::extract::{Path, State};
use comments_core::{CommentId, EventType, Timestamp, UserId};
use comments_db::Database;
use serde::Deserialize;

use crate::SharedState;
use crate::dto::CommentDto;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct CreateCommentBody {
    pub user_id: i64,
    #[serde(default)]
    pub itype_id: i64,
    pub i_id: i64,
    pub content: String,
}

pub async fn create(
    State(state): State<SharedState>,
    Json(body): Json<CreateCommentBody>,
) -> Result<Json<CommentDto>, ApiError> {
    if body.content.trim().is_empty() {
        return Err(ApiError::validation("content", "content must not be empty"));
    }

    let now = Timestamp::now();
    let author_id = UserId::new(body.user_id);
    let (id, record) = state
        .db
        .write_with(|tx| {
            let (id, record) = Database::insert_comment_tx(
                tx,
                body.itype_id,
                body.i_id,
                author_id,
                body.content.clone(),
                now,
            )?;
            Database::append_event_tx(
                tx,
                author_id,
                record.tree_id,
                author_id,
                id,
                record.created,
                EventType::Created,
                now,
            )?;
            Ok((id, record))
        })
        .await?;

    Ok(Json(CommentDto::from_record(id, &record)))
}

pub async fn get(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<CommentDto>, ApiError> {
    let id = CommentId::new(id);
    let record = state
        .db
        .get_comment(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Comment {id} does not exist")))?;
    Ok(Json(CommentDto::from_record(id, &record)))
}

#[derive(Deserialize)]
pub struct UpdateCommentBody {
    pub user_id: i64,
    pub content: String,
}

pub async fn update(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateCommentBody>,
) -> Result<Json<CommentDto>, ApiError> {
    let id = CommentId::new(id);
    let requester = UserId::new(body.user_id);

    let existing = state
        .db
        .get_comment(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Comment {id} does not exist")))?;

    if existing.author_id != requester {
        return Err(ApiError::permission_denied(
            "user_id",
            "Specified User is not the comment author.",
        ));
    }

    // Only touch storage (and emit a CHANGED event) when content actually
    // changes — unconditional `updated` bumps are a storage-layer concern
    // (`spec.md` §4.3), but the HTTP layer skips the no-op write entirely.
    let record = if existing.content == body.content {
        existing
    } else {
        let now = Timestamp::now();
        state
            .db
            .write_with(|tx| {
                let record =
                    Database::update_comment_content_tx(tx, id, body.content.clone(), now)?;
                Database::append_event_tx(
                    tx,
                    requester,
                    record.tree_id,
                    record.author_id,
                    id,
                    record.created,
                    EventType::Changed,
                    now,
                )?;
                Ok(record)
            })
            .await?
    };

    Ok(Json(CommentDto::from_record(id, &record)))
}

#[derive(Deserialize)]
pub struct DeleteCommentBody {
    pub user_id: i64,
}

pub async fn delete(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(body): Json<DeleteCommentBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = CommentId::new(id);
    let requester = UserId::new(body.user_id);

    let existing = state
        .db
        .get_comment(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Comment {id} does not exist")))?;

    if existing.author_id != requester {
        return Err(ApiError::permission_denied(
            "user_id",
            "Specified User is not the comment author.",
        ));
    }

    if existing.children_cnt > 0 {
        return Err(ApiError::conflict("comment_id", "Comment has children."));
    }

    let now = Timestamp::now();
    state
        .db
        .write_with(|tx| {
            Database::delete_branch_tx(tx, id)?;
            Database::append_event_tx(
                tx,
                requester,
                existing.tree_id,
                existing.author_id,
                id,
                existing.created,
                EventType::Deleted,
                now,
            )?;
            Ok(())
        })
        .await?;

    Ok(Json(serde_json::json!({})))
}
