//! Read endpoints: `list`, `tree`, `branch`, and the two `stream` variants
//! (`spec.md` §6, `views/comments_tree.py` in `original_source/`).

use axum::Json;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use comments_core::{CommentId, CommentRecord, UserId};
use comments_db::Database;

use crate::SharedState;
use crate::dto::{BranchDto, CommentDto, CommentTreeDto, UserStreamDto};
use crate::error::ApiError;

/// Resolves `(i_id, itype_id)` to its direct children, per the `itype_id ==
/// 0` overload: `0` means `i_id` names a comment (reply list), anything
/// else names an external instance.
async fn list_children(
    state: &SharedState,
    i_id: i64,
    itype_id: i64,
    last_id: Option<i64>,
    limit: Option<usize>,
) -> Result<Vec<(CommentId, CommentRecord)>, ApiError> {
    let last_id = last_id.map(CommentId::new);
    if itype_id == 0 {
        Ok(state
            .db
            .children_of_comment(CommentId::new(i_id), last_id, limit)
            .await?)
    } else {
        Ok(state
            .db
            .children_of_instance(itype_id, i_id, last_id, limit)
            .await?)
    }
}

pub async fn list_basic(
    State(state): State<SharedState>,
    Path((i_id, itype_id)): Path<(i64, i64)>,
) -> Result<Json<Vec<CommentDto>>, ApiError> {
    list_impl(state, i_id, itype_id, None, None).await
}

pub async fn list_with_limit(
    State(state): State<SharedState>,
    Path((i_id, itype_id, limit)): Path<(i64, i64, usize)>,
) -> Result<Json<Vec<CommentDto>>, ApiError> {
    list_impl(state, i_id, itype_id, Some(limit), None).await
}

pub async fn list_with_cursor(
    State(state): State<SharedState>,
    Path((i_id, itype_id, limit, last_id)): Path<(i64, i64, usize, i64)>,
) -> Result<Json<Vec<CommentDto>>, ApiError> {
    list_impl(state, i_id, itype_id, Some(limit), Some(last_id)).await
}

async fn list_impl(
    state: SharedState,
    i_id: i64,
    itype_id: i64,
    limit: Option<usize>,
    last_id: Option<i64>,
) -> Result<Json<Vec<CommentDto>>, ApiError> {
    let rows = list_children(&state, i_id, itype_id, last_id, limit).await?;
    Ok(Json(
        rows.iter()
            .map(|(id, record)| CommentDto::from_record(*id, record))
            .collect(),
    ))
}

/// Resolves the subtree (descendants only, pre-order) named by `(i_id,
/// itype_id)`.
async fn tree_rows(
    state: &SharedState,
    i_id: i64,
    itype_id: i64,
) -> Result<Vec<(CommentId, CommentRecord)>, ApiError> {
    if itype_id == 0 {
        Ok(state.db.subtree_of_comment(CommentId::new(i_id)).await?)
    } else {
        Ok(state.db.subtree_of_instance(itype_id, i_id).await?)
    }
}

pub async fn tree_default(
    State(state): State<SharedState>,
    Path(i_id): Path<i64>,
) -> Result<Json<Vec<CommentTreeDto>>, ApiError> {
    tree_impl(state, i_id, 0).await
}

pub async fn tree_with_itype(
    State(state): State<SharedState>,
    Path((i_id, itype_id)): Path<(i64, i64)>,
) -> Result<Json<Vec<CommentTreeDto>>, ApiError> {
    tree_impl(state, i_id, itype_id).await
}

async fn tree_impl(
    state: SharedState,
    i_id: i64,
    itype_id: i64,
) -> Result<Json<Vec<CommentTreeDto>>, ApiError> {
    let rows = tree_rows(&state, i_id, itype_id).await?;
    Ok(Json(
        rows.iter()
            .map(|(id, record)| CommentTreeDto::from_record(*id, record))
            .collect(),
    ))
}

/// `{root, comments}`. `root` is `null` when `itype_id != 0` — the root
/// named there is a synthetic Instance, which has no Comment-shaped fields
/// to render (see `DESIGN.md`).
pub async fn branch_default(
    State(state): State<SharedState>,
    Path(i_id): Path<i64>,
) -> Result<Json<BranchDto>, ApiError> {
    branch_impl(state, i_id, 0).await
}

pub async fn branch_with_itype(
    State(state): State<SharedState>,
    Path((i_id, itype_id)): Path<(i64, i64)>,
) -> Result<Json<BranchDto>, ApiError> {
    branch_impl(state, i_id, itype_id).await
}

async fn branch_impl(state: SharedState, i_id: i64, itype_id: i64) -> Result<Json<BranchDto>, ApiError> {
    let rows = tree_rows(&state, i_id, itype_id).await?;
    let root = if itype_id == 0 {
        let root_id = CommentId::new(i_id);
        let root_record = state
            .db
            .get_comment(root_id)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("Comment {root_id} does not exist")))?;
        Some(CommentTreeDto::from_record(root_id, &root_record))
    } else {
        None
    };

    Ok(Json(BranchDto {
        root: root.unwrap_or_else(empty_root),
        comments: rows
            .iter()
            .map(|(id, record)| CommentTreeDto::from_record(*id, record))
            .collect(),
    }))
}

/// Placeholder root rendered when the branch's root is an Instance (no
/// Comment-shaped fields to serialize).
fn empty_root() -> CommentTreeDto {
    CommentTreeDto {
        id: 0,
        i_id: 0,
        itype_id: 0,
        author_id: 0,
        content: String::new(),
        created: String::new(),
        updated: String::new(),
        parent_id: None,
    }
}

const STREAM_CHUNK: usize = 3;

pub async fn stream_tree_default(
    State(state): State<SharedState>,
    Path(i_id): Path<i64>,
) -> Result<Response, ApiError> {
    stream_tree_impl(state, i_id, 0).await
}

pub async fn stream_tree_with_itype(
    State(state): State<SharedState>,
    Path((i_id, itype_id)): Path<(i64, i64)>,
) -> Result<Response, ApiError> {
    stream_tree_impl(state, i_id, itype_id).await
}

async fn stream_tree_impl(state: SharedState, i_id: i64, itype_id: i64) -> Result<Response, ApiError> {
    let rows = tree_rows(&state, i_id, itype_id).await?;
    let dtos: Vec<CommentTreeDto> = rows
        .iter()
        .map(|(id, record)| CommentTreeDto::from_record(*id, record))
        .collect();
    Ok(stream_response(dtos))
}

pub async fn stream_user(
    State(state): State<SharedState>,
    Path(user_id): Path<i64>,
) -> Result<Response, ApiError> {
    let rows = state.db.comments_by_author(UserId::new(user_id), None, None).await?;
    let dtos: Vec<UserStreamDto> = rows
        .iter()
        .map(|(id, record)| UserStreamDto::from_record(*id, record))
        .collect();
    Ok(stream_response(dtos))
}

/// Frames `items` as `\r\n`-separated JSON objects, in batches of
/// [`STREAM_CHUNK`] with an explicit yield between batches — the Rust
/// analogue of the original's `fetchmany(3)` + `stream.drain()` loop, with
/// `Content-Type: text/html`, `no-cache`, and CORS `*` (`spec.md` §6).
fn stream_response<T: serde::Serialize + Send + 'static>(items: Vec<T>) -> Response {
    let body_stream = async_stream::stream! {
        for chunk in items.chunks(STREAM_CHUNK) {
            let mut buf = String::new();
            for item in chunk {
                buf.push_str(&serde_json::to_string(item).expect("DTOs always serialize"));
                buf.push_str("\r\n");
            }
            yield Ok::<_, std::io::Error>(bytes::Bytes::from(buf.into_bytes()));
            tokio::task::yield_now().await;
        }
    };

    let mut response = Response::new(Body::from_stream(body_stream));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, "text/html".parse().expect("static value"));
    response
        .headers_mut()
        .insert(CACHE_CONTROL, "no-cache".parse().expect("static value"));
    response.headers_mut().insert(
        "access-control-allow-origin",
        "*".parse().expect("static value"),
    );
    response.into_response()
}
