//! Route table (`spec.md` §6). Optional trailing path segments in the
//! original (`itype_id`, `limit`, `last_id`) become separate routes to the
//! same handler, since axum has no notion of an optional path segment.

mod comment;
mod comments;
mod download;

use axum::Router;
use axum::routing::{get, put};

use crate::SharedState;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/api/comment/", put(comment::create))
        .route(
            "/api/comment/{id}/",
            get(comment::get).post(comment::update).delete(comment::delete),
        )
        .route("/api/comments/list/{i_id}/{itype_id}/", get(comments::list_basic))
        .route(
            "/api/comments/list/{i_id}/{itype_id}/{limit}/",
            get(comments::list_with_limit),
        )
        .route(
            "/api/comments/list/{i_id}/{itype_id}/{limit}/{last_id}/",
            get(comments::list_with_cursor),
        )
        .route("/api/comments/tree/{i_id}/", get(comments::tree_default))
        .route(
            "/api/comments/tree/{i_id}/{itype_id}/",
            get(comments::tree_with_itype),
        )
        .route("/api/comments/branch/{i_id}/", get(comments::branch_default))
        .route(
            "/api/comments/branch/{i_id}/{itype_id}/",
            get(comments::branch_with_itype),
        )
        .route(
            "/api/comments/stream/tree/{i_id}/",
            get(comments::stream_tree_default),
        )
        .route(
            "/api/comments/stream/tree/{i_id}/{itype_id}/",
            get(comments::stream_tree_with_itype),
        )
        .route("/api/comments/stream/user/{user_id}/", get(comments::stream_user))
        .route("/api/comments/download/", get(download::download_default))
        .route(
            "/api/comments/download/{format}/",
            get(download::download_with_format),
        )
        .route(
            "/api/comments/download/requests/{user_id}/",
            get(download::list_user_requests),
        )
        .with_state(state)
}
