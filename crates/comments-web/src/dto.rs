//! JSON field sets for the HTTP API (`spec.md` §6).

use comments_core::{CommentId, CommentRecord};
use serde::Serialize;

use crate::time_fmt::to_iso8601;

/// `{id, i_id, itype_id, author_id, content, created, updated}` — the list/
/// get response shape.
#[derive(Serialize)]
pub struct CommentDto {
    pub id: i64,
    pub i_id: i64,
    pub itype_id: i64,
    pub author_id: i64,
    pub content: String,
    pub created: String,
    pub updated: String,
}

impl CommentDto {
    pub fn from_record(id: CommentId, record: &CommentRecord) -> Self {
        Self {
            id: id.get(),
            i_id: record.i_id,
            itype_id: record.itype_id,
            author_id: record.author_id.get(),
            content: record.content.clone(),
            created: to_iso8601(record.created),
            updated: to_iso8601(record.updated),
        }
    }
}

/// Tree/branch variant: adds `parent_id`.
#[derive(Serialize)]
pub struct CommentTreeDto {
    pub id: i64,
    pub i_id: i64,
    pub itype_id: i64,
    pub author_id: i64,
    pub content: String,
    pub created: String,
    pub updated: String,
    pub parent_id: Option<i64>,
}

impl CommentTreeDto {
    pub fn from_record(id: CommentId, record: &CommentRecord) -> Self {
        Self {
            id: id.get(),
            i_id: record.i_id,
            itype_id: record.itype_id,
            author_id: record.author_id.get(),
            content: record.content.clone(),
            created: to_iso8601(record.created),
            updated: to_iso8601(record.updated),
            parent_id: record.parent_id.map(CommentId::get),
        }
    }
}

/// User-stream variant: omits `author_id` (redundant with the path param).
#[derive(Serialize)]
pub struct UserStreamDto {
    pub id: i64,
    pub i_id: i64,
    pub itype_id: i64,
    pub content: String,
    pub created: String,
    pub updated: String,
    pub parent_id: Option<i64>,
}

impl UserStreamDto {
    pub fn from_record(id: CommentId, record: &CommentRecord) -> Self {
        Self {
            id: id.get(),
            i_id: record.i_id,
            itype_id: record.itype_id,
            content: record.content.clone(),
            created: to_iso8601(record.created),
            updated: to_iso8601(record.updated),
            parent_id: record.parent_id.map(CommentId::get),
        }
    }
}

#[derive(Serialize)]
pub struct BranchDto {
    pub root: CommentTreeDto,
    pub comments: Vec<CommentTreeDto>,
}

#[derive(Serialize)]
pub struct DlRequestDto {
    pub id: i64,
    pub itype_id: i64,
    pub i_id: Option<i64>,
    pub author_id: Option<i64>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub fmt: &'static str,
    pub created: String,
}

impl DlRequestDto {
    pub fn from_record(id: comments_core::DlRequestId, record: &comments_db::DlRequestRecord) -> Self {
        Self {
            id: id.get(),
            itype_id: record.itype_id,
            i_id: record.i_id,
            author_id: record.author_id.map(|a| a.get()),
            start: record.start.map(to_iso8601),
            end: record.end.map(to_iso8601),
            fmt: record.fmt.extension(),
            created: to_iso8601(record.created),
        }
    }
}
