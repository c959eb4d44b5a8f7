//! `GET /api/comments/download/[{format}/]` and `GET
//! /api/comments/download/requests/{user_id}/` — `spec.md` §6,
//! `views/user_requests.py` in `original_source/`.

use axum::Json;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use comments_core::{DlFormat, Timestamp, UserId};
use comments_report::{DownloadOutcome, DownloadRequest};
use serde::Deserialize;

use crate::SharedState;
use crate::dto::DlRequestDto;
use crate::error::ApiError;

/// Chunk size used when streaming a freshly built report — keeps the
/// response body's `size_hint` inexact so hyper emits chunked
/// transfer-encoding instead of a `Content-Length` header (spec §6's
/// cached-vs-built distinction).
const BUILT_STREAM_CHUNK: usize = 4096;

fn millis_to_timestamp(millis: Option<i64>) -> Option<Timestamp> {
    millis.map(Timestamp::from_millis)
}

#[derive(Deserialize)]
pub struct DownloadQuery {
    pub user_id: i64,
    #[serde(default, deserialize_with = "crate::serde_util::empty_string_as_none")]
    pub start: Option<i64>,
    #[serde(default, deserialize_with = "crate::serde_util::empty_string_as_none")]
    pub end: Option<i64>,
    #[serde(default, deserialize_with = "crate::serde_util::empty_string_as_none")]
    pub author_id: Option<i64>,
    #[serde(default, deserialize_with = "crate::serde_util::empty_string_as_none")]
    pub i_id: Option<i64>,
    #[serde(default)]
    pub itype_id: i64,
}

pub async fn download_default(
    State(state): State<SharedState>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, ApiError> {
    download_impl(state, query, DlFormat::Xml).await
}

pub async fn download_with_format(
    State(state): State<SharedState>,
    Path(format): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, ApiError> {
    let fmt = match format.as_str() {
        "xml" => DlFormat::Xml,
        _ => DlFormat::Xml,
    };
    download_impl(state, query, fmt).await
}

async fn download_impl(
    state: SharedState,
    query: DownloadQuery,
    fmt: DlFormat,
) -> Result<Response, ApiError> {
    if query.i_id.is_none() && query.author_id.is_none() {
        return Err(ApiError::validation(
            "_",
            "Instance or Author should be specified.",
        ));
    }

    let outcome = state
        .orchestrator
        .handle(DownloadRequest {
            user_id: UserId::new(query.user_id),
            itype_id: query.itype_id,
            i_id: query.i_id,
            author_id: query.author_id.map(UserId::new),
            start: millis_to_timestamp(query.start),
            end: millis_to_timestamp(query.end),
            fmt,
        })
        .await?;

    // `Cached` carries a known `Content-Length` (a plain file read, buffered
    // body). `Built` is the just-finished live build: streamed in chunks
    // with no pre-known length, so the response falls back to chunked
    // transfer-encoding — the distinction the HTTP contract exposes.
    let mut response = match outcome {
        DownloadOutcome::Cached { bytes } => {
            let len = bytes.len();
            let mut response = bytes.into_response();
            response.headers_mut().insert(
                CONTENT_LENGTH,
                len.to_string().parse().expect("integer always parses"),
            );
            response
        }
        DownloadOutcome::Built { bytes } => built_body(bytes).into_response(),
    };

    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, "text/xml".parse().expect("static value"));
    headers.insert(
        CONTENT_DISPOSITION,
        "attachment; filename=\"report.xml\""
            .parse()
            .expect("static value"),
    );
    headers.insert(CACHE_CONTROL, "no-cache".parse().expect("static value"));

    Ok(response)
}

/// Frames a freshly built report as a chunked byte stream, yielding between
/// chunks the same way `comments::stream_response` does for JSON framing.
fn built_body(bytes: Vec<u8>) -> Body {
    let stream = async_stream::stream! {
        for chunk in bytes.chunks(BUILT_STREAM_CHUNK) {
            yield Ok::<_, std::io::Error>(bytes::Bytes::copy_from_slice(chunk));
            tokio::task::yield_now().await;
        }
    };
    Body::from_stream(stream)
}

pub async fn list_user_requests(
    State(state): State<SharedState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<DlRequestDto>>, ApiError> {
    let rows = state.db.get_user_dl_requests(UserId::new(user_id)).await?;
    Ok(Json(
        rows.iter()
            .map(|(id, record)| DlRequestDto::from_record(*id, record))
            .collect(),
    ))
}
