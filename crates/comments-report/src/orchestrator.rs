//! Download orchestrator (§4.6): resolves or creates a cache entry,
//! re-validates it against the event log, and returns either the cached
//! blob or a live stream that waits for the builder.

use std::sync::Arc;

use async_trait::async_trait;
use comments_core::{DlFormat, DlRequestId, DlState, Timestamp, UserId};
use comments_db::{Database, DlRequestKey};
use comments_pubsub::{Consumer, Message, MessageHandler, Registry};
use comments_util_error::BoxedError;
use snafu::{Location, ResultExt as _, Snafu};
use tokio::sync::Mutex as AsyncMutex;

use crate::blob_store::{BlobStore, BlobStoreError};

const BUILD_REQUEST_CHANNEL: &str = "xml-dl-request";

#[derive(Debug, Snafu)]
pub enum DownloadError {
    #[snafu(display("At least one of i_id or author_id must be set"))]
    MissingScope {
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(transparent)]
    Db { source: comments_db::DbError },
    #[snafu(transparent)]
    Blob { source: BlobStoreError },
    #[snafu(display("Report build failed"))]
    BuildFailed {
        #[snafu(implicit)]
        location: Location,
    },
}
pub type DownloadResult<T> = std::result::Result<T, DownloadError>;

pub struct DownloadRequest {
    pub user_id: UserId,
    pub itype_id: i64,
    pub i_id: Option<i64>,
    pub author_id: Option<UserId>,
    pub start: Option<Timestamp>,
    pub end: Option<Timestamp>,
    pub fmt: DlFormat,
}

/// Either the download is already materialized (cached file, with a known
/// length) or the caller must wait on the one-shot build before it can be
/// streamed. The distinction is part of the observable HTTP contract (§6):
/// a cached response carries `Content-Length`, a freshly-built one doesn't.
pub enum DownloadOutcome {
    Cached { bytes: Vec<u8> },
    Built { bytes: Vec<u8> },
}

pub struct DownloadOrchestrator {
    db: Arc<Database>,
    blobs: BlobStore,
}

impl DownloadOrchestrator {
    pub fn new(db: Arc<Database>, blobs: BlobStore) -> Self {
        Self { db, blobs }
    }

    pub async fn handle(&self, req: DownloadRequest) -> DownloadResult<DownloadOutcome> {
        if req.i_id.is_none() && req.author_id.is_none() {
            return MissingScopeSnafu.fail();
        }

        if req.i_id.is_some() {
            self.db
                .write_with(|tx| {
                    Database::resolve_dl_request_root_tx(tx, req.itype_id, req.i_id).map(|_| ())
                })
                .await
                .context(DbSnafu)?;
        }

        let key = DlRequestKey::new(
            req.itype_id,
            req.i_id,
            req.author_id,
            req.start,
            req.end,
            req.fmt,
        );

        let now = Timestamp::now();
        let (id, mut record) = self
            .db
            .write_with(|tx| {
                Database::resolve_or_create_dl_request_tx(tx, key, req.user_id, now)
            })
            .await
            .context(DbSnafu)?;

        record = self
            .db
            .write_with(|tx| Database::revalidate_dl_request_tx(tx, id))
            .await
            .context(DbSnafu)?;

        match record.state {
            DlState::Valid => {
                let bytes = self
                    .blobs
                    .read(&record.filename, record.fmt)
                    .await
                    .context(BlobSnafu)?;
                Ok(DownloadOutcome::Cached { bytes })
            }
            DlState::Invalid => {
                let built = self.await_build(id, record.fmt).await;
                if !built {
                    return BuildFailedSnafu.fail();
                }
                let bytes = self
                    .blobs
                    .read(&record.filename, record.fmt)
                    .await
                    .context(BlobSnafu)?;
                Ok(DownloadOutcome::Built { bytes })
            }
        }
    }

    /// Subscribes a one-shot waiter on `<fmt>-dl-request-<id>`, publishes
    /// the build request on `xml-dl-request`, and waits for the builder's
    /// `1`/`0` completion signal. Concurrent callers racing the same stale
    /// `DlRequest` each publish independently, but the builder's in-progress
    /// set (not this code) collapses them into a single actual build.
    async fn await_build(&self, id: DlRequestId, fmt: DlFormat) -> bool {
        let consumer = Arc::new(Consumer::new());
        consumer.subscribe(format!("{}-dl-request-{}", fmt.channel_prefix(), id.get()));

        let handler = Arc::new(DlResponseConsumer {
            consumer: consumer.clone(),
            result: AsyncMutex::new(None),
        });

        Registry::global()
            .channel(BUILD_REQUEST_CHANNEL)
            .publish(Message::from(id.get()));

        consumer.run(&*handler).await;

        handler.result.lock().await.unwrap_or(false)
    }
}

struct DlResponseConsumer {
    consumer: Arc<Consumer>,
    result: AsyncMutex<Option<bool>>,
}

#[async_trait]
impl MessageHandler for DlResponseConsumer {
    async fn on_message(&self, _channel: &str, message: Message) -> Result<(), BoxedError> {
        let ok = message.as_i64() == Some(1);
        *self.result.lock().await = Some(ok);
        self.consumer.stop();
        Ok(())
    }
}
