//! The report builder: a [`BackgroundConsumer`] listening on `xml-dl-request`
//! that turns a `DlRequest` into a materialized XML blob (§4.5).

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use comments_core::{CommentRecord, DlRequestId, Timestamp};
use comments_db::Database;
use comments_pubsub::{BackgroundConsumer, MessageHandler, Message, Registry};
use comments_util_error::{BoxedError, BoxedExt as _};
use snafu::FromString as _;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::blob_store::BlobStore;
use crate::xml::{self, ReportRequest};

const LOG_TARGET: &str = "comments::report";
const BUILD_REQUEST_CHANNEL: &str = "xml-dl-request";

fn completion_channel(id: DlRequestId) -> String {
    format!("{BUILD_REQUEST_CHANNEL}-{}", id.get())
}

/// Owns the build-request consumer and the in-progress guard that collapses
/// duplicate concurrent requests for the same `DlRequest` to one build.
pub struct ReportBuilder {
    db: Arc<Database>,
    blobs: BlobStore,
    in_progress: Mutex<HashSet<i64>>,
    consumer: BackgroundConsumer,
}

impl ReportBuilder {
    pub fn new(db: Arc<Database>, blobs: BlobStore) -> Arc<Self> {
        Self::with_capacity(db, blobs, 3)
    }

    /// `capacity` bounds how many builds run concurrently (`spec.md` §5).
    pub fn with_capacity(db: Arc<Database>, blobs: BlobStore, capacity: usize) -> Arc<Self> {
        let consumer = BackgroundConsumer::with_capacity(capacity);
        consumer.subscribe(BUILD_REQUEST_CHANNEL);
        Arc::new(Self {
            db,
            blobs,
            in_progress: Mutex::new(HashSet::new()),
            consumer,
        })
    }

    /// Drives the consumer until [`Self::stop`] is called. Spawn this as a
    /// background task.
    pub async fn run(self: &Arc<Self>) {
        self.consumer.run(self.clone()).await;
    }

    pub fn stop(&self) {
        self.consumer.stop();
    }

    async fn build_one(&self, id: DlRequestId) -> bool {
        let record = match self.db.get_dl_request(id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!(target: LOG_TARGET, id = %id, "DlRequest does not exist, cannot build");
                return false;
            }
            Err(err) => {
                warn!(target: LOG_TARGET, id = %id, err = %err, "Failed to load DlRequest");
                return false;
            }
        };

        match self.build_and_write(id, &record).await {
            Ok(()) => {
                if let Err(err) = self
                    .db
                    .write_with(|tx| Database::mark_dl_request_built_tx(tx, id, Timestamp::now()))
                    .await
                {
                    warn!(target: LOG_TARGET, id = %id, err = %err, "Failed to mark DlRequest valid");
                    return false;
                }
                info!(target: LOG_TARGET, id = %id, "Built report");
                true
            }
            Err(err) => {
                warn!(target: LOG_TARGET, id = %id, err = %err, "Report build failed");
                false
            }
        }
    }

    async fn build_and_write(
        &self,
        id: DlRequestId,
        record: &comments_db::DlRequestRecord,
    ) -> Result<(), BoxedError> {
        let (root, mut rows) = self.resolve_rows(record).await?;

        if let Some(author_id) = record.author_id {
            rows.retain(|(_, c)| c.author_id == author_id);
        }
        if let Some(start) = record.start {
            rows.retain(|(_, c)| c.created >= start);
        }
        if let Some(end) = record.end {
            rows.retain(|(_, c)| c.created <= end);
        }

        let request = ReportRequest {
            i_id: record.i_id,
            itype_id: record.i_id.map(|_| record.itype_id),
            author_id: record.author_id,
            start: record.start,
            end: record.end,
        };
        let xml = xml::render_report(&request, root.as_ref().map(|(id, r)| (*id, r)), &rows);

        self.blobs
            .write_atomic(&record.filename, record.fmt, &xml)
            .await
            .boxed()?;
        Ok(())
    }

    async fn resolve_rows(
        &self,
        record: &comments_db::DlRequestRecord,
    ) -> Result<
        (
            Option<(comments_core::CommentId, CommentRecord)>,
            Vec<(comments_core::CommentId, CommentRecord)>,
        ),
        BoxedError,
    > {
        let Some(i_id) = record.i_id else {
            let author_id = record
                .author_id
                .expect("orchestrator requires i_id or author_id");
            let rows = self
                .db
                .comments_by_author(author_id, record.start, record.end)
                .await
                .boxed()?;
            return Ok((None, rows));
        };

        if record.itype_id != 0 {
            let rows = self
                .db
                .subtree_of_instance(record.itype_id, i_id)
                .await
                .boxed()?;
            Ok((None, rows))
        } else {
            let root_id = comments_core::CommentId::new(i_id);
            let root = self
                .db
                .get_comment(root_id)
                .await
                .boxed()?
                .ok_or_else(|| {
                    Box::new(snafu::Whatever::without_source(format!(
                        "comment {i_id} does not exist"
                    ))) as BoxedError
                })?;
            let rows = self.db.subtree_of_comment(root_id).await.boxed()?;
            Ok((Some((root_id, root)), rows))
        }
    }
}

#[async_trait]
impl MessageHandler for ReportBuilder {
    async fn on_message(&self, _channel: &str, message: Message) -> Result<(), BoxedError> {
        let Some(id) = message.as_i64().map(DlRequestId::new) else {
            warn!(target: LOG_TARGET, ?message, "Malformed build request");
            return Ok(());
        };

        {
            let mut in_progress = self.in_progress.lock().await;
            if !in_progress.insert(id.get()) {
                return Ok(());
            }
        }

        let ok = self.build_one(id).await;

        self.in_progress.lock().await.remove(&id.get());

        Registry::global()
            .channel(completion_channel(id))
            .publish(Message::from(if ok { 1 } else { 0 }));

        Ok(())
    }
}

