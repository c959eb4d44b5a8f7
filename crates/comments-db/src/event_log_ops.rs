//! Append-only event log: the authority cached reports revalidate against.

use comments_core::{CommentId, EventLogId, EventType, InstanceId, Timestamp, UserId};
use redb_bincode::ReadableTable as _;

use crate::{
    Database, DbResult, EventLogRecord, WriteTransactionCtx, event_log, event_log_by_author,
    event_log_by_tree, event_log_by_tree_author,
};

impl Database {
    /// Appends one record. Never mutated or removed afterwards.
    pub fn append_event_tx(
        tx: &WriteTransactionCtx,
        user_id: UserId,
        tree_id: InstanceId,
        author_id: UserId,
        comment_id: CommentId,
        comment_cdate: Timestamp,
        e_type: EventType,
        now: Timestamp,
    ) -> DbResult<EventLogId> {
        let id = Self::next_event_log_id_tx(tx)?;
        let record = EventLogRecord {
            user_id,
            tree_id,
            author_id,
            comment_id,
            comment_cdate,
            e_type,
            e_date: now,
        };
        tx.open_table(&event_log::TABLE)?.insert(&id, &record)?;
        tx.open_table(&event_log_by_tree::TABLE)?
            .insert(&(tree_id, now, id), &())?;
        tx.open_table(&event_log_by_author::TABLE)?
            .insert(&(author_id, now, id), &())?;
        tx.open_table(&event_log_by_tree_author::TABLE)?
            .insert(&(tree_id, author_id, now, id), &())?;
        Ok(id)
    }

    /// True if any event for `tree_id` (optionally narrowed to `author_id`)
    /// was appended strictly after `since`, with `comment_cdate` matching
    /// the optional `[start, end]` window. Used by the download orchestrator
    /// to decide whether a `VALID` cached report must be invalidated.
    pub fn has_event_after_tx(
        tx: &WriteTransactionCtx,
        tree_id: Option<InstanceId>,
        author_id: Option<UserId>,
        since: Timestamp,
        start: Option<Timestamp>,
        end: Option<Timestamp>,
    ) -> DbResult<bool> {
        let matches = |record: &EventLogRecord| {
            record.e_date > since
                && start.is_none_or(|s| record.comment_cdate >= s)
                && end.is_none_or(|e| record.comment_cdate <= e)
        };

        let log = tx.open_table(&event_log::TABLE)?;

        match (tree_id, author_id) {
            (Some(tree_id), Some(author_id)) => {
                let table = tx.open_table(&event_log_by_tree_author::TABLE)?;
                for entry in table.range(
                    (tree_id, author_id, since, EventLogId::MIN)
                        ..=(tree_id, author_id, Timestamp::MAX, EventLogId::MAX),
                )? {
                    let (_, _, _, id) = entry?.0.value();
                    if let Some(record) = log.get(&id)?.map(|g| g.value()) {
                        if matches(&record) {
                            return Ok(true);
                        }
                    }
                }
                Ok(false)
            }
            (Some(tree_id), None) => {
                let table = tx.open_table(&event_log_by_tree::TABLE)?;
                for entry in
                    table.range((tree_id, since, EventLogId::MIN)..=(tree_id, Timestamp::MAX, EventLogId::MAX))?
                {
                    let (_, _, id) = entry?.0.value();
                    if let Some(record) = log.get(&id)?.map(|g| g.value()) {
                        if matches(&record) {
                            return Ok(true);
                        }
                    }
                }
                Ok(false)
            }
            (None, Some(author_id)) => {
                let table = tx.open_table(&event_log_by_author::TABLE)?;
                for entry in table.range(
                    (author_id, since, EventLogId::MIN)..=(author_id, Timestamp::MAX, EventLogId::MAX),
                )? {
                    let (_, _, id) = entry?.0.value();
                    if let Some(record) = log.get(&id)?.map(|g| g.value()) {
                        if matches(&record) {
                            return Ok(true);
                        }
                    }
                }
                Ok(false)
            }
            (None, None) => {
                for entry in log.range(..)? {
                    let (_, record) = entry?;
                    if matches(&record.value()) {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}
