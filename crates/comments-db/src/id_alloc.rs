//! Monotonic id allocation, filling in for a `BIGSERIAL`/`RETURNING`
//! auto-increment column on top of a plain key-value store.

use comments_core::{CommentId, DlRequestId, EventLogId, InstanceId};

use crate::{Database, DbResult, IdCounterKey, WriteTransactionCtx, id_counters};

impl Database {
    fn next_id_tx(tx: &WriteTransactionCtx, key: IdCounterKey) -> DbResult<i64> {
        let mut table = tx.open_table(&id_counters::TABLE)?;
        let next = table.get(&key)?.map(|g| g.value()).unwrap_or(0) + 1;
        table.insert(&key, &next)?;
        Ok(next)
    }

    pub(crate) fn next_instance_id_tx(tx: &WriteTransactionCtx) -> DbResult<InstanceId> {
        Self::next_id_tx(tx, IdCounterKey::Instance).map(InstanceId::new)
    }

    pub(crate) fn next_comment_id_tx(tx: &WriteTransactionCtx) -> DbResult<CommentId> {
        Self::next_id_tx(tx, IdCounterKey::Comment).map(CommentId::new)
    }

    pub(crate) fn next_event_log_id_tx(tx: &WriteTransactionCtx) -> DbResult<EventLogId> {
        Self::next_id_tx(tx, IdCounterKey::EventLog).map(EventLogId::new)
    }

    pub(crate) fn next_dl_request_id_tx(tx: &WriteTransactionCtx) -> DbResult<DlRequestId> {
        Self::next_id_tx(tx, IdCounterKey::DlRequest).map(DlRequestId::new)
    }
}
