//! Report cache bookkeeping: resolving/creating a `DlRequest` by its cache
//! key, revalidating it against the event log, and tracking which users
//! have asked for it.

use comments_core::{CommentId, DlRequestId, DlState, InstanceId, Timestamp, UserId};
use rand::Rng as _;
use redb_bincode::ReadableTable as _;

use crate::{
    CommentDoesNotExistSnafu, Database, DbResult, DlRequestDoesNotExistSnafu, DlRequestKey,
    DlRequestRecord, UserDlRequestRecord, WriteTransactionCtx, dl_request, dl_request_by_key,
    user_dl_request, user_dl_request_by_user,
};

/// A fresh opaque blob name. Random enough to avoid collisions within a
/// single store; formatted as hex rather than pulling in a UUID crate since
/// nothing else in this codebase needs RFC-4122 formatting.
fn new_blob_name() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

impl Database {
    pub fn get_dl_request_tx(
        tx: &WriteTransactionCtx,
        id: DlRequestId,
    ) -> DbResult<Option<DlRequestRecord>> {
        let table = tx.open_table(&dl_request::TABLE)?;
        Ok(table.get(&id)?.map(|g| g.value()))
    }

    pub async fn get_dl_request(&self, id: DlRequestId) -> DbResult<Option<DlRequestRecord>> {
        self.read_with(|tx| {
            let table = tx.open_table(&dl_request::TABLE)?;
            Ok(table.get(&id)?.map(|g| g.value()))
        })
        .await
    }

    /// Resolves the tree a download targets, per the same `itype_id == 0`
    /// overload the tree engine uses for replies: `itype_id != 0` names an
    /// Instance subtree, `itype_id == 0` names a Comment subtree. `None` if
    /// `i_id` wasn't given (an author-wide report with no root).
    ///
    /// Used both to validate a download request (§4.6 step 2 — 404 if the
    /// named root doesn't exist) and, during revalidation, to resolve the
    /// `tree_id` an existing `DlRequest` was built against.
    pub fn resolve_dl_request_root_tx(
        tx: &WriteTransactionCtx,
        itype_id: i64,
        i_id: Option<i64>,
    ) -> DbResult<Option<InstanceId>> {
        let Some(i_id) = i_id else {
            return Ok(None);
        };
        if itype_id != 0 {
            let (instance_id, _) = Self::get_instance_tx(tx, itype_id, i_id)?
                .ok_or_else(|| crate::InstanceDoesNotExistSnafu { itype_id, i_id }.build())?;
            Ok(Some(instance_id))
        } else {
            let parent_id = CommentId::new(i_id);
            let comment = Self::get_comment_tx(tx, parent_id)?
                .ok_or_else(|| CommentDoesNotExistSnafu { id: parent_id }.build())?;
            Ok(Some(comment.tree_id))
        }
    }

    /// Resolves the cache entry for `key`, creating it (state `INVALID`,
    /// fresh blob name) if it doesn't exist yet, and ensures a
    /// `UserDlRequest` link for `user_id` exists either way.
    pub fn resolve_or_create_dl_request_tx(
        tx: &WriteTransactionCtx,
        key: DlRequestKey,
        user_id: UserId,
        now: Timestamp,
    ) -> DbResult<(DlRequestId, DlRequestRecord)> {
        let mut by_key = tx.open_table(&dl_request_by_key::TABLE)?;
        let (id, record) = match by_key.get(&key)?.map(|g| g.value()) {
            Some(id) => {
                let record = Self::get_dl_request_tx(tx, id)?.expect("dangling cache index");
                (id, record)
            }
            None => {
                let id = Self::next_dl_request_id_tx(tx)?;
                let record = DlRequestRecord {
                    itype_id: key.itype_id,
                    i_id: none_if_sentinel_i64(key.i_id),
                    author_id: none_if_sentinel_user(key.author_id),
                    start: none_if_sentinel_start(key.start),
                    end: none_if_sentinel_end(key.end),
                    fmt: key.fmt,
                    state: DlState::Invalid,
                    filename: new_blob_name(),
                    created: now,
                };
                tx.open_table(&dl_request::TABLE)?.insert(&id, &record)?;
                by_key.insert(&key, &id)?;
                (id, record)
            }
        };

        Self::link_user_dl_request_tx(tx, user_id, id, now)?;
        Ok((id, record))
    }

    fn link_user_dl_request_tx(
        tx: &WriteTransactionCtx,
        user_id: UserId,
        dlrequest_id: DlRequestId,
        now: Timestamp,
    ) -> DbResult<()> {
        let mut links = tx.open_table(&user_dl_request::TABLE)?;
        if links.get(&(user_id, dlrequest_id))?.is_some() {
            return Ok(());
        }
        let record = UserDlRequestRecord { created: now };
        links.insert(&(user_id, dlrequest_id), &record)?;
        tx.open_table(&user_dl_request_by_user::TABLE)?
            .insert(&(user_id, now, dlrequest_id), &())?;
        Ok(())
    }

    /// Re-checks a `VALID` cache entry against the event log and flips it to
    /// `INVALID` if anything relevant changed since it was built. No-op for
    /// an already-`INVALID` entry.
    pub fn revalidate_dl_request_tx(
        tx: &WriteTransactionCtx,
        id: DlRequestId,
    ) -> DbResult<DlRequestRecord> {
        let mut record =
            Self::get_dl_request_tx(tx, id)?.ok_or_else(|| DlRequestDoesNotExistSnafu { id }.build())?;

        if record.state != DlState::Valid {
            return Ok(record);
        }

        // The root may since have been deleted; that's not an error here,
        // it just widens revalidation to the author/date filters alone.
        let tree_id =
            Self::resolve_dl_request_root_tx(tx, record.itype_id, record.i_id).unwrap_or(None);

        let stale = Self::has_event_after_tx(
            tx,
            tree_id,
            record.author_id,
            record.created,
            record.start,
            record.end,
        )?;

        if stale {
            record.state = DlState::Invalid;
            tx.open_table(&dl_request::TABLE)?.insert(&id, &record)?;
        }

        Ok(record)
    }

    /// Marks a build complete: state `VALID`, `created := now` (the
    /// timestamp subsequent revalidation compares the log against).
    pub fn mark_dl_request_built_tx(
        tx: &WriteTransactionCtx,
        id: DlRequestId,
        now: Timestamp,
    ) -> DbResult<()> {
        let mut table = tx.open_table(&dl_request::TABLE)?;
        let mut record =
            table.get(&id)?.map(|g| g.value()).ok_or_else(|| DlRequestDoesNotExistSnafu { id }.build())?;
        record.state = DlState::Valid;
        record.created = now;
        table.insert(&id, &record)?;
        Ok(())
    }

    /// That user's prior requests, most recently linked first.
    pub async fn get_user_dl_requests(
        &self,
        user_id: UserId,
    ) -> DbResult<Vec<(DlRequestId, DlRequestRecord)>> {
        self.read_with(|tx| {
            let index = tx.open_table(&user_dl_request_by_user::TABLE)?;
            let dl_requests = tx.open_table(&dl_request::TABLE)?;
            let mut out = Vec::new();
            for entry in index.range((user_id, Timestamp::ZERO, DlRequestId::MIN)
                ..=(user_id, Timestamp::MAX, DlRequestId::MAX))?
            {
                let (_, _, id) = entry?.0.value();
                if let Some(record) = dl_requests.get(&id)?.map(|g| g.value()) {
                    out.push((id, record));
                }
            }
            out.reverse();
            Ok(out)
        })
        .await
    }
}

fn none_if_sentinel_i64(v: i64) -> Option<i64> {
    (v != i64::MIN).then_some(v)
}

fn none_if_sentinel_user(v: UserId) -> Option<UserId> {
    (v != UserId::MIN).then_some(v)
}

fn none_if_sentinel_start(v: Timestamp) -> Option<Timestamp> {
    (v != Timestamp::ZERO).then_some(v)
}

fn none_if_sentinel_end(v: Timestamp) -> Option<Timestamp> {
    (v != Timestamp::MAX).then_some(v)
}
