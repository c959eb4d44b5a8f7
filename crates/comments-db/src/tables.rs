//! Table definitions for the comments store.
//!
//! Five logical entities per the data model: `instance`, `comment`,
//! `event_log`, `dl_request`, `user_dl_request`. Each gets a primary table
//! keyed by its own id, plus secondary index tables that give range scans
//! ordered the way the read operations in [`crate::tree_ops`] and
//! [`crate::event_log_ops`] need them.
//!
//! Every index keyed by tree position carries [`Frac::order_key`] as its
//! sortable component rather than the exact `(num, den)` pair: `order_key` is
//! a monotonic approximation good enough to *order* a scan, but every
//! containment check (is this row actually inside `[L, R)`?) is re-verified
//! against the exact fraction stored on the row itself. See
//! `comments-core::ratio` and `DESIGN.md` for why.

use bincode::{Decode, Encode};
use comments_core::{CommentId, DlFormat, DlState, EventType, Frac, InstanceId, Timestamp, UserId};
use serde::Serialize;

#[macro_export]
macro_rules! def_table {
    ($(#[$outer:meta])*
        $name:ident : $k:ty => $v:ty) => {
        #[allow(unused)]
        $(#[$outer])*
        pub mod $name {
            use super::*;
            pub type Key = $k;
            pub type Value = $v;
            pub type Definition<'a> = redb_bincode::TableDefinition<'a, Key, Value>;
            pub trait ReadableTable: redb_bincode::ReadableTable<Key, Value> {}
            impl<RT> ReadableTable for RT where RT: redb_bincode::ReadableTable<Key, Value> {}
            pub type Table<'a> = redb_bincode::Table<'a, Key, Value>;
            pub const TABLE: Definition = redb_bincode::TableDefinition::new(stringify!($name));
        }
    };
}

// ============================================================================
// SYSTEM TABLES
// ============================================================================

def_table! {
    /// Tracks schema version for migrations.
    db_version: () => u64
}

def_table! {
    /// Monotonic id counters, one row per entity kind, used in place of a
    /// `BIGSERIAL`/`RETURNING` auto-increment column.
    id_counters: IdCounterKey => i64
}

#[derive(Debug, Encode, Decode, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdCounterKey {
    Instance,
    Comment,
    EventLog,
    DlRequest,
}

// ============================================================================
// INSTANCE
// ============================================================================

def_table! {
    /// The synthetic root of a tree, anchored to an external `(itype_id,
    /// i_id)` pair.
    instance: InstanceId => InstanceRecord
}

def_table! {
    /// Unique index on `(itype_id, i_id)`, used to look up or lazily create
    /// an instance for an incoming top-level comment.
    instance_by_key: (i64, i64) => InstanceId
}

#[derive(Debug, Encode, Decode, Serialize, Clone, Copy)]
pub struct InstanceRecord {
    pub itype_id: i64,
    pub i_id: i64,
    pub children_cnt: u64,
    /// Mediant base (`M`) from which the next top-level child is inserted.
    /// The instance's own right key is implicitly `1/1`.
    pub lft_ins: Frac,
}

// ============================================================================
// COMMENT
// ============================================================================

def_table! {
    comment: CommentId => CommentRecord
}

def_table! {
    /// Every row of a tree, ordered for a subtree scan: `(tree_id,
    /// order_key(lft), comment_id)`. [`crate::tree_ops`] always re-checks
    /// `[L, R)` containment against the exact fraction before trusting a row
    /// returned by a scan over this index.
    comment_by_tree: (InstanceId, u128, CommentId) => ()
}

def_table! {
    /// Direct children of a parent, ordered by insertion (`L` ascending):
    /// `(parent, order_key(lft), comment_id)`.
    comment_by_parent: (ParentRef, u128, CommentId) => ()
}

/// Either an instance or a comment acting as the parent of a node, used as
/// the index key for direct-children scans.
#[derive(Debug, Encode, Decode, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParentRef {
    Instance(InstanceId),
    Comment(CommentId),
}

#[derive(Debug, Encode, Decode, Serialize, Clone)]
pub struct CommentRecord {
    pub itype_id: i64,
    pub i_id: i64,
    pub author_id: UserId,
    pub content: String,
    pub created: Timestamp,
    pub updated: Timestamp,
    pub tree_id: InstanceId,
    pub parent_id: Option<CommentId>,
    pub children_cnt: u64,
    pub scale: u32,
    pub lft: Frac,
    pub rht: Frac,
    /// Mediant base (`M`) from which this node's next child is inserted.
    pub lft_ins: Frac,
}

impl CommentRecord {
    pub fn parent_ref(&self) -> ParentRef {
        match self.parent_id {
            Some(id) => ParentRef::Comment(id),
            None => ParentRef::Instance(self.tree_id),
        }
    }
}

// ============================================================================
// EVENT LOG
// ============================================================================

def_table! {
    event_log: comments_core::EventLogId => EventLogRecord
}

def_table! {
    /// `(tree_id, e_date, id)` — "any event in this tree more recent than X".
    event_log_by_tree: (InstanceId, Timestamp, comments_core::EventLogId) => ()
}

def_table! {
    /// `(author_id, e_date, id)` — "any event by this author more recent
    /// than X".
    event_log_by_author: (UserId, Timestamp, comments_core::EventLogId) => ()
}

def_table! {
    /// `(tree_id, author_id, e_date, id)` — the combined filter the
    /// cache-revalidation query in §4.6 actually needs when both a root and
    /// an author are set.
    event_log_by_tree_author: (InstanceId, UserId, Timestamp, comments_core::EventLogId) => ()
}

#[derive(Debug, Encode, Decode, Serialize, Clone, Copy)]
pub struct EventLogRecord {
    pub user_id: UserId,
    pub tree_id: InstanceId,
    pub author_id: UserId,
    pub comment_id: CommentId,
    pub comment_cdate: Timestamp,
    pub e_type: EventType,
    pub e_date: Timestamp,
}

// ============================================================================
// DL REQUEST
// ============================================================================

def_table! {
    dl_request: comments_core::DlRequestId => DlRequestRecord
}

def_table! {
    /// Unique cache-key index. `author_id`/`start`/`end` are normalized to
    /// sentinel values rather than relying on the store's `NULL` comparison
    /// semantics (see `DESIGN.md`, open question on the cache unique key).
    dl_request_by_key: DlRequestKey => comments_core::DlRequestId
}

/// Normalized, fully-comparable cache key — `None` is mapped to a sentinel
/// rather than left as `NULL`, so the key is `Eq + Hash`/`Ord` regardless of
/// platform NULL-comparison semantics.
#[derive(Debug, Encode, Decode, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DlRequestKey {
    pub itype_id: i64,
    /// `i64::MIN` stands in for "no i_id" (report spans the whole author).
    pub i_id: i64,
    /// `UserId::MIN` stands in for "no author filter".
    pub author_id: UserId,
    /// `Timestamp::ZERO` stands in for "no start bound".
    pub start: Timestamp,
    /// `Timestamp::MAX` stands in for "no end bound".
    pub end: Timestamp,
    pub fmt: DlFormat,
}

impl DlRequestKey {
    pub fn new(
        itype_id: i64,
        i_id: Option<i64>,
        author_id: Option<UserId>,
        start: Option<Timestamp>,
        end: Option<Timestamp>,
        fmt: DlFormat,
    ) -> Self {
        Self {
            itype_id,
            i_id: i_id.unwrap_or(i64::MIN),
            author_id: author_id.unwrap_or(UserId::MIN),
            start: start.unwrap_or(Timestamp::ZERO),
            end: end.unwrap_or(Timestamp::MAX),
            fmt,
        }
    }
}

#[derive(Debug, Encode, Decode, Serialize, Clone)]
pub struct DlRequestRecord {
    pub itype_id: i64,
    pub i_id: Option<i64>,
    pub author_id: Option<UserId>,
    pub start: Option<Timestamp>,
    pub end: Option<Timestamp>,
    pub fmt: DlFormat,
    pub state: DlState,
    /// Opaque blob name (a UUID) the report builder writes to and the
    /// download handler streams from.
    pub filename: String,
    pub created: Timestamp,
}

impl DlRequestRecord {
    pub fn cache_key(&self) -> DlRequestKey {
        DlRequestKey::new(
            self.itype_id,
            self.i_id,
            self.author_id,
            self.start,
            self.end,
            self.fmt,
        )
    }
}

// ============================================================================
// USER DL REQUEST
// ============================================================================

def_table! {
    /// Many-to-many link, unique on `(user_id, dlrequest_id)`.
    user_dl_request: (UserId, comments_core::DlRequestId) => UserDlRequestRecord
}

def_table! {
    /// `(user_id, created, dlrequest_id)` — listing a user's prior requests
    /// ordered by link creation time, descending.
    user_dl_request_by_user: (UserId, Timestamp, comments_core::DlRequestId) => ()
}

#[derive(Debug, Encode, Decode, Serialize, Clone, Copy)]
pub struct UserDlRequestRecord {
    pub created: Timestamp,
}
