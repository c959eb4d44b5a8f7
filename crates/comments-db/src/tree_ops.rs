//! The Farey/mediant tree engine: insert, update, delete, and the read
//! operations that turn a subtree query into a single ordered range scan.

use comments_core::{CommentId, Frac, InstanceId, Timestamp, UserId};
use redb_bincode::ReadableTable as _;

use crate::{
    CommentDoesNotExistSnafu, CommentRecord, Database, DbResult, InstanceDoesNotExistSnafu,
    InstanceRecord, ParentRef, WriteTransactionCtx, comment, comment_by_parent, comment_by_tree,
    instance, instance_by_key,
};

/// The parent of an about-to-be-inserted (or about-to-be-deleted) node,
/// modeled as a tagged variant over the two things that can hold a mediant
/// base: an [`InstanceRecord`] or a [`CommentRecord`].
pub enum ParentHandle {
    Instance(InstanceRecord),
    Comment(CommentRecord),
}

impl ParentHandle {
    fn lft_ins(&self) -> Frac {
        match self {
            ParentHandle::Instance(i) => i.lft_ins,
            ParentHandle::Comment(c) => c.lft_ins,
        }
    }

    /// The rational a new child's right key is measured against: `1/1` for
    /// an instance root, the parent's own right key for a comment.
    fn reference_right(&self) -> Frac {
        match self {
            ParentHandle::Instance(_) => Frac::ONE,
            ParentHandle::Comment(c) => c.rht,
        }
    }

    fn child_scale(&self) -> u32 {
        match self {
            ParentHandle::Instance(_) => 0,
            ParentHandle::Comment(c) => c.scale + 1,
        }
    }
}

impl Database {
    /// Finds the instance for `(itype_id, i_id)`, creating it (with an empty
    /// mediant base) if this is the first comment targeting it.
    pub fn load_or_create_instance_tx(
        tx: &WriteTransactionCtx,
        itype_id: i64,
        i_id: i64,
    ) -> DbResult<(InstanceId, InstanceRecord)> {
        let mut by_key = tx.open_table(&instance_by_key::TABLE)?;
        if let Some(id) = by_key.get(&(itype_id, i_id))?.map(|g| g.value()) {
            let mut table = tx.open_table(&instance::TABLE)?;
            let record = table.get(&id)?.map(|g| g.value()).expect("dangling index");
            return Ok((id, record));
        }

        let id = Self::next_instance_id_tx(tx)?;
        let record = InstanceRecord {
            itype_id,
            i_id,
            children_cnt: 0,
            lft_ins: Frac::ZERO,
        };
        let mut table = tx.open_table(&instance::TABLE)?;
        table.insert(&id, &record)?;
        by_key.insert(&(itype_id, i_id), &id)?;
        Ok((id, record))
    }

    pub fn get_instance_tx(
        tx: &WriteTransactionCtx,
        itype_id: i64,
        i_id: i64,
    ) -> DbResult<Option<(InstanceId, InstanceRecord)>> {
        let by_key = tx.open_table(&instance_by_key::TABLE)?;
        let Some(id) = by_key.get(&(itype_id, i_id))?.map(|g| g.value()) else {
            return Ok(None);
        };
        let table = tx.open_table(&instance::TABLE)?;
        Ok(table.get(&id)?.map(|g| (id, g.value())))
    }

    pub async fn get_comment(&self, id: CommentId) -> DbResult<Option<CommentRecord>> {
        self.read_with(|tx| {
            let table = tx.open_table(&comment::TABLE)?;
            Ok(table.get(&id)?.map(|g| g.value()))
        })
        .await
    }

    pub fn get_comment_tx(
        tx: &WriteTransactionCtx,
        id: CommentId,
    ) -> DbResult<Option<CommentRecord>> {
        let table = tx.open_table(&comment::TABLE)?;
        Ok(table.get(&id)?.map(|g| g.value()))
    }

    /// Creates a new comment per the §4.3 insert contract: a top-level
    /// comment on an external instance if `itype_id != 0`, or a reply to
    /// comment `i_id` if `itype_id == 0`.
    pub fn insert_comment_tx(
        tx: &WriteTransactionCtx,
        itype_id: i64,
        i_id: i64,
        author_id: UserId,
        content: String,
        now: Timestamp,
    ) -> DbResult<(CommentId, CommentRecord)> {
        let parent = if itype_id != 0 {
            let (instance_id, record) = Self::load_or_create_instance_tx(tx, itype_id, i_id)?;
            (ParentHandle::Instance(record), instance_id, None)
        } else {
            let parent_id = CommentId::new(i_id);
            let parent = Self::get_comment_tx(tx, parent_id)?
                .ok_or_else(|| CommentDoesNotExistSnafu { id: parent_id }.build())?;
            let tree_id = parent.tree_id;
            (ParentHandle::Comment(parent), tree_id, Some(parent_id))
        };
        let (parent_handle, tree_id, parent_id) = parent;

        let lft = parent_handle.lft_ins();
        let med = lft.mediant(parent_handle.reference_right());
        let scale = parent_handle.child_scale();

        let id = Self::next_comment_id_tx(tx)?;
        let record = CommentRecord {
            itype_id,
            i_id,
            author_id,
            content,
            created: now,
            updated: now,
            tree_id,
            parent_id,
            children_cnt: 0,
            scale,
            lft,
            rht: med,
            lft_ins: lft,
        };

        let mut comment_table = tx.open_table(&comment::TABLE)?;
        comment_table.insert(&id, &record)?;
        drop(comment_table);

        let mut by_tree = tx.open_table(&comment_by_tree::TABLE)?;
        by_tree.insert(&(tree_id, lft.order_key(), id), &())?;
        drop(by_tree);

        let parent_ref = match parent_id {
            Some(pid) => ParentRef::Comment(pid),
            None => ParentRef::Instance(tree_id),
        };
        let mut by_parent = tx.open_table(&comment_by_parent::TABLE)?;
        by_parent.insert(&(parent_ref, lft.order_key(), id), &())?;
        drop(by_parent);

        // Advance the parent's mediant base and direct-child count.
        match parent_handle {
            ParentHandle::Instance(mut i) => {
                i.lft_ins = med;
                i.children_cnt += 1;
                tx.open_table(&instance::TABLE)?.insert(&tree_id, &i)?;
            }
            ParentHandle::Comment(mut c) => {
                let pid = parent_id.expect("comment parent always has an id");
                c.lft_ins = med;
                c.children_cnt += 1;
                tx.open_table(&comment::TABLE)?.insert(&pid, &c)?;
            }
        }

        Ok((id, record))
    }

    /// Content/`updated` only; ordering keys are immutable.
    pub fn update_comment_content_tx(
        tx: &WriteTransactionCtx,
        id: CommentId,
        content: String,
        now: Timestamp,
    ) -> DbResult<CommentRecord> {
        let mut table = tx.open_table(&comment::TABLE)?;
        let mut record = table
            .get(&id)?
            .map(|g| g.value())
            .ok_or_else(|| CommentDoesNotExistSnafu { id }.build())?;
        record.content = content;
        record.updated = now;
        table.insert(&id, &record)?;
        Ok(record)
    }

    /// Deletes the branch rooted at `id`: all rows in the same tree with
    /// `lft` in `[self.lft, self.rht)` and `scale >= self.scale`. Returns the
    /// number of rows removed. The "only leaves may be deleted" policy is
    /// enforced by the caller (the HTTP layer); the engine itself must
    /// support deleting a whole branch for author-initiated removals.
    pub fn delete_branch_tx(tx: &WriteTransactionCtx, id: CommentId) -> DbResult<u64> {
        let root = Self::get_comment_tx(tx, id)?.ok_or_else(|| CommentDoesNotExistSnafu { id }.build())?;

        // Roll back the parent's mediant base if this was its most recent
        // child, and decrement its direct-child count regardless.
        match root.parent_id {
            Some(parent_id) => {
                let mut table = tx.open_table(&comment::TABLE)?;
                let mut parent = table
                    .get(&parent_id)?
                    .map(|g| g.value())
                    .ok_or_else(|| CommentDoesNotExistSnafu { id: parent_id }.build())?;
                if root.rht.cmp_exact(parent.lft_ins) == std::cmp::Ordering::Equal {
                    parent.lft_ins = root.lft;
                }
                parent.children_cnt = parent.children_cnt.saturating_sub(1);
                table.insert(&parent_id, &parent)?;
            }
            None => {
                let mut table = tx.open_table(&instance::TABLE)?;
                let mut inst = table
                    .get(&root.tree_id)?
                    .map(|g| g.value())
                    .expect("comment references an existing instance");
                if root.rht.cmp_exact(inst.lft_ins) == std::cmp::Ordering::Equal {
                    inst.lft_ins = root.lft;
                }
                inst.children_cnt = inst.children_cnt.saturating_sub(1);
                table.insert(&root.tree_id, &inst)?;
            }
        }

        // Collect every row in [lft, rht) with scale >= root.scale, in the
        // same tree, then remove it from all three tables (primary +
        // both indexes).
        let victims = Self::scan_tree_tx(tx, root.tree_id, |c| {
            root.scale <= c.scale && root.lft.le(c.lft) && c.lft.lt(root.rht)
        })?;

        let mut comment_table = tx.open_table(&comment::TABLE)?;
        let mut by_tree = tx.open_table(&comment_by_tree::TABLE)?;
        let mut by_parent = tx.open_table(&comment_by_parent::TABLE)?;
        let mut removed = 0u64;
        for (victim_id, victim) in &victims {
            comment_table.remove(victim_id)?;
            by_tree.remove(&(root.tree_id, victim.lft.order_key(), *victim_id))?;
            by_parent.remove(&(victim.parent_ref(), victim.lft.order_key(), *victim_id))?;
            removed += 1;
        }

        Ok(removed)
    }

    /// Scans every row of `tree_id` (ordered by `order_key`, which is only
    /// an approximation of the exact `lft` order) and keeps the ones
    /// `predicate` accepts after checking the exact fraction. This is the
    /// "single indexed range scan" the engine reduces subtree queries to:
    /// the index narrows the scan to one tree, the predicate does the exact
    /// containment check.
    fn scan_tree_tx(
        tx: &WriteTransactionCtx,
        tree_id: InstanceId,
        predicate: impl Fn(&CommentRecord) -> bool,
    ) -> DbResult<Vec<(CommentId, CommentRecord)>> {
        let by_tree = tx.open_table(&comment_by_tree::TABLE)?;
        let comment_table = tx.open_table(&comment::TABLE)?;
        let mut out = Vec::new();
        for entry in by_tree.range((tree_id, u128::MIN, CommentId::MIN)..=(tree_id, u128::MAX, CommentId::MAX))? {
            let (_, _, id) = entry?.0.value();
            let Some(record) = comment_table.get(&id)?.map(|g| g.value()) else {
                continue;
            };
            if predicate(&record) {
                out.push((id, record));
            }
        }
        out.sort_by(|(_, a), (_, b)| a.lft.cmp_exact(b.lft).then(a.scale.cmp(&b.scale)));
        Ok(out)
    }

    /// Every comment in the store matching `author_id` (and, if given, a
    /// `[start, end]` window on `created`), `ORDER BY created`. Used by the
    /// report builder for an author-wide download with no instance/comment
    /// root — there is no tree-scoped index to narrow this to, so it is a
    /// full table scan; acceptable at this system's scale.
    pub async fn comments_by_author(
        &self,
        author_id: UserId,
        start: Option<Timestamp>,
        end: Option<Timestamp>,
    ) -> DbResult<Vec<(CommentId, CommentRecord)>> {
        self.read_with(|tx| {
            let table = tx.open_table(&comment::TABLE)?;
            let mut out = Vec::new();
            for entry in table.range(..)? {
                let (id, record) = entry?;
                let (id, record) = (id.value(), record.value());
                if record.author_id != author_id {
                    continue;
                }
                if start.is_some_or(|s| record.created < s) {
                    continue;
                }
                if end.is_some_or(|e| record.created > e) {
                    continue;
                }
                out.push((id, record));
            }
            out.sort_by_key(|(_, r)| r.created);
            Ok(out)
        })
        .await
    }

    /// Subtree of an instance: every row of its tree, `ORDER BY lft, scale`.
    pub async fn subtree_of_instance(
        &self,
        itype_id: i64,
        i_id: i64,
    ) -> DbResult<Vec<(CommentId, CommentRecord)>> {
        self.write_with(|tx| {
            let (instance_id, _) = Self::get_instance_tx(tx, itype_id, i_id)?
                .ok_or_else(|| InstanceDoesNotExistSnafu { itype_id, i_id }.build())?;
            Self::scan_tree_tx(tx, instance_id, |_| true)
        })
        .await
    }

    /// Subtree of a comment: its transitive descendants, `ORDER BY lft,
    /// scale`, not including the comment itself.
    pub async fn subtree_of_comment(
        &self,
        id: CommentId,
    ) -> DbResult<Vec<(CommentId, CommentRecord)>> {
        self.write_with(|tx| {
            let root =
                Self::get_comment_tx(tx, id)?.ok_or_else(|| CommentDoesNotExistSnafu { id }.build())?;
            Self::scan_tree_tx(tx, root.tree_id, |c| {
                root.scale < c.scale && root.lft.le(c.lft) && c.lft.lt(root.rht)
            })
        })
        .await
    }

    /// Direct children of an instance (`parent_id IS NULL`), `ORDER BY lft`,
    /// optionally paginated by `last_id`/`limit`.
    pub async fn children_of_instance(
        &self,
        itype_id: i64,
        i_id: i64,
        last_id: Option<CommentId>,
        limit: Option<usize>,
    ) -> DbResult<Vec<(CommentId, CommentRecord)>> {
        self.write_with(|tx| {
            let (instance_id, _) = Self::get_instance_tx(tx, itype_id, i_id)?
                .ok_or_else(|| InstanceDoesNotExistSnafu { itype_id, i_id }.build())?;
            Self::children_of_parent_tx(tx, ParentRef::Instance(instance_id), last_id, limit)
        })
        .await
    }

    /// Direct children of a comment, `ORDER BY lft`, optionally paginated.
    pub async fn children_of_comment(
        &self,
        id: CommentId,
        last_id: Option<CommentId>,
        limit: Option<usize>,
    ) -> DbResult<Vec<(CommentId, CommentRecord)>> {
        self.write_with(|tx| {
            Self::children_of_parent_tx(tx, ParentRef::Comment(id), last_id, limit)
        })
        .await
    }

    fn children_of_parent_tx(
        tx: &WriteTransactionCtx,
        parent: ParentRef,
        last_id: Option<CommentId>,
        limit: Option<usize>,
    ) -> DbResult<Vec<(CommentId, CommentRecord)>> {
        let by_parent = tx.open_table(&comment_by_parent::TABLE)?;
        let comment_table = tx.open_table(&comment::TABLE)?;

        let cursor_lft = match last_id {
            Some(last) => {
                let last_record = comment_table
                    .get(&last)?
                    .map(|g| g.value())
                    .ok_or_else(|| CommentDoesNotExistSnafu { id: last }.build())?;
                Some(last_record.lft)
            }
            None => None,
        };

        let mut out = Vec::new();
        for entry in by_parent.range((parent, u128::MIN, CommentId::MIN)..=(parent, u128::MAX, CommentId::MAX))? {
            let (_, _, id) = entry?.0.value();
            let Some(record) = comment_table.get(&id)?.map(|g| g.value()) else {
                continue;
            };
            if let Some(cursor) = cursor_lft {
                if !cursor.lt(record.lft) {
                    continue;
                }
            }
            out.push((id, record));
        }
        out.sort_by(|(_, a), (_, b)| a.lft.cmp_exact(b.lft));
        if let Some(limit) = limit {
            out.truncate(limit);
        }
        Ok(out)
    }
}
