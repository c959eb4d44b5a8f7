//! Embedded storage for the comments service: the five tables of §3 plus the
//! secondary indexes the tree engine, event log, and report cache need for
//! their range scans.
//!
//! Built on `redb`/`redb-bincode` the same way the teacher's client store
//! is: a thin [`Database`] wrapper around transactions, a
//! [`WriteTransactionCtx`] that lets a mutation queue up post-commit hooks,
//! and a `snafu`-based [`DbError`].

mod dl_request_ops;
mod event_log_ops;
mod id_alloc;
mod table_ops;
mod tables;
mod tree_ops;

use std::ops;
use std::path::{Path, PathBuf};

use redb_bincode::{ReadTransaction, WriteTransaction};
use snafu::{Location, ResultExt as _, Snafu};
use tracing::{debug, info, instrument};

pub use self::tables::*;
pub use self::tree_ops::ParentHandle;

const LOG_TARGET: &str = "comments::db";

/// Current schema version. Bumped whenever table layout changes.
const DB_VER: u64 = 1;

pub struct WriteTransactionCtx {
    dbtx: WriteTransaction,
    on_commit: std::sync::Mutex<Vec<Box<dyn FnOnce() + 'static>>>,
}

impl From<WriteTransaction> for WriteTransactionCtx {
    fn from(dbtx: WriteTransaction) -> Self {
        Self {
            dbtx,
            on_commit: std::sync::Mutex::new(vec![]),
        }
    }
}

impl ops::Deref for WriteTransactionCtx {
    type Target = WriteTransaction;

    fn deref(&self) -> &Self::Target {
        &self.dbtx
    }
}

impl ops::DerefMut for WriteTransactionCtx {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.dbtx
    }
}

impl WriteTransactionCtx {
    /// Registers a closure to run after a successful commit — used to
    /// publish pub/sub notifications only once the mutation they describe
    /// is actually durable.
    pub fn on_commit(&self, f: impl FnOnce() + 'static) {
        self.on_commit
            .lock()
            .expect("poisoned")
            .push(Box::new(f));
    }

    fn commit(self) -> Result<(), redb::CommitError> {
        let Self { dbtx, on_commit } = self;
        dbtx.commit()?;
        for hook in on_commit.lock().expect("poisoned").drain(..) {
            hook();
        }
        Ok(())
    }
}

#[derive(Debug, Snafu)]
pub enum TableDumpError {
    #[snafu(display("Unknown table `{name}`"))]
    UnknownTable { name: String },
}
pub type TableDumpResult<T> = std::result::Result<T, TableDumpError>;

#[derive(Debug, Snafu)]
pub enum DbError {
    Database {
        source: redb::DatabaseError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(transparent)]
    Table {
        source: redb::TableError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(transparent)]
    Storage {
        source: redb::StorageError,
        #[snafu(implicit)]
        location: Location,
    },
    Transaction {
        #[snafu(source(from(redb::TransactionError, Box::new)))]
        source: Box<redb::TransactionError>,
        #[snafu(implicit)]
        location: Location,
    },
    Commit {
        source: redb::CommitError,
        #[snafu(implicit)]
        location: Location,
    },
    DbVersionTooHigh {
        db_ver: u64,
        code_ver: u64,
        #[snafu(implicit)]
        location: Location,
    },
    Join {
        source: tokio::task::JoinError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(visibility(pub))]
    #[snafu(display("Instance {itype_id}/{i_id} does not exist"))]
    InstanceDoesNotExist {
        itype_id: i64,
        i_id: i64,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(visibility(pub))]
    #[snafu(display("Comment {id} does not exist"))]
    CommentDoesNotExist {
        id: comments_core::CommentId,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(visibility(pub))]
    #[snafu(display("DlRequest {id} does not exist"))]
    DlRequestDoesNotExist {
        id: comments_core::DlRequestId,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(visibility(pub))]
    #[snafu(display("Comment {id} still has {children_cnt} children"))]
    CommentHasChildren {
        id: comments_core::CommentId,
        children_cnt: u64,
        #[snafu(implicit)]
        location: Location,
    },
}
pub type DbResult<T> = std::result::Result<T, DbError>;

#[derive(Debug)]
pub struct Database {
    inner: redb_bincode::Database,
}

impl Database {
    pub async fn new_in_memory() -> DbResult<Database> {
        debug!(target: LOG_TARGET, "Opening in-memory database");
        let inner = redb::Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())
            .context(DatabaseSnafu)?;
        Self::open_inner(inner).await
    }

    pub async fn open(path: impl Into<PathBuf>) -> DbResult<Database> {
        let path: PathBuf = path.into();
        debug!(target: LOG_TARGET, path = %path.display(), "Opening database");

        let inner = tokio::task::spawn_blocking(move || redb::Database::create(path))
            .await
            .context(JoinSnafu)?
            .context(DatabaseSnafu)?;

        Self::open_inner(inner).await
    }

    #[instrument(skip_all)]
    async fn open_inner(inner: redb::Database) -> DbResult<Database> {
        let inner = redb_bincode::Database::from(inner);

        Self::write_with_inner(&inner, |tx| {
            Self::init_tables_tx(tx)?;
            Self::handle_db_ver_migrations(tx)?;
            Ok(())
        })
        .await?;

        Ok(Self { inner })
    }

    fn init_tables_tx(tx: &WriteTransactionCtx) -> DbResult<()> {
        tx.open_table(&db_version::TABLE)?;
        tx.open_table(&id_counters::TABLE)?;

        tx.open_table(&instance::TABLE)?;
        tx.open_table(&instance_by_key::TABLE)?;

        tx.open_table(&comment::TABLE)?;
        tx.open_table(&comment_by_tree::TABLE)?;
        tx.open_table(&comment_by_parent::TABLE)?;

        tx.open_table(&event_log::TABLE)?;
        tx.open_table(&event_log_by_tree::TABLE)?;
        tx.open_table(&event_log_by_author::TABLE)?;
        tx.open_table(&event_log_by_tree_author::TABLE)?;

        tx.open_table(&dl_request::TABLE)?;
        tx.open_table(&dl_request_by_key::TABLE)?;

        tx.open_table(&user_dl_request::TABLE)?;
        tx.open_table(&user_dl_request_by_user::TABLE)?;
        Ok(())
    }

    fn handle_db_ver_migrations(dbtx: &WriteTransactionCtx) -> DbResult<()> {
        let mut table_db_ver = dbtx.open_table(&db_version::TABLE)?;

        let Some(cur_db_ver) = table_db_ver.first()?.map(|g| g.1.value()) else {
            info!(target: LOG_TARGET, "Initializing new database");
            table_db_ver.insert(&(), &DB_VER)?;
            return Ok(());
        };

        if DB_VER < cur_db_ver {
            return DbVersionTooHighSnafu {
                db_ver: cur_db_ver,
                code_ver: DB_VER,
            }
            .fail();
        }

        if cur_db_ver < DB_VER {
            info!(target: LOG_TARGET, from_ver = cur_db_ver, to_ver = DB_VER, "Migrating database");
            drop(table_db_ver);
            let mut table_db_ver = dbtx.open_table(&db_version::TABLE)?;
            table_db_ver.insert(&(), &DB_VER)?;
        }

        Ok(())
    }

    pub async fn dump_table(&self, name: &str) -> TableDumpResult<()> {
        self.read_with(|tx| {
            match name {
                "instance" => Self::dump_table_dbtx(tx, &tables::instance::TABLE)?,
                "comment" => Self::dump_table_dbtx(tx, &tables::comment::TABLE)?,
                "event_log" => Self::dump_table_dbtx(tx, &tables::event_log::TABLE)?,
                "dl_request" => Self::dump_table_dbtx(tx, &tables::dl_request::TABLE)?,
                "user_dl_request" => {
                    Self::dump_table_dbtx(tx, &tables::user_dl_request::TABLE)?
                }
                _ => {
                    return Ok(Err(UnknownTableSnafu {
                        name: name.to_string(),
                    }
                    .build()));
                }
            }
            Ok(Ok(()))
        })
        .await
        .expect("Database panic")
    }
}

impl Database {
    pub async fn write_with_inner<T>(
        inner: &redb_bincode::Database,
        f: impl FnOnce(&'_ WriteTransactionCtx) -> DbResult<T>,
    ) -> DbResult<T> {
        tokio::task::block_in_place(|| {
            let dbtx = WriteTransactionCtx::from(inner.begin_write().context(TransactionSnafu)?);
            let res = f(&dbtx)?;
            dbtx.commit().context(CommitSnafu)?;
            Ok(res)
        })
    }

    pub async fn write_with<T>(
        &self,
        f: impl FnOnce(&'_ WriteTransactionCtx) -> DbResult<T>,
    ) -> DbResult<T> {
        Self::write_with_inner(&self.inner, f).await
    }

    pub async fn read_with_inner<T>(
        inner: &redb_bincode::Database,
        f: impl FnOnce(&'_ ReadTransaction) -> DbResult<T>,
    ) -> DbResult<T> {
        tokio::task::block_in_place(|| {
            let dbtx = inner.begin_read().context(TransactionSnafu)?;
            f(&dbtx)
        })
    }

    pub async fn read_with<T>(
        &self,
        f: impl FnOnce(&'_ ReadTransaction) -> DbResult<T>,
    ) -> DbResult<T> {
        Self::read_with_inner(&self.inner, f).await
    }
}

#[cfg(test)]
mod tests;
