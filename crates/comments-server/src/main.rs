mod cli;

use std::io;

use clap::Parser;
use cli::Opts;
use comments_db::{Database, DbError};
use comments_report::{BlobStore, BlobStoreError, ReportBuilder};
use comments_web::{Server, WebServerError};
use snafu::{FromString, ResultExt, Snafu, Whatever};
use tracing::level_filters::LevelFilter;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub const LOG_TARGET: &str = "comments::cli";

type WhateverResult<T> = std::result::Result<T, Whatever>;

#[derive(Debug, Snafu)]
pub enum CliError {
    #[snafu(display("Data dir error: {source}"))]
    DataDir { source: io::Error },
    #[snafu(display("Database error: {source}"))]
    Database { source: DbError },
    #[snafu(display("Blob store error: {source}"))]
    Blob { source: BlobStoreError },
    #[snafu(display("Web server error: {source}"))]
    WebServer { source: WebServerError },
    #[snafu(display("Miscellaneous error: {source}"))]
    Whatever { source: Whatever },
}

pub type CliResult<T> = std::result::Result<T, CliError>;

#[snafu::report]
#[tokio::main]
async fn main() -> CliResult<()> {
    init_logging().context(WhateverSnafu)?;

    let opts = Opts::parse();

    tokio::fs::create_dir_all(opts.data_dir())
        .await
        .context(DataDirSnafu)?;

    let db = std::sync::Arc::new(Database::open(opts.db_path()).await.context(DatabaseSnafu)?);
    let blobs = BlobStore::open(opts.blob_dir()).await.context(BlobSnafu)?;

    let builder = ReportBuilder::with_capacity(db.clone(), blobs.clone(), opts.builder_capacity);
    let builder_handle = {
        let builder = builder.clone();
        tokio::spawn(async move { builder.run().await })
    };

    let web_opts = comments_web::Opts::new(opts.listen.clone(), opts.cors_origin.clone(), opts.reuseport);
    let server = Server::init(web_opts, db, blobs).await.context(WebServerSnafu)?;

    info!(target: LOG_TARGET, addr = %server.addr().context(WebServerSnafu)?, "Comments service starting");

    server.run().await.context(WebServerSnafu)?;

    builder.stop();
    let _ = builder_handle.await;

    Ok(())
}

pub fn init_logging() -> WhateverResult<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .try_init()
        .map_err(|_| Whatever::without_source("Failed to initialize logging".to_string()))?;

    Ok(())
}
