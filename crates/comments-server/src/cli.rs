use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use clap::Parser;

/// Command line options for the comments service.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Opts {
    /// Directory holding the embedded database and the report blob store.
    #[arg(long, env = "COMMENTS_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Listen address.
    #[arg(long, short, default_value = "127.0.0.1:3737", env = "COMMENTS_LISTEN")]
    pub listen: String,

    /// Set SO_REUSEPORT.
    #[arg(long, env = "COMMENTS_REUSEPORT", default_value = "false")]
    pub reuseport: bool,

    /// Allowed CORS origin. Defaults to the listen address.
    #[arg(long, env = "COMMENTS_CORS_ORIGIN", alias = "origin")]
    pub cors_origin: Option<String>,

    /// Maximum number of report builds the background consumer runs
    /// concurrently.
    #[arg(long, env = "COMMENTS_BUILDER_CAPACITY", default_value = "3")]
    pub builder_capacity: usize,
}

static PROJECT_DIRS: LazyLock<directories::ProjectDirs> = LazyLock::new(|| {
    directories::ProjectDirs::from("org", "Comments", "comments")
        .expect("Unable to determine project's dir")
});

impl Opts {
    pub fn data_dir(&self) -> &Path {
        self.data_dir
            .as_deref()
            .unwrap_or_else(|| PROJECT_DIRS.data_local_dir())
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir().join("comments.redb")
    }

    pub fn blob_dir(&self) -> PathBuf {
        self.data_dir().join("reports")
    }
}
