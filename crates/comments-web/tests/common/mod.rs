#![allow(dead_code)]

use std::sync::Arc;

use comments_db::Database;
use comments_report::{BlobStore, ReportBuilder};
use comments_web::{Opts, Server};
use tempfile::TempDir;

/// A comments-web server bound to a random port, backed by an in-memory
/// `redb` database and a blob store under a temp dir, with its report
/// builder running in the background — everything `comments-server::main`
/// wires up, minus the CLI and persistent storage.
pub struct TestServer {
    base_url: String,
    builder: Arc<ReportBuilder>,
    builder_task: tokio::task::JoinHandle<()>,
    server_task: tokio::task::JoinHandle<()>,
    _temp_dir: TempDir,
}

impl TestServer {
    pub async fn start() -> Self {
        let db = Arc::new(Database::new_in_memory().await.expect("open in-memory db"));
        let temp_dir = TempDir::new().expect("create temp dir");
        let blobs = BlobStore::open(temp_dir.path())
            .await
            .expect("open blob store");

        let builder = ReportBuilder::with_capacity(db.clone(), blobs.clone(), 3);
        let builder_task = {
            let builder = builder.clone();
            tokio::spawn(async move { builder.run().await })
        };

        let opts = Opts::new("127.0.0.1:0".to_string(), None, false);
        let server = Server::init(opts, db, blobs).await.expect("init server");
        let base_url = format!("http://{}", server.addr().expect("server addr"));
        let server_task = tokio::spawn(async move {
            let _ = server.run().await;
        });

        Self {
            base_url,
            builder,
            builder_task,
            server_task,
            _temp_dir: temp_dir,
        }
    }

    pub fn driver(&self) -> ApiDriver {
        ApiDriver::new(self.base_url.clone())
    }

    /// Stops the report builder and aborts the listening task. Tests don't
    /// need a graceful HTTP shutdown since each gets its own ephemeral port.
    pub async fn shutdown(self) {
        self.builder.stop();
        let _ = self.builder_task.await;
        self.server_task.abort();
    }
}

/// Thin `reqwest` wrapper over the JSON API.
pub struct ApiDriver {
    client: reqwest::Client,
    base_url: String,
}

impl ApiDriver {
    fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client.get(self.url(path)).send().await.expect("GET request failed")
    }

    pub async fn put_json(&self, path: &str, body: &serde_json::Value) -> reqwest::Response {
        self.client
            .put(self.url(path))
            .json(body)
            .send()
            .await
            .expect("PUT request failed")
    }

    pub async fn post_json(&self, path: &str, body: &serde_json::Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("POST request failed")
    }

    pub async fn delete_json(&self, path: &str, body: &serde_json::Value) -> reqwest::Response {
        self.client
            .delete(self.url(path))
            .json(body)
            .send()
            .await
            .expect("DELETE request failed")
    }
}
