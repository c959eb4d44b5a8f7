//! HTTP surface for the comments service (`spec.md` §6): axum router,
//! graceful shutdown, CORS/compression layers — the same shape as the
//! teacher's `rostra-web-ui`, generalized from a p2p social UI to a plain
//! JSON/XML API over a local `comments-db::Database`.

mod dto;
mod error;
mod routes;
mod serde_util;
mod time_fmt;

use std::io;
use std::net::{AddrParseError, SocketAddr};
use std::str::FromStr as _;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, Method};
use comments_db::Database;
use comments_report::{BlobStore, DownloadOrchestrator};
use snafu::{ResultExt as _, Snafu, Whatever};
use tokio::net::{TcpListener, TcpSocket};
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tower_http::compression::predicate::SizeAbove;
use tower_http::cors::CorsLayer;
use tower_http::CompressionLevel;
use tracing::info;

pub struct Opts {
    pub listen: String,
    pub cors_origin: Option<String>,
    pub reuseport: bool,
}

impl Opts {
    pub fn new(listen: String, cors_origin: Option<String>, reuseport: bool) -> Self {
        Self {
            listen,
            cors_origin,
            reuseport,
        }
    }
}

pub struct AppState {
    pub db: Arc<Database>,
    pub orchestrator: DownloadOrchestrator,
}

pub type SharedState = Arc<AppState>;

pub struct Server {
    listener: TcpListener,
    state: SharedState,
    opts: Opts,
}

#[derive(Debug, Snafu)]
pub enum WebServerError {
    #[snafu(transparent)]
    Io { source: io::Error },

    ListenAddr { source: AddrParseError },

    Cors { source: Whatever },
}

pub type ServerResult<T> = std::result::Result<T, WebServerError>;

impl Server {
    pub async fn init(opts: Opts, db: Arc<Database>, blobs: BlobStore) -> ServerResult<Server> {
        let listener = Self::get_listener(&opts).await?;
        let orchestrator = DownloadOrchestrator::new(db.clone(), blobs);
        let state = Arc::new(AppState { db, orchestrator });

        info!("Listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            state,
            opts,
        })
    }

    async fn get_listener(opts: &Opts) -> ServerResult<TcpListener> {
        let addr = SocketAddr::from_str(&opts.listen).context(ListenAddrSnafu)?;
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        if opts.reuseport {
            #[cfg(unix)]
            socket.set_reuseport(true)?;
        }
        socket.set_nodelay(true)?;
        socket.bind(addr)?;
        Ok(socket.listen(1024)?)
    }

    pub async fn run(self) -> ServerResult<()> {
        let router = Router::new().merge(routes::router(self.state.clone()));

        info!("Starting server");
        let listen = self.addr()?;
        axum::serve(
            self.listener,
            router
                .layer(cors_layer(&self.opts, listen)?)
                .layer(compression_layer())
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        Ok(())
    }

    pub fn addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

fn compression_layer() -> CompressionLayer<SizeAbove> {
    CompressionLayer::new()
        .quality(CompressionLevel::Precise(4))
        .compress_when(SizeAbove::new(512))
}

fn cors_layer(opts: &Opts, listen: SocketAddr) -> ServerResult<CorsLayer> {
    Ok(CorsLayer::new()
        .allow_headers([ACCEPT, CONTENT_TYPE, HeaderName::from_static("csrf-token")])
        .max_age(Duration::from_secs(86400))
        .allow_origin(opts.cors_origin(listen).context(CorsSnafu)?)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ]))
}

impl Opts {
    pub fn cors_origin(&self, listen: SocketAddr) -> std::result::Result<HeaderValue, Whatever> {
        use snafu::ResultExt as _;
        self.cors_origin
            .clone()
            .unwrap_or_else(|| format!("http://{}", listen))
            .parse()
            .whatever_context("cors_origin does not parse as an http value")
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
