use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    handler::Handler,
    http::{header, HeaderName, Method},
    middleware,
    routing::{get, post, MethodRouter},
    Router,
};
use kernel::{ApiErrorReply, ApiUploadReply, ErrorReply, UploadData, UploadReply, VideoList};
use tokio::net::TcpListener;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    classify::ServerErrorsFailureClass,
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use tracing::Span;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;

pub mod config;
pub mod domain;
pub mod error;
mod handlers;
pub mod mirror;
pub mod naming;
pub mod storage;
pub mod validator;

use crate::config::ServerConfig;
use crate::error::{Envelope, OversizeReply};
use crate::mirror::RepositoryMirror;
use crate::naming::NamingPolicy;
use crate::storage::VideoStore;

pub use crate::handlers::VIDEO_FIELD;

/// Room for multipart framing and any non-video form fields on top of the file
/// itself. A request whose extra fields exceed it is rejected as too large.
pub const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(handlers::upload, handlers::api_upload, handlers::list_videos),
    components(schemas(handlers::VideoForm, UploadReply, ApiUploadReply, UploadData, VideoList, ErrorReply, ApiErrorReply)),
    tags((name = "videos", description = "Video ingestion and listing"))
)]
pub struct ApiDoc;

/// Shared by all request handlers. Holds no mutable in-process state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<VideoStore>,
    pub naming: NamingPolicy,
    pub mirror: Option<Arc<RepositoryMirror>>,
}

impl AppState {
    #[must_use]
    pub fn new(store: VideoStore, naming: NamingPolicy, mirror: Option<RepositoryMirror>) -> Self {
        Self {
            store: Arc::new(store),
            naming,
            mirror: mirror.map(Arc::new),
        }
    }

    /// Opens (and creates) the videos directory and wires the git mirror if configured.
    pub async fn from_config(config: &ServerConfig) -> io::Result<Self> {
        let store = VideoStore::open(&config.videos_dir, config.max_file_size).await?;
        let mirror = config.mirror.as_ref().map(RepositoryMirror::git);
        Ok(Self::new(store, config.naming, mirror))
    }

    /// `videos/<name>` style location reported to clients.
    #[must_use]
    pub fn saved_to(&self, file_name: &str) -> String {
        let dir = self
            .store
            .dir()
            .file_name()
            .map_or_else(|| "videos".into(), |d| d.to_string_lossy());
        format!("{dir}/{file_name}")
    }
}

pub fn init_tracing() {
    let registered = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "vidvault=debug,server=debug,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
    if let Err(e) = registered {
        eprintln!("tracing not initialized: {e}");
    }
}

pub async fn run(config: ServerConfig) -> io::Result<()> {
    init_tracing();

    let state = AppState::from_config(&config).await?;
    let videos_dir = state.store.dir().to_path_buf();

    let socket = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(socket).await?;

    tracing::info!("Video upload server listening on http://{socket}");
    tracing::info!("  POST /upload - main upload endpoint");
    tracing::info!("  POST /api/upload - API upload endpoint");
    tracing::info!("  GET /videos - list all uploaded videos");
    tracing::info!("Videos saved to: {}", videos_dir.display());
    tracing::info!("File naming: {}", config.naming);
    match &config.mirror {
        Some(m) => tracing::info!(
            "Git mirror: {} -> {}/{}",
            m.workdir.display(),
            m.remote,
            m.branch
        ),
        None => tracing::info!("Git mirror: disabled"),
    }

    axum::serve(listener, create_routes(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

pub fn create_routes(state: AppState) -> Router {
    let limit = state.store.max_file_size();

    Router::new()
        .route("/upload", capped_upload(handlers::upload, limit, Envelope::Plain))
        .route(
            "/api/upload",
            capped_upload(handlers::api_upload, limit, Envelope::Api),
        )
        .route("/videos", get(handlers::list_videos))
        .route("/api-docs/openapi.json", get(handlers::openapi))
        .layer(
            ServiceBuilder::new()
                .layer(cors())
                .layer(TraceLayer::new_for_http().on_failure(
                    |error: ServerErrorsFailureClass, _latency: Duration, _span: &Span| {
                        tracing::error!("Server error: {error}");
                    },
                ))
                .layer(CatchPanicLayer::custom(error::handle_panic))
                .layer(DefaultBodyLimit::disable())
                .into_inner(),
        )
        .with_state(state)
}

/// `POST` route whose body is capped slightly above the file size limit.
/// Requests over the cap get the route's JSON size limit error.
fn capped_upload<H, T>(handler: H, limit: u64, envelope: Envelope) -> MethodRouter<AppState>
where
    H: Handler<T, AppState>,
    T: 'static,
{
    let cap = usize::try_from(limit.saturating_add(MULTIPART_OVERHEAD)).unwrap_or(usize::MAX);
    post(handler)
        .layer(RequestBodyLimitLayer::new(cap))
        .layer(middleware::from_fn_with_state(
            OversizeReply { limit, envelope },
            error::oversize_as_json,
        ))
}

/// Any origin may upload and list.
fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-api-key"),
        ])
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("signal received, starting graceful shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn saved_to_uses_directory_name() {
        // Arrange
        let tmp = tempfile::tempdir().unwrap();
        let store = VideoStore::open(tmp.path().join("clips"), 10).await.unwrap();
        let state = AppState::new(store, NamingPolicy::UniqueSuffix, None);

        // Act
        let saved_to = state.saved_to("a.mp4");

        // Assert
        assert_eq!(saved_to, "clips/a.mp4");
    }

    #[test]
    fn openapi_lists_all_endpoints() {
        // Act
        let doc = ApiDoc::openapi();

        // Assert
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        assert!(paths.contains(&&"/upload".to_owned()));
        assert!(paths.contains(&&"/api/upload".to_owned()));
        assert!(paths.contains(&&"/videos".to_owned()));
    }
}
