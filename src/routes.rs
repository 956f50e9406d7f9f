use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, MatchedPath, Request},
    http::HeaderMap,
    routing::{get, head, post},
};
use chunk_store::{ChunkStorage, ChunkStore};
use tower_http::trace::TraceLayer;
use url::Url;

use crate::http_objects::{ApiError, UPLOAD_HOST};

mod resume;
mod upload;

use resume::{resume_upload, upload_offset};
use upload::start_upload;

#[derive(Clone)]
pub struct RouteState {
    pub chunk_storage: ChunkStorage,
    pub chunk_size: u64,
    pub public_url: Url,
}

impl RouteState {
    /// Resolves the backing store for a request, reading `x-upload-host` when
    /// the relay backend is configured.
    fn store(&self, headers: &HeaderMap) -> Result<Arc<dyn ChunkStore>, ApiError> {
        let upload_host = match headers.get(UPLOAD_HOST) {
            Some(value) => Some(
                value
                    .to_str()
                    .map_err(|_| ApiError::bad_request("invalid x-upload-host header"))?,
            ),
            None => None,
        };
        Ok(self.chunk_storage.store_for(upload_host)?)
    }
}

pub fn create_routes(route_state: RouteState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/upload", post(start_upload).fallback(method_not_allowed))
        .route(
            "/upload/resume",
            head(upload_offset)
                .patch(resume_upload)
                .fallback(method_not_allowed),
        )
        .with_state(route_state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request| {
                    let method = req.method();
                    let uri = req.uri();

                    let matched_path = req
                        .extensions()
                        .get::<MatchedPath>()
                        .map(|matched_path| matched_path.as_str());

                    tracing::debug_span!("request", %method, %uri, matched_path)
                })
                .on_failure(()),
        )
        .layer(DefaultBodyLimit::disable())
}

async fn index() -> &'static str {
    "Resumable Upload Proxy"
}

async fn method_not_allowed() -> ApiError {
    ApiError::method_not_allowed()
}
