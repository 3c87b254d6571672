use crate::middleware::{auth::auth_middleware, verified::verified_guard};
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::limit::RequestBodyLimitLayer;

pub mod dto;
pub mod error;
pub mod handler;
pub mod model;
pub mod repository;
pub mod service;
pub mod static_handler;

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

pub fn router(state: AppState) -> Router<AppState> {
    let body_limit = (state.config.media.max_video_size + MULTIPART_OVERHEAD) as usize;

    let upload_routes = Router::new()
        .route("/upload-video-hls", post(handler::upload_video_hls))
        .route("/upload-video", post(handler::upload_video))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .route_layer(middleware::from_fn(verified_guard))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let read_routes = Router::new()
        .route("/video-status/{id}", get(handler::get_video_status))
        .route("/queue", get(handler::get_queue))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    upload_routes.merge(read_routes)
}

/// Public file routes, mounted under `/static`.
pub fn static_router() -> Router<AppState> {
    Router::new()
        .route(
            "/video-hls/{id}/master.m3u8",
            get(static_handler::serve_master_playlist),
        )
        .route(
            "/video-hls/{id}/{variant}/{segment}",
            get(static_handler::serve_hls_file),
        )
        .route(
            "/video-stream/{name}",
            get(static_handler::serve_video_stream),
        )
}
