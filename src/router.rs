use crate::controller;
use axum::{
    routing::{get, post},
    Router,
};
use service::AppState;

pub(crate) fn define_routes(app_state: AppState) -> Router {
    let events = sse::http::router(
        app_state.streamer.clone(),
        app_state.config.events_path(),
    );

    Router::new()
        .route("/publish", post(controller::publish))
        .route("/health", get(controller::health_check))
        .with_state(app_state)
        .merge(events)
}
