use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use log::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use service::AppState;

/// An event submitted over HTTP for broadcast.
#[derive(Debug, Deserialize)]
pub(crate) struct PublishParams {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub event: String,
    /// Strings are sent verbatim, anything else as JSON.
    pub data: Value,
}

#[derive(Debug, Serialize)]
pub(crate) struct Health {
    pub status: &'static str,
    pub clients: usize,
}

/// POST an event to every connected client
pub(crate) async fn publish(
    State(app_state): State<AppState>,
    Json(params): Json<PublishParams>,
) -> Result<impl IntoResponse, sse::Error> {
    debug!("Publishing event {:?}", params.event);

    match &params.data {
        Value::String(data) => {
            app_state
                .streamer
                .send_string(&params.id, &params.event, data)
                .await
        }
        data => {
            app_state
                .streamer
                .send_json(&params.id, &params.event, data)
                .await?
        }
    }

    Ok(StatusCode::ACCEPTED)
}

/// GET the number of connected clients
pub(crate) async fn health_check(
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, sse::Error> {
    let clients = app_state.streamer.client_count().await?;
    Ok((
        StatusCode::OK,
        Json(Health {
            status: "healthy",
            clients,
        }),
    ))
}
