use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use url::Url;

use crate::capture::{self, CaptureOutcome};
use crate::card::{Card, CardList};
use crate::config::CaptureConfig;
use crate::driver::CaptureError;
use crate::store::CardStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CardStore>,
    pub capture: Arc<CaptureConfig>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok\n" }))
        .route("/api/cards", get(list_cards).post(save_cards))
        .route("/api/screenshot", get(capture_screenshot))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    /// Full-page shot of whatever the browser rendered when the capture
    /// region never appeared, so the caller can see what went wrong.
    #[serde(skip_serializing_if = "Option::is_none")]
    debug_screenshot_base64: Option<String>,
}

impl ErrorBody {
    fn new(error: &str, details: impl Into<String>) -> Self {
        Self {
            error: error.to_string(),
            details: Some(details.into()),
            debug_screenshot_base64: None,
        }
    }
}

type ApiError = (StatusCode, Json<ErrorBody>);

async fn list_cards(State(state): State<AppState>) -> Result<Json<Vec<Card>>, ApiError> {
    match state.store.load_all().await {
        Ok(cards) => {
            tracing::debug!(count = cards.len(), "loaded cards");
            Ok(Json(cards))
        }
        Err(err) => {
            tracing::error!(%err, "load cards failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody::new("Failed to fetch data", err.to_string())),
            ))
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SaveResponse {
    success: bool,
    saved_cards: Vec<Card>,
}

async fn save_cards(
    State(state): State<AppState>,
    Json(cards): Json<Vec<Card>>,
) -> Result<Json<SaveResponse>, ApiError> {
    let list = CardList::from_cards(cards).map_err(|err| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody::new("Invalid card list", format!("{err:#}"))),
        )
    })?;

    if let Err(err) = state.store.save_all(list.cards()).await {
        tracing::error!(%err, "save cards failed");
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody::new("Failed to save data", err.to_string())),
        ));
    }

    let saved_cards = list.into_cards();
    tracing::debug!(count = saved_cards.len(), "saved cards");
    Ok(Json(SaveResponse {
        success: true,
        saved_cards,
    }))
}

#[derive(Debug, Deserialize)]
struct ScreenshotQuery {
    url: Option<String>,
}

async fn capture_screenshot(
    State(state): State<AppState>,
    Query(query): Query<ScreenshotQuery>,
) -> Result<Json<CaptureOutcome>, ApiError> {
    let raw = query.url.as_deref().map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Err(capture_error_response(&CaptureError::MissingParameter));
    }

    let url = Url::parse(raw).map_err(|err| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody::new("Invalid url", err.to_string())),
        )
    })?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorBody::new("Invalid url", "url must be http/https")),
        ));
    }

    match capture::capture_build(&state.capture, &url).await {
        Ok(outcome) => Ok(Json(outcome)),
        Err(err) => Err(capture_error_response(&err)),
    }
}

fn capture_error_response(err: &CaptureError) -> ApiError {
    match err {
        CaptureError::MissingParameter => (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: "URL is required".to_string(),
                details: None,
                debug_screenshot_base64: None,
            }),
        ),
        CaptureError::ContentTimeout {
            details,
            debug_screenshot,
        } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody {
                error: "Failed to take screenshot".to_string(),
                details: Some(details.clone()),
                debug_screenshot_base64: debug_screenshot.clone(),
            }),
        ),
        CaptureError::Launch(details) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody::new("Failed to launch browser", details.clone())),
        ),
        CaptureError::Failed(details) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody::new("Failed to take screenshot", details.clone())),
        ),
    }
}
