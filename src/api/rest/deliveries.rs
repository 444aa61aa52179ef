use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::error::AppError;
use crate::models::delivery::DeliveryRecord;
use crate::models::order::{CartItem, DeliveryAddress};
use crate::models::pricing::{ActionAck, WebhookSubscription};
use crate::state::AppState;
use crate::workflow::{AddressCheck, DeliveryQuote, EtaSummary};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/quote", post(quote))
        .route("/address/validate", post(validate_address))
        .route("/estimate", post(estimate))
        .route("/deliveries", get(list_deliveries).delete(clear_deliveries))
        .route("/deliveries/:id/status", get(delivery_status))
        .route("/deliveries/:id/cancel", post(cancel_delivery))
        .route("/deliveries/:id/rate", post(rate_delivery))
        .route("/deliveries/:id/subscribe", post(subscribe))
}

#[derive(Deserialize)]
pub struct QuoteRequest {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub items: Vec<CartItem>,
}

#[derive(Deserialize)]
pub struct EstimateRequest {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct RateRequest {
    pub rating: u8,
    pub feedback: Option<String>,
}

#[derive(Deserialize)]
pub struct SubscribeRequest {
    pub webhook_url: String,
}

async fn quote(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<QuoteRequest>,
) -> Json<DeliveryQuote> {
    Json(
        state
            .workflow
            .get_delivery_quote(payload.lat, payload.lng, &payload.items)
            .await,
    )
}

async fn validate_address(
    State(state): State<Arc<AppState>>,
    Json(address): Json<DeliveryAddress>,
) -> Json<AddressCheck> {
    Json(state.workflow.validate_delivery_address(&address).await)
}

async fn estimate(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<EstimateRequest>,
) -> Json<EtaSummary> {
    Json(
        state
            .workflow
            .get_estimated_delivery_time(payload.lat, payload.lng)
            .await,
    )
}

async fn list_deliveries(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<DeliveryRecord>>, AppError> {
    let deliveries = state.workflow.client().list_cached_deliveries().await?;
    Ok(Json(deliveries))
}

async fn clear_deliveries(State(state): State<Arc<AppState>>) -> Result<StatusCode, AppError> {
    state.workflow.client().clear_cached_deliveries().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delivery_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DeliveryRecord>, AppError> {
    let client = state.workflow.client();
    let id = id.as_str();
    let record = state
        .retry
        .run("delivery_status", move || client.get_delivery_status(id))
        .await?;

    Ok(Json(record))
}

async fn cancel_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Option<Json<CancelRequest>>,
) -> Result<Json<ActionAck>, AppError> {
    let reason = payload.and_then(|Json(body)| body.reason);
    let ack = state
        .workflow
        .cancel_delivery_order(&id, reason.as_deref())
        .await?;

    Ok(Json(ack))
}

async fn rate_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<RateRequest>,
) -> Result<Json<ActionAck>, AppError> {
    let ack = state
        .workflow
        .rate_delivery_partner(&id, payload.rating, payload.feedback.as_deref())
        .await?;

    Ok(Json(ack))
}

async fn subscribe(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<SubscribeRequest>,
) -> Result<Json<WebhookSubscription>, AppError> {
    let subscription = state
        .workflow
        .client()
        .subscribe_to_updates(&id, &payload.webhook_url)
        .await?;

    Ok(Json(subscription))
}
