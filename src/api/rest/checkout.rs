use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::Deserialize;
use tracing::info;

use crate::error::AppError;
use crate::models::delivery::PaymentMethod;
use crate::models::order::{CartItem, DeliveryAddress};
use crate::state::AppState;
use crate::workflow::{Checkout, CheckoutOutcome};

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/orders/:order_id/checkout", post(checkout))
}

#[derive(Deserialize)]
pub struct CheckoutRequest {
    pub items: Vec<CartItem>,
    pub address: DeliveryAddress,
    pub total_amount: f64,
    pub payment_method: PaymentMethod,
}

/// Live tracking belongs to the websocket route, so the poller the
/// workflow starts for the new delivery is released before responding.
async fn checkout(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<Json<CheckoutOutcome>, AppError> {
    let checkout = Checkout {
        order_id,
        items: payload.items,
        address: payload.address,
        total_amount: payload.total_amount,
        payment_method: payload.payment_method,
    };

    let mut outcome = state.workflow.complete_order_flow(&checkout, |_| {}).await?;
    if let Some(tracking) = outcome.tracking.take() {
        tracking.cancel();
    }

    let result = if outcome.delivery.is_some() {
        "assigned"
    } else {
        "pending"
    };
    info!(order_id = %outcome.order_id, result, "checkout finished");
    state
        .metrics
        .deliveries_created_total
        .with_label_values(&[result])
        .inc();

    Ok(Json(outcome))
}
