use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// Failure talking to the courier API, before it is attributed to an
/// operation.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("courier returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed courier response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("courier response rejected: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to get delivery pricing: {0}")]
    Quote(#[source] ApiError),

    #[error("failed to create delivery request: {0}")]
    DeliveryCreation(#[source] ApiError),

    #[error("failed to fetch delivery status: {0}")]
    StatusFetch(#[source] ApiError),

    #[error("failed to track delivery: {0}")]
    Tracking(#[source] ApiError),

    #[error("failed to cancel delivery: {0}")]
    Cancellation(#[source] ApiError),

    #[error("failed to rate delivery: {0}")]
    Rating(#[source] ApiError),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("failed to validate address: {0}")]
    AddressValidation(#[source] ApiError),

    #[error("failed to get estimated delivery time: {0}")]
    Estimation(#[source] ApiError),

    #[error("failed to subscribe to delivery updates: {0}")]
    Subscription(#[source] ApiError),

    #[error("delivery cache error: {0}")]
    Persistence(String),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    PricingError,
    AddressError,
    ApiError,
    UnknownError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuggestedAction {
    Retry,
    SelectDifferentAddress,
    ContactSupport,
}

/// What the storefront should tell the shopper about a failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorGuidance {
    pub category: ErrorCategory,
    pub message: String,
    pub action: SuggestedAction,
}

impl AppError {
    pub fn guidance(&self) -> ErrorGuidance {
        let (category, message, action) = match self {
            AppError::Quote(_) => (
                ErrorCategory::PricingError,
                "Unable to calculate delivery cost".to_string(),
                SuggestedAction::Retry,
            ),
            AppError::AddressValidation(_) => (
                ErrorCategory::AddressError,
                "This address is outside our delivery area".to_string(),
                SuggestedAction::SelectDifferentAddress,
            ),
            AppError::DeliveryCreation(_)
            | AppError::StatusFetch(_)
            | AppError::Tracking(_)
            | AppError::Cancellation(_)
            | AppError::Rating(_)
            | AppError::Estimation(_)
            | AppError::Subscription(_) => (
                ErrorCategory::ApiError,
                "Network error. Please try again.".to_string(),
                SuggestedAction::Retry,
            ),
            other => (
                ErrorCategory::UnknownError,
                other.to_string(),
                SuggestedAction::ContactSupport,
            ),
        };

        ErrorGuidance {
            category,
            message,
            action,
        }
    }

    /// Whether trying the same call again could succeed. Local rejections
    /// and courier 4xx answers are final.
    pub fn is_retryable(&self) -> bool {
        match self.api_source() {
            Some(ApiError::Status { status, .. }) => !(400..500).contains(status),
            Some(_) => true,
            None => false,
        }
    }

    fn api_source(&self) -> Option<&ApiError> {
        match self {
            AppError::Quote(source)
            | AppError::DeliveryCreation(source)
            | AppError::StatusFetch(source)
            | AppError::Tracking(source)
            | AppError::Cancellation(source)
            | AppError::Rating(source)
            | AppError::AddressValidation(source)
            | AppError::Estimation(source)
            | AppError::Subscription(source) => Some(source),
            _ => None,
        }
    }

    fn status_code(&self) -> StatusCode {
        if let AppError::Validation(_) = self {
            return StatusCode::BAD_REQUEST;
        }
        match self.api_source() {
            Some(ApiError::Status { status: 404, .. }) => StatusCode::NOT_FOUND,
            Some(ApiError::Status { status: 409, .. }) => StatusCode::CONFLICT,
            Some(_) => StatusCode::BAD_GATEWAY,
            None => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let guidance = self.guidance();
        let body = Json(json!({
            "error": self.to_string(),
            "category": guidance.category,
            "action": guidance.action,
            "message": guidance.message,
        }));

        (status, body).into_response()
    }
}
