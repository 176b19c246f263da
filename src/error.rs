use std::{convert::Infallible, io};

use thiserror::Error;
use warp::{http::StatusCode, reply::Reply, Rejection};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("JSON deserialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Unknown user: {0}")]
    UserNotFound(String),
    #[error("Unknown payment: {0}")]
    PaymentNotFound(i64),
    #[error("Unknown order: {0}")]
    OrderNotFound(String),
    #[error("telegramId is required")]
    MissingTelegramId,
    #[error("Invalid robot level: {0}")]
    InvalidLevel(i64),
    #[error("Invalid balance: {0}")]
    InvalidBalance(f64),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Payment provider is not configured")]
    ProviderNotConfigured,
    #[error("Missing secret: {0}")]
    MissingSecret(&'static str),
    #[error("{0}")]
    Custom(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl warp::reject::Reject for AppError {}

pub fn reject(err: AppError) -> Rejection {
    warp::reject::custom(err)
}

/// Maps rejections to a JSON `{"error": ...}` body with a matching status.
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if let Some(app) = err.find::<AppError>() {
        let status = match app {
            AppError::UserNotFound(_)
            | AppError::PaymentNotFound(_)
            | AppError::OrderNotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidLevel(_)
            | AppError::InvalidBalance(_)
            | AppError::MissingTelegramId => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::ProviderNotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("request failed: {:?}", app);
        }
        (status, app.to_string())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if err.find::<warp::filters::body::BodyDeserializeError>().is_some() {
        (StatusCode::BAD_REQUEST, "Invalid request body".to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        tracing::error!("unhandled rejection: {:?}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&serde_json::json!({ "error": message })),
        status,
    ))
}
