use actix_web::{http::StatusCode, HttpResponse};
use serde::Serialize;

pub mod admin;
pub mod pages;
pub mod public;

/// JSON envelope shared by the public and admin APIs.
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

pub fn api_ok<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse { success: true, data: Some(data), error: None })
}

pub fn api_created<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Created().json(ApiResponse { success: true, data: Some(data), error: None })
}

pub fn api_error(status: StatusCode, message: impl Into<String>) -> HttpResponse {
    HttpResponse::build(status).json(ApiResponse::<()> {
        success: false,
        data: None,
        error: Some(message.into()),
    })
}

pub fn internal_error(context: &str, err: impl std::fmt::Display) -> HttpResponse {
    log::error!("{}: {}", context, err);
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "An internal error occurred.")
}
