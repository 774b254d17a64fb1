use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use pet_registry_core::FieldErrors;

pub const NOT_FOUND_MESSAGE: &str = "Pet não encontrado";
pub const UNAUTHENTICATED_MESSAGE: &str = "Unauthenticated.";
pub const BAD_REQUEST_MESSAGE: &str = "Corpo da requisição inválido";
pub const INTERNAL_MESSAGE: &str = "Erro interno do servidor";
const VALIDATION_FALLBACK_MESSAGE: &str = "Dados inválidos";

/// Body carrying only a human readable message.
#[derive(Debug, Serialize)]
pub struct MessageBody {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
struct ValidationBody {
    message: &'static str,
    errors: FieldErrors,
}

/// Failures surfaced to API clients as JSON.
#[derive(Debug)]
pub enum ApiError {
    Validation(FieldErrors),
    NotFound,
    Unauthenticated,
    BadRequest,
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = match self {
            Self::Validation(errors) => Json(ValidationBody {
                message: errors
                    .first_message()
                    .unwrap_or(VALIDATION_FALLBACK_MESSAGE),
                errors,
            })
            .into_response(),
            Self::NotFound => Json(MessageBody {
                message: NOT_FOUND_MESSAGE,
            })
            .into_response(),
            Self::Unauthenticated => {
                let mut response = Json(MessageBody {
                    message: UNAUTHENTICATED_MESSAGE,
                })
                .into_response();
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                response
            }
            Self::BadRequest => Json(MessageBody {
                message: BAD_REQUEST_MESSAGE,
            })
            .into_response(),
            Self::Internal => Json(MessageBody {
                message: INTERNAL_MESSAGE,
            })
            .into_response(),
        };
        *response.status_mut() = status;
        response
    }
}
