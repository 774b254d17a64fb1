use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use metrics::counter;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, error};

use pet_registry_core::PetRecord;

use crate::auth::CurrentPrincipal;
use crate::error::{ApiError, MessageBody};
use crate::registry::RegistryError;
use crate::router::AppState;

const CREATED_MESSAGE: &str = "Pet cadastrado com sucesso";
const UPDATED_MESSAGE: &str = "Pet atualizado com sucesso";
const DELETED_MESSAGE: &str = "Pet excluído com sucesso";

/// Routes for the pet resource, mounted under the API prefix.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/pets", get(index).post(store))
        .route(
            "/pets/:id",
            get(show).put(update).patch(update).delete(destroy),
        )
}

#[derive(Debug, Serialize)]
pub struct PetList {
    pub pets: Vec<PetRecord>,
}

#[derive(Debug, Serialize)]
pub struct PetBody {
    pub pet: PetRecord,
}

#[derive(Debug, Serialize)]
pub struct PetWithMessage {
    pub message: &'static str,
    pub pet: PetRecord,
}

async fn index(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
) -> Result<Json<PetList>, ApiError> {
    let outcome = state.registry().list(&principal).await;
    let pets = finish("list", outcome)?;
    Ok(Json(PetList { pets }))
}

async fn store(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    body: Bytes,
) -> Result<(StatusCode, Json<PetWithMessage>), ApiError> {
    let input = payload_object("create", body)?;
    let outcome = state.registry().create(&principal, &input).await;
    let pet = finish("create", outcome)?;
    Ok((
        StatusCode::CREATED,
        Json(PetWithMessage {
            message: CREATED_MESSAGE,
            pet,
        }),
    ))
}

async fn show(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
) -> Result<Json<PetBody>, ApiError> {
    let outcome = state.registry().read(&principal, &id).await;
    let pet = finish("read", outcome)?;
    Ok(Json(PetBody { pet }))
}

async fn update(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<PetWithMessage>, ApiError> {
    let input = payload_object("update", body)?;
    let outcome = state.registry().update(&principal, &id, &input).await;
    let pet = finish("update", outcome)?;
    Ok(Json(PetWithMessage {
        message: UPDATED_MESSAGE,
        pet,
    }))
}

async fn destroy(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
) -> Result<Json<MessageBody>, ApiError> {
    let outcome = state.registry().delete(&principal, &id).await;
    finish("delete", outcome)?;
    Ok(Json(MessageBody {
        message: DELETED_MESSAGE,
    }))
}

/// Reads the request body as a JSON object. An empty body counts as `{}`.
fn payload_object(op: &'static str, body: Bytes) -> Result<Map<String, Value>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }

    match serde_json::from_slice::<Value>(&body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => {
            counter!("pets_requests_total", "op" => op, "result" => "bad_request").increment(1);
            debug!(stage = "pets", op, "payload is not a json object");
            Err(ApiError::BadRequest)
        }
        Err(err) => {
            counter!("pets_requests_total", "op" => op, "result" => "bad_request").increment(1);
            debug!(stage = "pets", op, error = %err, "payload rejected");
            Err(ApiError::BadRequest)
        }
    }
}

/// Records the outcome of a registry call and maps failures onto API errors.
fn finish<T>(op: &'static str, outcome: Result<T, RegistryError>) -> Result<T, ApiError> {
    let (result, mapped) = match outcome {
        Ok(value) => {
            counter!("pets_requests_total", "op" => op, "result" => "ok").increment(1);
            return Ok(value);
        }
        Err(RegistryError::Validation(errors)) => ("invalid", ApiError::Validation(errors)),
        Err(RegistryError::NotFound) => ("not_found", ApiError::NotFound),
        Err(RegistryError::Storage(err)) => {
            error!(stage = "pets", op, error = %err, "storage failure");
            ("error", ApiError::Internal)
        }
    };
    counter!("pets_requests_total", "op" => op, "result" => result).increment(1);
    Err(mapped)
}
