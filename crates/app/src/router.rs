use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;

use pet_registry_storage::Database;

use crate::auth::TokenValidator;
use crate::registry::{Clock, PetRegistry};
use crate::{pets, telemetry};

pub const API_PREFIX: &str = "/api";

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    clock: Clock,
    registry: PetRegistry,
    token_validator: TokenValidator,
}

impl AppState {
    pub fn new(metrics: PrometheusHandle, storage: Database, jwt_secret: &[u8]) -> Self {
        let clock: Clock = Arc::new(Utc::now);
        Self {
            metrics,
            registry: PetRegistry::new(storage, clock.clone()),
            clock,
            token_validator: TokenValidator::new(jwt_secret),
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, storage: Database, clock: Clock) -> Self {
        self.clock = clock.clone();
        self.registry = PetRegistry::new(storage, clock);
        self
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn registry(&self) -> &PetRegistry {
        &self.registry
    }

    pub fn token_validator(&self) -> &TokenValidator {
        &self.token_validator
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .nest(API_PREFIX, pets::routes())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = telemetry::render_metrics(state.metrics());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Method, Request},
        response::Response,
    };
    use chrono::{Duration, TimeZone};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::auth::tests::{mint_token, TEST_SECRET};
    use crate::registry::tests::temp_database;

    struct TestApp {
        state: AppState,
        now: Arc<Mutex<DateTime<Utc>>>,
        _dir: TempDir,
    }

    impl TestApp {
        async fn new() -> Self {
            let metrics = telemetry::init_metrics().expect("metrics init");
            let (database, dir) = temp_database().await;
            let now = Arc::new(Mutex::new(Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap()));
            let shared = now.clone();
            let clock: Clock = Arc::new(move || *shared.lock().expect("clock"));
            let state = AppState::new(metrics, database.clone(), TEST_SECRET)
                .with_clock(database, clock);
            Self {
                state,
                now,
                _dir: dir,
            }
        }

        fn advance(&self, by: Duration) {
            *self.now.lock().expect("clock") += by;
        }

        fn token(&self, user: &str) -> String {
            let now = *self.now.lock().expect("clock");
            mint_token(TEST_SECRET, user, now + Duration::hours(1))
        }

        async fn call(
            &self,
            method: Method,
            uri: &str,
            user: Option<&str>,
            body: Option<Value>,
        ) -> Response {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(user) = user {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", self.token(user)));
            }
            let request = match body {
                Some(value) => builder
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(value.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };
            app_router(self.state.clone())
                .oneshot(request)
                .await
                .expect("handler should respond")
        }
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body should read")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("json body")
    }

    fn mel() -> Value {
        json!({ "nome": "Mel", "tipo": "Cachorro", "idade_anos": 2, "sexo": "femea" })
    }

    async fn create_mel(app: &TestApp, user: &str) -> Value {
        let response = app
            .call(Method::POST, "/api/pets", Some(user), Some(mel()))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await["pet"].clone()
    }

    #[tokio::test]
    async fn healthz_returns_ok() {
        let app = TestApp::new().await;
        let response = app.call(Method::GET, "/healthz", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_exports_build_info() {
        let app = TestApp::new().await;
        let response = app.call(Method::GET, "/metrics", None, None).await;

        assert_eq!(response.status(), StatusCode::OK);
        let collected = response
            .into_body()
            .collect()
            .await
            .expect("body should read");
        let body = String::from_utf8(collected.to_bytes().to_vec()).expect("utf-8");
        assert!(body.contains("app_build_info"));
        assert!(body.contains("app_uptime_seconds"));
    }

    #[tokio::test]
    async fn requests_without_token_are_unauthorized() {
        let app = TestApp::new().await;
        let response = app.call(Method::GET, "/api/pets", None, None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["message"], "Unauthenticated.");

        let response = app
            .call(Method::POST, "/api/pets", None, Some(mel()))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn create_returns_201_with_defaulted_months() {
        let app = TestApp::new().await;
        let response = app
            .call(Method::POST, "/api/pets", Some("ana"), Some(mel()))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = body_json(response).await;
        assert_eq!(body["message"], "Pet cadastrado com sucesso");
        let pet = &body["pet"];
        assert_eq!(pet["nome"], "Mel");
        assert_eq!(pet["tipo"], "Cachorro");
        assert_eq!(pet["idade_anos"], 2);
        assert_eq!(pet["idade_meses"], 0);
        assert_eq!(pet["sexo"], "femea");
        assert_eq!(pet["user_id"], "ana");
        assert!(pet["id"].as_i64().is_some());
        assert!(pet["created_at"].is_string());
        assert!(pet["updated_at"].is_string());
    }

    #[tokio::test]
    async fn create_rejects_invalid_payload_with_field_errors() {
        let app = TestApp::new().await;
        let response = app
            .call(
                Method::POST,
                "/api/pets",
                Some("ana"),
                Some(json!({ "nome": "M", "tipo": "Gato", "idade_anos": 1, "sexo": "macha" })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = body_json(response).await;
        assert_eq!(body["message"], "Nome deve ter pelo menos 2 caracteres");
        assert_eq!(body["errors"]["nome"][0], "Nome deve ter pelo menos 2 caracteres");
        assert_eq!(body["errors"]["sexo"][0], "Sexo deve ser macho ou fêmea");
        assert!(body["errors"].get("tipo").is_none());

        let listed = body_json(app.call(Method::GET, "/api/pets", Some("ana"), None).await).await;
        assert_eq!(listed, json!({ "pets": [] }));
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let app = TestApp::new().await;
        let response = app
            .call(Method::POST, "/api/pets", Some("ana"), Some(json!(["nome"])))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/pets")
            .header(header::AUTHORIZATION, format!("Bearer {}", app.token("ana")))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app_router(app.state.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn list_only_returns_callers_pets() {
        let app = TestApp::new().await;
        let anas = create_mel(&app, "ana").await;
        create_mel(&app, "bruno").await;

        let response = app.call(Method::GET, "/api/pets", Some("ana"), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let pets = body["pets"].as_array().expect("pets array");
        assert_eq!(pets.len(), 1);
        assert_eq!(pets[0]["id"], anas["id"]);
    }

    #[tokio::test]
    async fn foreign_records_are_not_found() {
        let app = TestApp::new().await;
        let brunos = create_mel(&app, "bruno").await;
        let uri = format!("/api/pets/{}", brunos["id"]);

        for (method, body) in [
            (Method::GET, None),
            (Method::PUT, Some(json!({ "nome": "Outro" }))),
            (Method::DELETE, None),
        ] {
            let response = app.call(method, &uri, Some("ana"), body).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            assert_eq!(
                body_json(response).await,
                json!({ "message": "Pet não encontrado" })
            );
        }

        let response = app.call(Method::GET, &uri, Some("bruno"), None).await;
        let body = body_json(response).await;
        assert_eq!(body["pet"], brunos);
    }

    #[tokio::test]
    async fn patch_updates_only_supplied_fields() {
        let app = TestApp::new().await;
        let created = create_mel(&app, "ana").await;
        let uri = format!("/api/pets/{}", created["id"]);
        app.advance(Duration::minutes(3));

        let response = app
            .call(Method::PATCH, &uri, Some("ana"), Some(json!({ "nome": "Melzinha" })))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Pet atualizado com sucesso");

        let pet = &body["pet"];
        assert_eq!(pet["nome"], "Melzinha");
        for field in ["tipo", "idade_anos", "idade_meses", "sexo", "created_at", "user_id"] {
            assert_eq!(pet[field], created[field], "{field} should be unchanged");
        }
        assert_ne!(pet["updated_at"], created["updated_at"]);
    }

    #[tokio::test]
    async fn empty_update_body_returns_current_record() {
        let app = TestApp::new().await;
        let created = create_mel(&app, "ana").await;
        let uri = format!("/api/pets/{}", created["id"]);
        app.advance(Duration::minutes(3));

        for method in [Method::PATCH, Method::PUT] {
            let response = app.call(method, &uri, Some("ana"), None).await;
            assert_eq!(response.status(), StatusCode::OK);
            let body = body_json(response).await;
            assert_eq!(body["message"], "Pet atualizado com sucesso");
            assert_eq!(body["pet"], created);
        }

        let response = app.call(Method::POST, "/api/pets", Some("ana"), None).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(response).await["errors"]["nome"][0], "Nome é obrigatório");
    }

    #[tokio::test]
    async fn create_accepts_years_beyond_32_bits() {
        let app = TestApp::new().await;
        let response = app
            .call(
                Method::POST,
                "/api/pets",
                Some("ana"),
                Some(json!({ "nome": "Mel", "tipo": "Tartaruga", "idade_anos": 5_000_000_000_i64, "sexo": "femea" })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json(response).await["pet"]["idade_anos"], 5_000_000_000_i64);
    }

    #[tokio::test]
    async fn update_with_month_twelve_is_rejected_without_mutation() {
        let app = TestApp::new().await;
        let created = create_mel(&app, "ana").await;
        let uri = format!("/api/pets/{}", created["id"]);

        let response = app
            .call(Method::PUT, &uri, Some("ana"), Some(json!({ "idade_meses": 12 })))
            .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(
            body["errors"]["idade_meses"][0],
            "Idade em meses deve ser no máximo 11"
        );

        let current = body_json(app.call(Method::GET, &uri, Some("ana"), None).await).await;
        assert_eq!(current["pet"], created);
    }

    #[tokio::test]
    async fn delete_then_read_returns_not_found() {
        let app = TestApp::new().await;
        let created = create_mel(&app, "ana").await;
        let uri = format!("/api/pets/{}", created["id"]);

        let response = app.call(Method::DELETE, &uri, Some("ana"), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({ "message": "Pet excluído com sucesso" })
        );

        let response = app.call(Method::GET, &uri, Some("ana"), None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        for _ in 0..2 {
            let response = app.call(Method::DELETE, &uri, Some("ana"), None).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }
    }

    #[tokio::test]
    async fn non_numeric_id_is_not_found() {
        let app = TestApp::new().await;
        let response = app
            .call(Method::GET, "/api/pets/not-a-number", Some("ana"), None)
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
