//! HTTP boundary: `POST /identify` and the `GET /` healthcheck.
//!
//! Handlers only translate between JSON and the identity functions. All
//! store work runs on the blocking pool.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::error::{ErrorResponse, IdentifyError};
use crate::identity;
use crate::state::AppState;
use crate::types::{HealthStatus, IdentifyRequest, IdentifyResponse, Observation};

pub type SharedState = Arc<AppState>;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(healthcheck))
        .route("/identify", post(identify))
        .with_state(state)
}

fn status_for(err: &IdentifyError) -> StatusCode {
    match err {
        IdentifyError::InvalidInput => StatusCode::BAD_REQUEST,
        IdentifyError::TransientStoreFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
        IdentifyError::InvariantViolation(_) | IdentifyError::Storage(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_reply(err: &IdentifyError) -> (StatusCode, Json<ErrorResponse>) {
    (status_for(err), Json(ErrorResponse::from(err)))
}

pub async fn identify(
    State(state): State<SharedState>,
    Json(req): Json<IdentifyRequest>,
) -> Result<Json<IdentifyResponse>, (StatusCode, Json<ErrorResponse>)> {
    let obs = Observation::try_from(&req).map_err(|e| error_reply(&e))?;

    let task = tokio::task::spawn_blocking(move || {
        let policy = state.retry_policy();
        state.with_db(|db| identity::identify_with_retry(db, &obs, &policy))
    });

    match task.await {
        Ok(Ok(resp)) => Ok(Json(resp)),
        Ok(Err(e)) => {
            if !e.is_retryable() {
                log::error!("identify failed: {e}");
            }
            Err(error_reply(&e))
        }
        Err(join_err) => {
            log::error!("identify task panicked: {join_err}");
            Err(error_reply(&IdentifyError::InvariantViolation(
                "identify task aborted".to_string(),
            )))
        }
    }
}

pub async fn healthcheck(State(state): State<SharedState>) -> (StatusCode, Json<HealthStatus>) {
    let task = tokio::task::spawn_blocking(move || state.with_db(identity::healthcheck));
    match task.await {
        Ok(status) if status.status == "ok" => (StatusCode::OK, Json(status)),
        Ok(status) => (StatusCode::SERVICE_UNAVAILABLE, Json(status)),
        Err(join_err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthStatus {
                status: "unavailable".to_string(),
                message: join_err.to_string(),
                contacts: None,
            }),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn test_state() -> SharedState {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("http.db");
        std::mem::forget(dir);
        let config = Config {
            database_path: Some(path),
            connections: 2,
            ..Config::default()
        };
        Arc::new(AppState::open(config).expect("open state"))
    }

    fn request(email: Option<&str>, phone: Option<&str>) -> Json<IdentifyRequest> {
        Json(IdentifyRequest {
            email: email.map(str::to_string),
            phone_number: phone.map(str::to_string),
        })
    }

    #[tokio::test]
    async fn test_identify_round_trip() {
        let state = test_state();
        let Json(first) = identify(State(state.clone()), request(Some("a@x.com"), Some("111")))
            .await
            .expect("first identify");
        let Json(second) = identify(State(state), request(Some(" a@x.com "), Some("222")))
            .await
            .expect("second identify");

        assert_eq!(second.contact.primary_contact_id, first.contact.primary_contact_id);
        assert_eq!(second.contact.phone_numbers, vec!["111", "222"]);
        assert_eq!(second.contact.secondary_contact_ids.len(), 1);
    }

    #[tokio::test]
    async fn test_identify_rejects_empty_request() {
        let state = test_state();
        let (status, Json(body)) = identify(State(state), request(Some(""), None))
            .await
            .expect_err("empty request must fail");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "email or phoneNumber is required");
        assert!(!body.can_retry);
    }

    #[tokio::test]
    async fn test_healthcheck_ok() {
        let state = test_state();
        let (status, Json(body)) = healthcheck(State(state)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "ok");
        assert_eq!(body.contacts, Some(0));
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(status_for(&IdentifyError::InvalidInput), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&IdentifyError::TransientStoreFailure("busy".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&IdentifyError::InvariantViolation("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
