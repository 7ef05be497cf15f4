use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use chrono::Utc;

use super::domain::{PropertyId, RequestId, WorkerId};
use super::property::RequestIntake;
use super::repository::{
    NotificationPublisher, PrincipalDirectory, PropertyRepository, RepositoryError,
    RequestRepository, WorkerRepository,
};
use super::request::RequestStatus;
use super::service::{MaintenanceService, MaintenanceServiceError};

const ACTING_USER_HEADER: &str = "x-acting-user";

/// Router builder exposing HTTP endpoints for request intake, inspection,
/// transitions, and assignment.
pub fn maintenance_router<P, W, Q, D, N>(
    service: Arc<MaintenanceService<P, W, Q, D, N>>,
) -> Router
where
    P: PropertyRepository + 'static,
    W: WorkerRepository + 'static,
    Q: RequestRepository + 'static,
    D: PrincipalDirectory + 'static,
    N: NotificationPublisher + 'static,
{
    Router::new()
        .route(
            "/api/v1/maintenance/properties/:property_id/requests",
            post(submit_handler::<P, W, Q, D, N>),
        )
        .route(
            "/api/v1/maintenance/requests/:request_id",
            get(view_handler::<P, W, Q, D, N>),
        )
        .route(
            "/api/v1/maintenance/requests/:request_id/transition",
            post(transition_handler::<P, W, Q, D, N>),
        )
        .route(
            "/api/v1/maintenance/requests/:request_id/assign",
            post(assign_handler::<P, W, Q, D, N>),
        )
        .with_state(service)
}

fn acting_user(headers: &HeaderMap) -> Result<String, Response> {
    headers
        .get(ACTING_USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| {
            let payload = json!({ "error": "missing x-acting-user header" });
            (StatusCode::UNAUTHORIZED, axum::Json(payload)).into_response()
        })
}

fn error_response(error: MaintenanceServiceError) -> Response {
    let status = match &error {
        MaintenanceServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        MaintenanceServiceError::Unauthorized(_) => StatusCode::FORBIDDEN,
        MaintenanceServiceError::Invariant(_) => StatusCode::CONFLICT,
        MaintenanceServiceError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        MaintenanceServiceError::Repository(RepositoryError::Conflict)
        | MaintenanceServiceError::Repository(RepositoryError::StaleVersion { .. }) => {
            StatusCode::CONFLICT
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let payload = json!({ "error": error.to_string() });
    (status, axum::Json(payload)).into_response()
}

pub(crate) async fn submit_handler<P, W, Q, D, N>(
    State(service): State<Arc<MaintenanceService<P, W, Q, D, N>>>,
    Path(property_id): Path<String>,
    headers: HeaderMap,
    axum::Json(intake): axum::Json<RequestIntake>,
) -> Response
where
    P: PropertyRepository + 'static,
    W: WorkerRepository + 'static,
    Q: RequestRepository + 'static,
    D: PrincipalDirectory + 'static,
    N: NotificationPublisher + 'static,
{
    let user = match acting_user(&headers) {
        Ok(user) => user,
        Err(response) => return response,
    };

    match service.submit_request(&user, &PropertyId(property_id), intake, Utc::now()) {
        Ok(request) => (StatusCode::ACCEPTED, axum::Json(request.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn view_handler<P, W, Q, D, N>(
    State(service): State<Arc<MaintenanceService<P, W, Q, D, N>>>,
    Path(request_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    P: PropertyRepository + 'static,
    W: WorkerRepository + 'static,
    Q: RequestRepository + 'static,
    D: PrincipalDirectory + 'static,
    N: NotificationPublisher + 'static,
{
    let user = match acting_user(&headers) {
        Ok(user) => user,
        Err(response) => return response,
    };

    match service.view_request(&user, &RequestId(request_id)) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct TransitionBody {
    pub to: String,
}

pub(crate) async fn transition_handler<P, W, Q, D, N>(
    State(service): State<Arc<MaintenanceService<P, W, Q, D, N>>>,
    Path(request_id): Path<String>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<TransitionBody>,
) -> Response
where
    P: PropertyRepository + 'static,
    W: WorkerRepository + 'static,
    Q: RequestRepository + 'static,
    D: PrincipalDirectory + 'static,
    N: NotificationPublisher + 'static,
{
    let user = match acting_user(&headers) {
        Ok(user) => user,
        Err(response) => return response,
    };

    let Some(to) = RequestStatus::parse(&body.to) else {
        let payload = json!({ "error": format!("unknown status '{}'", body.to) });
        return (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response();
    };

    match service.transition_request(&user, &RequestId(request_id), to, Utc::now()) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct AssignBody {
    #[serde(default)]
    pub worker_id: Option<String>,
}

pub(crate) async fn assign_handler<P, W, Q, D, N>(
    State(service): State<Arc<MaintenanceService<P, W, Q, D, N>>>,
    Path(request_id): Path<String>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<AssignBody>,
) -> Response
where
    P: PropertyRepository + 'static,
    W: WorkerRepository + 'static,
    Q: RequestRepository + 'static,
    D: PrincipalDirectory + 'static,
    N: NotificationPublisher + 'static,
{
    let user = match acting_user(&headers) {
        Ok(user) => user,
        Err(response) => return response,
    };

    let request_id = RequestId(request_id);
    let outcome = match body.worker_id {
        Some(worker_id) => {
            service.assign_worker(&user, &request_id, &WorkerId(worker_id), Utc::now())
        }
        None => service.assign_best_worker(&user, &request_id, Utc::now()),
    };

    match outcome {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}
