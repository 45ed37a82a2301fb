//! HTTP routes for reports

use axum::async_trait;
use axum::extract::{FromRequest, Path, Query, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::filter::ReportFilter;
use crate::models::{BulkDelta, CreateReportRequest, ReportDelta, User};
use crate::AppState;

/// Header carrying the id of the authenticated user
pub const USER_HEADER: &str = "x-user-id";

type Params = Query<BTreeMap<String, String>>;

/// JSON request body; malformed payloads are bad requests
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    Json<T>: FromRequest<S, Rejection = axum::extract::rejection::JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/reports", get(list_reports).post(create_report))
        .route("/reports/bulk", post(bulk_update))
        .route("/reports/export", get(export_reports))
        .route("/reports/intersection", get(intersection))
        .route(
            "/reports/:id",
            get(get_report).patch(update_report).delete(delete_report),
        )
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// Resolve the acting user from the request headers
async fn actor(state: &AppState, headers: &HeaderMap) -> Result<User> {
    let id = headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
        .ok_or_else(|| {
            AppError::Forbidden("Authentication credentials were not provided".to_string())
        })?;

    state.service.actor(id).await
}

async fn list_reports(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Params,
) -> Result<Response> {
    let actor = actor(&state, &headers).await?;
    let filter = ReportFilter::from_query(&params)?;
    let list = state.service.list(&actor, &filter).await?;
    Ok(Json(list).into_response())
}

async fn create_report(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    JsonBody(request): JsonBody<CreateReportRequest>,
) -> Result<Response> {
    let actor = actor(&state, &headers).await?;
    let record = state.service.create(&actor, request).await?;
    Ok((StatusCode::CREATED, Json(record)).into_response())
}

async fn get_report(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Response> {
    actor(&state, &headers).await?;
    let record = state.service.get(id).await?;
    Ok(Json(record).into_response())
}

async fn update_report(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    JsonBody(delta): JsonBody<ReportDelta>,
) -> Result<Response> {
    let actor = actor(&state, &headers).await?;
    let record = state.service.update(&actor, id, delta).await?;
    Ok(Json(record).into_response())
}

async fn delete_report(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    let actor = actor(&state, &headers).await?;
    state.service.delete(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn bulk_update(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Params,
    JsonBody(delta): JsonBody<BulkDelta>,
) -> Result<StatusCode> {
    let actor = actor(&state, &headers).await?;
    let filter = ReportFilter::from_query(&params)?;
    state.service.bulk_update(&actor, &filter, delta).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn export_reports(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Params,
) -> Result<Response> {
    let actor = actor(&state, &headers).await?;
    let filter = ReportFilter::from_query(&params)?;
    let file_type = params.get("file_type").map(String::as_str);

    let file = state.service.export(&actor, file_type, &filter).await?;
    let disposition = format!("attachment; filename=\"{}\"", file.filename());

    Ok((
        [
            (header::CONTENT_TYPE, file.file_type.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        file.bytes,
    )
        .into_response())
}

async fn intersection(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Params,
) -> Result<Response> {
    let actor = actor(&state, &headers).await?;
    let filter = ReportFilter::from_query(&params)?;
    let result = state.service.intersection(&actor, &filter).await?;
    Ok(Json(result).into_response())
}
