//! REST API Handlers
//!
//! Administrative endpoints for classes, tenants, objects and cluster
//! status. The internal node routes are merged into the same router.

use super::{internal, ApiError, ApiResult};
use crate::cluster::ClusterStatus;
use crate::coordinator::Coordinator;
use crate::domain::object::{NewObject, ObjectId, StorageObject};
use crate::error::{Error, ErrorBody};
use crate::schema::Class;
use crate::tenancy::{TenantEntry, TenantOutcome};
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Tenant creation request item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantRequest {
    pub name: String,
}

/// Per-tenant result of a create call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantCreateResult {
    pub name: String,
    pub created: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

/// Per-tenant result of a delete call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantDeleteResult {
    pub name: String,
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

/// Class listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassList {
    pub classes: Vec<Class>,
}

/// Object write request: the target class plus the object itself
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteObjectRequest {
    pub class: String,
    #[serde(flatten)]
    pub object: NewObject,
}

/// Object write response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteObjectResponse {
    pub id: ObjectId,
    pub class: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TenantQuery {
    pub tenant: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClassQuery {
    pub class: Option<String>,
}

fn outcome_error(outcome: &TenantOutcome) -> Option<ErrorBody> {
    outcome.result.as_ref().err().map(ErrorBody::from)
}

// =============================================================================
// REST Router
// =============================================================================

/// REST API router builder
pub struct RestRouter {
    coordinator: Arc<Coordinator>,
}

impl RestRouter {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self { coordinator }
    }

    /// Build the Axum router
    pub fn build(self) -> Router {
        let store = self.coordinator.store().clone();
        let state = AppState {
            coordinator: self.coordinator,
        };

        Router::new()
            // Schema endpoints
            .route("/v1/schema", post(create_class).get(list_classes))
            .route("/v1/schema/:class", get(get_class).delete(delete_class))
            // Tenant endpoints
            .route(
                "/v1/schema/:class/tenants",
                post(create_tenants).get(list_tenants).delete(delete_tenants),
            )
            // Object endpoints
            .route("/v1/objects", post(write_object))
            .route("/v1/objects/:class/:id", get(get_object))
            // Cluster status
            .route("/v1/nodes", get(cluster_status))
            // Health endpoints
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .with_state(state)
            .merge(internal::routes(store))
    }
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    coordinator: Arc<Coordinator>,
}

// =============================================================================
// Handlers
// =============================================================================

async fn create_class(
    State(state): State<AppState>,
    Json(class): Json<Class>,
) -> ApiResult<impl IntoResponse> {
    info!(class = %class.name, "Creating class");
    let created = state.coordinator.create_class(class).await?;
    Ok((StatusCode::CREATED, Json(created.as_ref().clone())))
}

async fn list_classes(State(state): State<AppState>) -> Json<ClassList> {
    let classes = state
        .coordinator
        .list_classes()
        .into_iter()
        .map(|c| c.as_ref().clone())
        .collect();
    Json(ClassList { classes })
}

async fn get_class(State(state): State<AppState>, Path(class): Path<String>) -> ApiResult<Json<Class>> {
    let class = state.coordinator.get_class(&class)?;
    Ok(Json(class.as_ref().clone()))
}

async fn delete_class(State(state): State<AppState>, Path(class): Path<String>) -> ApiResult<StatusCode> {
    info!(class = %class, "Deleting class");
    state.coordinator.delete_class(&class).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_tenants(
    State(state): State<AppState>,
    Path(class): Path<String>,
    Json(request): Json<Vec<TenantRequest>>,
) -> ApiResult<Json<Vec<TenantCreateResult>>> {
    let names: Vec<String> = request.into_iter().map(|t| t.name).collect();
    info!(class = %class, count = names.len(), "Creating tenants");

    let outcomes = state.coordinator.create_tenants(&class, &names).await?;
    Ok(Json(
        outcomes
            .iter()
            .map(|o| TenantCreateResult {
                name: o.name.clone(),
                created: o.is_ok(),
                error: outcome_error(o),
            })
            .collect(),
    ))
}

async fn list_tenants(
    State(state): State<AppState>,
    Path(class): Path<String>,
) -> ApiResult<Json<Vec<TenantEntry>>> {
    Ok(Json(state.coordinator.list_tenants(&class)?))
}

async fn delete_tenants(
    State(state): State<AppState>,
    Path(class): Path<String>,
    Json(names): Json<Vec<String>>,
) -> ApiResult<Json<Vec<TenantDeleteResult>>> {
    info!(class = %class, count = names.len(), "Deleting tenants");

    let outcomes = state.coordinator.delete_tenants(&class, &names).await?;
    Ok(Json(
        outcomes
            .iter()
            .map(|o| TenantDeleteResult {
                name: o.name.clone(),
                deleted: o.is_ok(),
                error: outcome_error(o),
            })
            .collect(),
    ))
}

async fn write_object(
    State(state): State<AppState>,
    Json(request): Json<WriteObjectRequest>,
) -> ApiResult<impl IntoResponse> {
    let id = state
        .coordinator
        .write_object(&request.class, request.object)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(WriteObjectResponse {
            id,
            class: request.class,
        }),
    ))
}

async fn get_object(
    State(state): State<AppState>,
    Path((class, id)): Path<(String, String)>,
    Query(query): Query<TenantQuery>,
) -> ApiResult<Json<StorageObject>> {
    let id: ObjectId = id
        .parse()
        .map_err(|_| ApiError(Error::InvalidObject(format!("'{}' is not a valid object id", id))))?;
    let object = state
        .coordinator
        .get_object(&class, id, query.tenant.as_deref())
        .await?;
    Ok(Json(object))
}

async fn cluster_status(
    State(state): State<AppState>,
    Query(query): Query<ClassQuery>,
) -> ApiResult<Json<ClusterStatus>> {
    Ok(Json(state.coordinator.cluster_status(query.class.as_deref()).await?))
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.coordinator.membership().stats();
    if stats.online_nodes > 0 {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "no live nodes")
    }
}
