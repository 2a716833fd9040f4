//! Internal API
//!
//! Routes other nodes use to reach the shards this node owns. These are the
//! server side of `HttpNodeClient`.

use super::{ApiError, ApiResult};
use crate::cluster::PutAck;
use crate::domain::object::{ObjectId, StorageObject};
use crate::domain::ports::{NodeStatus, ShardSpec};
use crate::error::Error;
use crate::shard::LocalShardStore;
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tracing::debug;

/// Build the internal routes over the local shard store
pub fn routes(store: Arc<LocalShardStore>) -> Router {
    Router::new()
        .route("/internal/shards", post(create_shard))
        .route("/internal/shards/:class/:shard", delete(delete_shard))
        .route("/internal/shards/:class/:shard/objects", put(put_object))
        .route("/internal/shards/:class/:shard/objects/:id", get(get_object))
        .route("/internal/status", get(local_status))
        .with_state(store)
}

async fn create_shard(
    State(store): State<Arc<LocalShardStore>>,
    Json(spec): Json<ShardSpec>,
) -> ApiResult<StatusCode> {
    debug!(class = %spec.class, shard = %spec.shard, "Shard creation requested by peer");
    store.create_shard(spec)?;
    Ok(StatusCode::CREATED)
}

async fn delete_shard(
    State(store): State<Arc<LocalShardStore>>,
    Path((class, shard)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    store.delete_shard(&class, &shard)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn put_object(
    State(store): State<Arc<LocalShardStore>>,
    Path((class, shard)): Path<(String, String)>,
    Json(object): Json<StorageObject>,
) -> ApiResult<Json<PutAck>> {
    let id = store.put_object(&class, &shard, object)?;
    Ok(Json(PutAck { id }))
}

async fn get_object(
    State(store): State<Arc<LocalShardStore>>,
    Path((class, shard, id)): Path<(String, String, String)>,
) -> ApiResult<Json<StorageObject>> {
    let id: ObjectId = id
        .parse()
        .map_err(|_| ApiError(Error::InvalidObject(format!("'{}' is not a valid object id", id))))?;
    Ok(Json(store.get_object(&class, &shard, id)?))
}

async fn local_status(State(store): State<Arc<LocalShardStore>>) -> Json<NodeStatus> {
    Json(store.status())
}
