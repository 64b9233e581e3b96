use axum::{
    extract::{Query, State},
    routing::get,
    Json,
};
use encore_collab::CatalogSearch;
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    context::ServerContext,
    errors::ServerResult,
    serialized::{ToSerialized, Track},
    Router,
};

/// Callers can ask for fewer results, but never more than this
const MAX_RESULTS: usize = 50;

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct CatalogQuery {
    /// Free-text search terms
    pub query: String,
    pub limit: Option<usize>,
}

#[utoipa::path(
    get,
    path = "/v1/catalog",
    tag = "catalog",
    params(CatalogQuery),
    responses(
        (status = 200, body = Vec<Track>),
        (status = 502, description = "The catalog provider is unreachable")
    )
)]
async fn search(
    State(context): State<ServerContext>,
    Query(params): Query<CatalogQuery>,
) -> ServerResult<Json<Vec<Track>>> {
    let limit = params
        .limit
        .unwrap_or(context.encore.config().catalog_limit)
        .min(MAX_RESULTS);

    let candidates = context.catalog.search(&params.query, limit).await?;

    Ok(Json(candidates.to_serialized()))
}

pub fn router() -> Router {
    Router::new().route("/", get(search))
}
