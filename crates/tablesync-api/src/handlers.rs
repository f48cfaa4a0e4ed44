//! REST API handlers.

use axum::Json;
use axum::extract::{RawQuery, State};
use axum::response::IntoResponse;
use tablesync_core::{FetchResult, QueryParams, decode};
use tracing::debug;

use crate::ApiState;
use crate::dataset::{User, UserFilters, query_users};

/// GET /api/users
///
/// Malformed `page`/`limit` values are coerced, never rejected.
pub async fn list_users(
    State(state): State<ApiState>,
    RawQuery(query): RawQuery,
) -> impl IntoResponse {
    let params = QueryParams::parse(query.as_deref().unwrap_or_default());
    let table = decode(&params, &state.defaults).typed::<UserFilters>();
    let page: FetchResult<User> = query_users(&state.users, &table);
    debug!(
        page = table.page,
        limit = table.limit,
        search = %table.search,
        sort_by = %table.sort_by,
        total = page.total,
        rows = page.data.len(),
        "users listed"
    );
    Json(page)
}
