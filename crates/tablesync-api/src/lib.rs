//! tablesync-api — REST endpoint for server-driven tables.
//!
//! Serves a users table over the same query-parameter contract the client
//! engine writes into its URL.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/users` | One page of users (`page`, `limit`, `search`, `sort_by`, `sort_order`, `status`, `role`, `department`) |

pub mod dataset;
pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tablesync_core::TableDefaults;

pub use dataset::{Role, Status, User, UserFilters, generate_users, query_users};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub users: Arc<Vec<User>>,
    /// Applied when a request omits or mangles `limit`.
    pub defaults: TableDefaults,
}

/// Build the API router over a fixed set of users.
pub fn build_router(users: Vec<User>) -> Router {
    let state = ApiState {
        users: Arc::new(users),
        defaults: TableDefaults::default(),
    };

    Router::new()
        .route("/api/users", get(handlers::list_users))
        .with_state(state)
}
