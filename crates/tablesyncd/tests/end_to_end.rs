//! End-to-end tests.
//!
//! Runs the users API on an ephemeral port and drives it through the
//! client engine: URL store, query orchestrator, HTTP fetcher and
//! debounced search.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tablesync_api::{Status, User, build_router, generate_users};
use tablesync_core::{FilterValue, SortOrder, TableDefaults};
use tablesync_export::{ExportColumn, ExportFormat};
use tablesync_query::{
    FetchError, HttpFetcher, QueryOptions, ServerTable, ServerTableOptions, TableQuery,
    ViewStatus,
};
use tablesync_state::{History, Navigator};
use tower::ServiceExt;

/// Serve `rows` fixture users on 127.0.0.1 and return the address.
async fn spawn_server(rows: usize) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, build_router(generate_users(rows)))
            .await
            .unwrap();
    });
    addr.to_string()
}

fn users_table(addr: &str, href: &str) -> (Arc<History>, ServerTable<User, Arc<History>>) {
    let history = Arc::new(History::at(href));
    let fetcher = HttpFetcher::<User>::new(addr, "/api/users").with_timeout(Duration::from_secs(5));
    let query = TableQuery::new(
        fetcher,
        QueryOptions {
            max_retries: 0,
            ..QueryOptions::default()
        }
        .namespace("users"),
    );
    let options = ServerTableOptions {
        debounce: Duration::from_millis(50),
        ..ServerTableOptions::default()
    };
    let table = ServerTable::spawn(history.clone(), query, options);
    (history, table)
}

fn sorted_active_ids(desc: bool) -> Vec<String> {
    let mut active: Vec<User> = generate_users(500)
        .into_iter()
        .filter(|u| u.status == Status::Active)
        .collect();
    active.sort_by(|a, b| {
        let ord = a
            .name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.name.cmp(&b.name));
        if desc { ord.reverse() } else { ord }
    });
    active.into_iter().map(|u| u.id).collect()
}

// ── Router ─────────────────────────────────────────────────────────

#[tokio::test]
async fn router_serves_users_page() {
    let router = build_router(generate_users(30));

    let req = Request::builder()
        .uri("/api/users?limit=25&page=2")
        .body(Body::empty())
        .unwrap();

    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["total"], 30);
    assert_eq!(json["totalPages"], 2);
    assert_eq!(json["data"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn unknown_route_is_404() {
    let router = build_router(generate_users(1));
    let req = Request::builder()
        .uri("/api/orders")
        .body(Body::empty())
        .unwrap();
    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// ── Client engine against a live server ────────────────────────────

#[tokio::test]
async fn filtered_sorted_page_over_http() {
    let addr = spawn_server(500).await;
    let (history, table) = users_table(
        &addr,
        "/users?page=2&limit=10&sort_by=name&sort_order=desc&status=active",
    );

    let snap = table.settled().await;
    assert_eq!(snap.status(), ViewStatus::Ready);
    assert_eq!(snap.total(), 120);
    assert_eq!(snap.total_pages(), 12);
    let ids: Vec<String> = snap.rows().iter().map(|u| u.id.clone()).collect();
    assert_eq!(ids, sorted_active_ids(true)[10..20].to_vec());

    let window = table.page_window();
    assert_eq!((window.start_record, window.end_record), (11, 20));

    // Already complete: nothing to sync, no extra history entry.
    assert_eq!(history.len(), 1);
    table.shutdown().await;
}

#[tokio::test]
async fn toggling_sort_and_going_back() {
    let addr = spawn_server(500).await;
    let (history, table) = users_table(&addr, "/users?status=active");
    table.settled().await;

    table.toggle_sort("name");
    let state = table.params();
    assert_eq!(state.sort_by, "name");
    assert_eq!(state.sort_order, SortOrder::Asc);
    let snap = table.settled().await;
    let ids: Vec<String> = snap.rows().iter().map(|u| u.id.clone()).collect();
    assert_eq!(ids, sorted_active_ids(false)[..10].to_vec());

    table.toggle_sort("name");
    assert_eq!(table.params().sort_order, SortOrder::Desc);
    table.toggle_sort("name");
    assert_eq!(table.params().sort_by, "");

    // Back twice lands on the ascending sort again.
    assert!(history.back());
    assert!(history.back());
    assert_eq!(table.params().sort_order, SortOrder::Asc);
    let snap = table.settled().await;
    assert_eq!(snap.rows()[0].id, sorted_active_ids(false)[0]);
    table.shutdown().await;
}

#[tokio::test]
async fn search_is_debounced_into_the_url() {
    let addr = spawn_server(200).await;
    let (history, table) = users_table(&addr, "/users?page=3");
    table.settled().await;
    let before = history.len();

    for partial in ["h", "hu", "hum", "huma", "human"] {
        table.type_search(partial);
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    // One navigation for the whole burst.
    assert_eq!(history.len(), before + 1);
    let state = table.params();
    assert_eq!(state.search, "human");
    assert_eq!(state.page, 1);

    let snap = table.settled().await;
    assert!(snap.total() > 0);
    assert!(snap.rows().iter().all(|u| u.department == "Human Resources"));
    assert!(table.has_active_filters());
    table.shutdown().await;
}

#[tokio::test]
async fn filter_and_reset() {
    let addr = spawn_server(100).await;
    let (_history, table) = users_table(&addr, "/users");
    table.settled().await;

    table.set_filter("role", Some(FilterValue::from("admin"))).unwrap();
    let snap = table.settled().await;
    assert_eq!(snap.total(), 10);

    assert!(table.set_filter("page", Some(FilterValue::from("x"))).is_err());

    table.reset_filters();
    let snap = table.settled().await;
    assert_eq!(snap.total(), 100);
    table.shutdown().await;
}

#[tokio::test]
async fn server_down_surfaces_error() {
    // Bind then drop, so nothing listens on the port.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let (_history, table) = users_table(&addr, "/users");
    let snap = table.settled().await;
    assert_eq!(snap.status(), ViewStatus::Error);
    assert!(matches!(snap.error, Some(FetchError::Transport(_))));
    table.shutdown().await;
}

#[tokio::test]
async fn exported_page_matches_rows() {
    let addr = spawn_server(50).await;
    let (_history, table) = users_table(&addr, "/users?limit=5");
    let snap = table.settled().await;

    let columns = vec![
        ExportColumn::new("id", "ID"),
        ExportColumn::new("name", "Name"),
        ExportColumn::new("status", "Status"),
    ];
    let csv = ExportFormat::Csv.render(snap.rows(), &columns).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "ID,Name,Status");
    assert_eq!(lines.len(), 6);
    assert!(lines[1].starts_with("user-1,"));

    let tsv = ExportFormat::Tsv.render(snap.rows(), &columns).unwrap();
    assert_eq!(tsv.lines().count(), 6);
    table.shutdown().await;
}

#[tokio::test]
async fn limit_default_is_not_written_back() {
    let addr = spawn_server(50).await;
    let history = Arc::new(History::at("/users"));
    let query = TableQuery::new(
        HttpFetcher::<User>::new(&addr, "/api/users"),
        QueryOptions::default(),
    );
    let options = ServerTableOptions {
        defaults: TableDefaults { limit: 25 },
        ..ServerTableOptions::default()
    };
    let table = ServerTable::spawn(history.clone(), query, options);

    // First load writes the raw defaults once, in place.
    assert_eq!(history.current().href(), "/users?page=1&limit=25&sort_order=asc");
    let snap = table.settled().await;
    assert_eq!(snap.rows().len(), 25);

    // Any later mutation canonicalizes: defaults drop out of the URL.
    table.change_page(2);
    assert_eq!(history.current().href(), "/users?page=2");
    let snap = table.settled().await;
    assert_eq!(snap.rows()[0].id, "user-26");
    table.shutdown().await;
}
