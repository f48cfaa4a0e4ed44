//! Fetchers: how a table state becomes a page of rows.
//!
//! Anything implementing [`Fetcher`] can back a table. Plain async closures
//! qualify through a blanket impl; [`HttpFetcher`] talks to a JSON endpoint
//! over HTTP/1.1.

use std::future::Future;
use std::marker::PhantomData;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use tablesync_core::{
    FetchResult, LIMIT_KEY, PAGE_KEY, QueryParams, SEARCH_KEY, SORT_BY_KEY, SORT_ORDER_KEY,
    TableState,
};
use tracing::debug;

use crate::error::{FetchError, FetchOutcome};

/// Produces the response for one table state.
pub trait Fetcher: Send + Sync + 'static {
    type Response: Send + 'static;

    fn fetch(&self, state: TableState) -> BoxFuture<'static, FetchOutcome<Self::Response>>;
}

impl<F, Fut, R> Fetcher for F
where
    F: Fn(TableState) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, FetchError>> + Send + 'static,
    R: Send + 'static,
{
    type Response = R;

    fn fetch(&self, state: TableState) -> BoxFuture<'static, FetchOutcome<R>> {
        (self)(state).boxed()
    }
}

/// Query parameters sent to the server for `state`.
///
/// Page and limit are always explicit so the server never has to share the
/// client's idea of the defaults.
pub fn request_params(state: &TableState) -> QueryParams {
    let mut params = QueryParams::new();
    params.append(PAGE_KEY, state.page.to_string());
    params.append(LIMIT_KEY, state.limit.to_string());
    if !state.search.is_empty() {
        params.append(SEARCH_KEY, state.search.clone());
    }
    if !state.sort_by.is_empty() {
        params.append(SORT_BY_KEY, state.sort_by.clone());
        params.append(SORT_ORDER_KEY, state.sort_order.as_str());
    }
    for (key, value) in state.filters.iter() {
        if !value.is_empty() {
            params.append(key, value.to_query());
        }
    }
    params
}

// ── HTTP ─────────────────────────────────────────────────────────────

/// Fetches pages from `GET http://{address}{path}?{params}`.
///
/// The response body must be a JSON [`FetchResult`].
pub struct HttpFetcher<T> {
    address: String,
    path: String,
    timeout: Duration,
    _rows: PhantomData<fn() -> T>,
}

impl<T> HttpFetcher<T> {
    pub fn new(address: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            path: path.into(),
            timeout: Duration::from_secs(10),
            _rows: PhantomData,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Path and query for one state, e.g. `/api/users?page=2&limit=10`.
    pub fn path_and_query(&self, state: &TableState) -> String {
        format!("{}?{}", self.path, request_params(state))
    }
}

impl<T> Fetcher for HttpFetcher<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Response = FetchResult<T>;

    fn fetch(&self, state: TableState) -> BoxFuture<'static, FetchOutcome<FetchResult<T>>> {
        let address = self.address.clone();
        let target = self.path_and_query(&state);
        let timeout = self.timeout;
        async move {
            let body = get_body(&address, &target, timeout).await?;
            serde_json::from_slice::<FetchResult<T>>(&body)
                .map_err(|e| FetchError::Decode(e.to_string()))
        }
        .boxed()
    }
}

/// One GET over a fresh HTTP/1.1 connection. Returns the body of a 2xx.
pub async fn get_body(
    address: &str,
    target: &str,
    timeout: Duration,
) -> FetchOutcome<bytes::Bytes> {
    let uri = format!("http://{address}{target}");

    let result = tokio::time::timeout(timeout, async {
        let stream = tokio::net::TcpStream::connect(address)
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = http::Request::builder()
            .method("GET")
            .uri(target)
            .header("host", address)
            .header("accept", "application/json")
            .header("user-agent", "tablesync/0.1")
            .body(http_body_util::Empty::<bytes::Bytes>::new())
            .map_err(|e| FetchError::Other(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?
            .to_bytes();

        if !status.is_success() {
            debug!(%status, %uri, "fetch non-2xx");
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        debug!(%uri, bytes = body.len(), "fetch complete");
        Ok::<_, FetchError>(body)
    })
    .await;

    match result {
        Ok(body) => body,
        Err(_) => {
            debug!(%uri, "fetch timed out");
            Err(FetchError::Timeout(timeout))
        }
    }
}
