//! The statement client: submits a query, pages through results via
//! `nextUri`, harvests session mutations from response headers, and supports
//! partial and full cancellation.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;

use crate::error::ClientError;
use crate::headers::{
    split_session_header, url_decode, url_encode, CONTENT_TYPE, PRESTO_ADDED_PREPARE,
    PRESTO_CATALOG, PRESTO_CLEAR_SESSION, PRESTO_CLEAR_TRANSACTION_ID,
    PRESTO_DEALLOCATED_PREPARE, PRESTO_LANGUAGE, PRESTO_PREPARED_STATEMENT, PRESTO_SCHEMA,
    PRESTO_SESSION, PRESTO_SET_SESSION, PRESTO_SOURCE, PRESTO_STARTED_TRANSACTION_ID,
    PRESTO_TIME_ZONE, PRESTO_TRANSACTION_ID, PRESTO_USER, USER_AGENT, USER_AGENT_VALUE,
};
use crate::http::{
    execute_detached, Headers, HttpError, HttpRequest, HttpTransport, JsonResponse, Method,
};
use crate::models::{QueryResults, StatementStats};
use crate::session::ClientSession;

const RETRY_BACKOFF_STEP: Duration = Duration::from_millis(100);

/// Session mutations pushed back by the server, accumulated across pages.
#[derive(Debug, Default)]
struct SessionMutations {
    set_session_properties: HashMap<String, String>,
    reset_session_properties: HashSet<String>,
    added_prepared_statements: HashMap<String, String>,
    deallocated_prepared_statements: HashSet<String>,
    started_transaction_id: Option<String>,
    clear_transaction_id: bool,
}

/// Drives one query through the coordinator's statement protocol.
///
/// Thread-safe: one task pages with [`advance`](Self::advance) while others
/// observe [`current`](Self::current), the predicates, and the session
/// mutation snapshots. `advance` itself must not be called concurrently with
/// itself.
#[derive(Debug)]
pub struct StatementClient {
    http: Arc<dyn HttpTransport>,
    query: String,
    user: String,
    time_zone_id: String,
    debug: bool,
    request_timeout: Duration,
    current_results: RwLock<Arc<QueryResults>>,
    mutations: Mutex<SessionMutations>,
    valid: AtomicBool,
    closed: AtomicBool,
    gone: AtomicBool,
}

impl StatementClient {
    /// Submits `query` and returns a client positioned on the first page.
    pub async fn new(
        http: Arc<dyn HttpTransport>,
        session: &ClientSession,
        query: impl Into<String>,
    ) -> Result<Self, ClientError> {
        let query = query.into();
        let request = build_query_request(session, &query);
        if session.debug {
            debug!(uri = %request.uri, "submitting query");
        }

        let response = http.execute(request.clone()).await.map_err(|cause| {
            ClientError::Transport {
                task: "starting query",
                cause: Some(cause),
            }
        })?;
        let envelope = JsonResponse::<QueryResults>::new(response);
        if envelope.status() != 200 {
            return Err(request_failed("starting query", &request.uri, &envelope));
        }
        let headers = envelope.headers().clone();
        let results = match envelope.try_into_value() {
            Ok(results) => results,
            Err(envelope) => {
                return Err(request_failed("starting query", &request.uri, &envelope))
            }
        };

        let mut mutations = SessionMutations::default();
        apply_session_headers(&mut mutations, &headers)
            .map_err(|message| header_error(&request.uri, message))?;

        Ok(Self {
            http,
            query,
            user: session.user.clone(),
            time_zone_id: session.time_zone_id.clone(),
            debug: session.debug,
            request_timeout: session.client_request_timeout,
            current_results: RwLock::new(Arc::new(results)),
            mutations: Mutex::new(mutations),
            valid: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            gone: AtomicBool::new(false),
        })
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn time_zone_id(&self) -> &str {
        &self.time_zone_id
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn is_gone(&self) -> bool {
        self.gone.load(Ordering::SeqCst)
    }

    /// True while the cursor can still produce pages.
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst) && !self.is_gone() && !self.is_closed()
    }

    /// True when the latest page carries a query error.
    pub fn is_failed(&self) -> bool {
        self.current_results.read().error.is_some()
    }

    pub fn stats(&self) -> StatementStats {
        self.current_results.read().stats.clone()
    }

    /// The latest page.
    ///
    /// # Panics
    ///
    /// Panics when the cursor is no longer valid; use
    /// [`final_results`](Self::final_results) past the end.
    pub fn current(&self) -> Arc<QueryResults> {
        assert!(
            self.is_valid(),
            "current position is not valid (cursor past end)"
        );
        Arc::clone(&*self.current_results.read())
    }

    /// The terminal page, once paging has ended or the query failed.
    ///
    /// # Panics
    ///
    /// Panics while the cursor is still valid and the query has not failed.
    pub fn final_results(&self) -> Arc<QueryResults> {
        assert!(
            !self.is_valid() || self.is_failed(),
            "current position is still valid"
        );
        Arc::clone(&*self.current_results.read())
    }

    pub fn set_session_properties(&self) -> HashMap<String, String> {
        self.mutations.lock().set_session_properties.clone()
    }

    pub fn reset_session_properties(&self) -> HashSet<String> {
        self.mutations.lock().reset_session_properties.clone()
    }

    pub fn added_prepared_statements(&self) -> HashMap<String, String> {
        self.mutations.lock().added_prepared_statements.clone()
    }

    pub fn deallocated_prepared_statements(&self) -> HashSet<String> {
        self.mutations.lock().deallocated_prepared_statements.clone()
    }

    pub fn started_transaction_id(&self) -> Option<String> {
        self.mutations.lock().started_transaction_id.clone()
    }

    pub fn is_clear_transaction_id(&self) -> bool {
        self.mutations.lock().clear_transaction_id
    }

    /// Fetches the next page.
    ///
    /// Returns `Ok(false)` and invalidates the cursor when the stream is
    /// exhausted or the client was closed. Transient failures (503, transport
    /// errors) are retried with backoff until the session's request timeout
    /// elapses. Must not be called concurrently with itself.
    pub async fn advance(&self) -> Result<bool, ClientError> {
        let next_uri = self.current_results.read().next_uri.clone();
        let next_uri = match next_uri {
            Some(uri) if !self.is_closed() => uri,
            _ => {
                self.valid.store(false, Ordering::SeqCst);
                return Ok(false);
            }
        };

        let request = self.prepare_request(Method::GET, next_uri.clone());
        let deadline = Instant::now() + self.request_timeout;
        let mut attempts: u32 = 0;
        let mut cause: Option<HttpError> = None;

        loop {
            // back-off on retry
            if attempts > 0 {
                let backoff = RETRY_BACKOFF_STEP * attempts;
                let remaining = deadline.duration_since(Instant::now());
                tokio::time::sleep(backoff.min(remaining)).await;
            }
            attempts += 1;

            if self.debug {
                debug!(uri = %next_uri, attempt = attempts, "fetching next page");
            }

            match self.http.execute(request.clone()).await {
                Err(error) => {
                    warn!(uri = %next_uri, attempt = attempts, error = %error,
                        "page fetch failed, will retry");
                    cause = Some(error);
                }
                Ok(response) => {
                    let envelope = JsonResponse::<QueryResults>::new(response);
                    if envelope.status() == 200 && envelope.has_value() {
                        self.process_response(envelope, &next_uri)?;
                        return Ok(true);
                    }
                    if envelope.status() != 503 {
                        self.gone.store(true, Ordering::SeqCst);
                        return Err(request_failed("fetching next", &next_uri, &envelope));
                    }
                    // 503 means the coordinator is shedding load; back off
                    // and retry like a transport failure.
                }
            }

            if Instant::now() >= deadline || self.is_closed() {
                break;
            }
        }

        self.gone.store(true, Ordering::SeqCst);
        Err(ClientError::Transport {
            task: "fetching next",
            cause,
        })
    }

    /// Applies session-mutation headers, then publishes the new page.
    /// Mutations must be visible to any reader that observes the page.
    fn process_response(
        &self,
        envelope: JsonResponse<QueryResults>,
        uri: &Url,
    ) -> Result<(), ClientError> {
        let headers = envelope.headers().clone();
        let results = match envelope.try_into_value() {
            Ok(results) => results,
            Err(envelope) => {
                self.gone.store(true, Ordering::SeqCst);
                return Err(request_failed("fetching next", uri, &envelope));
            }
        };

        {
            let mut mutations = self.mutations.lock();
            apply_session_headers(&mut mutations, &headers).map_err(|message| {
                self.gone.store(true, Ordering::SeqCst);
                header_error(uri, message)
            })?;
        }
        *self.current_results.write() = Arc::new(results);
        Ok(())
    }

    /// Asks the server to cancel the bottommost stage of the query, waiting
    /// up to `timeout` for the answer. Returns whether the server accepted.
    /// Never changes the client's lifecycle state.
    ///
    /// # Panics
    ///
    /// Panics when the client is closed.
    pub async fn cancel_leaf_stage(&self, timeout: Duration) -> Result<bool, ClientError> {
        assert!(!self.is_closed(), "client is closed");

        let uri = match self.current().partial_cancel_uri.clone() {
            Some(uri) => uri,
            None => return Ok(false),
        };
        if self.debug {
            debug!(uri = %uri, "canceling leaf stage");
        }

        let request = self.prepare_request(Method::DELETE, uri);
        let handle = execute_detached(&self.http, request);
        match handle.wait(timeout).await {
            Ok(Some(status)) => Ok(status.is_success()),
            Ok(None) => Ok(false),
            Err(cause) => Err(ClientError::Transport {
                task: "canceling leaf stage",
                cause: Some(cause),
            }),
        }
    }

    /// Closes the client. Idempotent; the first call fires one best-effort
    /// DELETE to release server-side resources, without awaiting it.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let next_uri = self.current_results.read().next_uri.clone();
            if let Some(uri) = next_uri {
                let request = self.prepare_request(Method::DELETE, uri);
                execute_detached(&self.http, request);
            }
        }
    }

    fn prepare_request(&self, method: Method, uri: Url) -> HttpRequest {
        HttpRequest::new(method, uri)
            .header(PRESTO_USER, &self.user)
            .header(USER_AGENT, USER_AGENT_VALUE)
    }
}

fn build_query_request(session: &ClientSession, query: &str) -> HttpRequest {
    let mut uri = session.server.clone();
    uri.set_path("/v1/statement");

    let mut request = HttpRequest::new(Method::POST, uri)
        .header(PRESTO_USER, &session.user)
        .header(USER_AGENT, USER_AGENT_VALUE)
        .header(CONTENT_TYPE, "application/octet-stream");

    if let Some(source) = &session.source {
        request = request.header(PRESTO_SOURCE, source);
    }
    if let Some(catalog) = &session.catalog {
        request = request.header(PRESTO_CATALOG, catalog);
    }
    if let Some(schema) = &session.schema {
        request = request.header(PRESTO_SCHEMA, schema);
    }
    request = request
        .header(PRESTO_TIME_ZONE, &session.time_zone_id)
        .header(PRESTO_LANGUAGE, &session.language);

    for (key, value) in &session.properties {
        request = request.header(PRESTO_SESSION, format!("{key}={value}"));
    }
    for (name, statement) in &session.prepared_statements {
        request = request.header(
            PRESTO_PREPARED_STATEMENT,
            format!("{}={}", url_encode(name), url_encode(statement)),
        );
    }
    request = request.header(
        PRESTO_TRANSACTION_ID,
        session.transaction_id.as_deref().unwrap_or("NONE"),
    );

    request.body(query.as_bytes().to_vec())
}

fn apply_session_headers(
    mutations: &mut SessionMutations,
    headers: &Headers,
) -> Result<(), String> {
    for value in headers.get_all(PRESTO_SET_SESSION) {
        match split_session_header(value) {
            Some((key, val)) => {
                mutations.set_session_properties.insert(key, val);
            }
            None => debug!(header = value, "dropping malformed set-session header"),
        }
    }
    for value in headers.get_all(PRESTO_CLEAR_SESSION) {
        mutations.reset_session_properties.insert(value.to_string());
    }

    for value in headers.get_all(PRESTO_ADDED_PREPARE) {
        if let Some((name, statement)) = split_session_header(value) {
            let name = url_decode(&name)
                .map_err(|e| format!("malformed {PRESTO_ADDED_PREPARE} header: {e}"))?;
            let statement = url_decode(&statement)
                .map_err(|e| format!("malformed {PRESTO_ADDED_PREPARE} header: {e}"))?;
            mutations.added_prepared_statements.insert(name, statement);
        }
    }
    for value in headers.get_all(PRESTO_DEALLOCATED_PREPARE) {
        let name = url_decode(value)
            .map_err(|e| format!("malformed {PRESTO_DEALLOCATED_PREPARE} header: {e}"))?;
        mutations.deallocated_prepared_statements.insert(name);
    }

    if let Some(transaction_id) = headers.get(PRESTO_STARTED_TRANSACTION_ID) {
        mutations.started_transaction_id = Some(transaction_id.to_string());
    }
    if headers.get(PRESTO_CLEAR_TRANSACTION_ID).is_some() {
        mutations.clear_transaction_id = true;
    }
    Ok(())
}

pub(crate) fn request_failed<T>(
    task: &'static str,
    uri: &Url,
    envelope: &JsonResponse<T>,
) -> ClientError {
    let message = if envelope.has_value() {
        envelope.reason().to_string()
    } else {
        match envelope.decode_error() {
            Some(error) => format!("invalid response: {error}"),
            None => "invalid response".to_string(),
        }
    };
    ClientError::Protocol {
        task,
        uri: uri.to_string(),
        status: envelope.status(),
        message,
        body: envelope.body_text().into_owned(),
    }
}

fn header_error(uri: &Url, message: String) -> ClientError {
    ClientError::Protocol {
        task: "processing response",
        uri: uri.to_string(),
        status: 200,
        message,
        body: String::new(),
    }
}
