use std::sync::Arc;

use url::Url;

use crate::client::{request_failed, StatementClient};
use crate::error::ClientError;
use crate::http::{HttpRequest, HttpTransport, JsonResponse, Method, ReqwestTransport};
use crate::models::ServerInfo;
use crate::session::ClientSession;

/// Entry point that owns the shared transport and hands out statement
/// clients.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    http: Arc<dyn HttpTransport>,
}

impl QueryExecutor {
    pub fn new() -> Self {
        Self::with_transport(Arc::new(ReqwestTransport::new()))
    }

    pub fn with_transport(http: Arc<dyn HttpTransport>) -> Self {
        Self { http }
    }

    /// Submits `query` under `session` and returns the paging client.
    pub async fn start_query(
        &self,
        session: &ClientSession,
        query: &str,
    ) -> Result<StatementClient, ClientError> {
        StatementClient::new(Arc::clone(&self.http), session, query).await
    }

    /// GET /v1/info
    pub async fn server_info(&self, server: &Url) -> Result<ServerInfo, ClientError> {
        let mut uri = server.clone();
        uri.set_path("/v1/info");

        let request = HttpRequest::new(Method::GET, uri.clone());
        let response = self.http.execute(request).await.map_err(|cause| {
            ClientError::Transport {
                task: "fetching server info",
                cause: Some(cause),
            }
        })?;

        let envelope = JsonResponse::<ServerInfo>::new(response);
        if envelope.status() != 200 {
            return Err(request_failed("fetching server info", &uri, &envelope));
        }
        envelope
            .try_into_value()
            .map_err(|envelope| request_failed("fetching server info", &uri, &envelope))
    }
}

impl Default for QueryExecutor {
    fn default() -> Self {
        Self::new()
    }
}
