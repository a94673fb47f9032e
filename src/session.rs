use std::collections::HashMap;
use std::time::Duration;

use url::Url;

/// Immutable description of the session a query runs under.
///
/// Everything here is sent to the coordinator as request headers on submit;
/// the client itself only keeps the handful of fields it needs for paging.
#[derive(Debug, Clone)]
pub struct ClientSession {
    /// Base URI of the coordinator, e.g. `http://coordinator:8080`.
    pub server: Url,
    /// Identity reported in `X-Presto-User`. Must be non-empty.
    pub user: String,
    pub source: Option<String>,
    pub catalog: Option<String>,
    pub schema: Option<String>,
    pub time_zone_id: String,
    /// Language tag of the session locale, e.g. `en`.
    pub language: String,
    pub properties: HashMap<String, String>,
    /// Prepared statements carried into the session; keys and values are
    /// percent-encoded on the wire.
    pub prepared_statements: HashMap<String, String>,
    /// Encoded as the literal `NONE` when absent.
    pub transaction_id: Option<String>,
    /// Wall-clock budget for fetching one page, including retries.
    pub client_request_timeout: Duration,
    pub debug: bool,
}

impl ClientSession {
    pub fn new(server: Url, user: impl Into<String>) -> Self {
        Self {
            server,
            user: user.into(),
            source: None,
            catalog: None,
            schema: None,
            time_zone_id: "UTC".to_string(),
            language: "en".to_string(),
            properties: HashMap::new(),
            prepared_statements: HashMap::new(),
            transaction_id: None,
            client_request_timeout: Duration::from_secs(2 * 60),
            debug: false,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_catalog(mut self, catalog: impl Into<String>) -> Self {
        self.catalog = Some(catalog.into());
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_time_zone(mut self, time_zone_id: impl Into<String>) -> Self {
        self.time_zone_id = time_zone_id.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_prepared_statement(
        mut self,
        name: impl Into<String>,
        statement: impl Into<String>,
    ) -> Self {
        self.prepared_statements.insert(name.into(), statement.into());
        self
    }

    pub fn with_transaction_id(mut self, transaction_id: impl Into<String>) -> Self {
        self.transaction_id = Some(transaction_id.into());
        self
    }

    pub fn with_client_request_timeout(mut self, timeout: Duration) -> Self {
        self.client_request_timeout = timeout;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}
