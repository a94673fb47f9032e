//! Client driver for submitting SQL statements to a Presto coordinator and
//! paging through results over HTTP.
//!
//! The entry point is [`QueryExecutor`], which owns the shared transport and
//! starts queries; each query is driven by a [`StatementClient`] that pages
//! through results via the `nextUri` chain, harvests session mutations from
//! response headers, and supports partial and full cancellation:
//!
//! ```no_run
//! use presto_statement_client::{ClientSession, QueryExecutor};
//! use url::Url;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = Url::parse("http://coordinator:8080")?;
//! let session = ClientSession::new(server, "alice")
//!     .with_catalog("hive")
//!     .with_schema("default");
//!
//! let executor = QueryExecutor::new();
//! let client = executor.start_query(&session, "SELECT 1").await?;
//! while client.is_valid() {
//!     if let Some(rows) = &client.current().data {
//!         for row in rows {
//!             println!("{row:?}");
//!         }
//!     }
//!     client.advance().await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod executor;
pub mod headers;
pub mod http;
pub mod models;
pub mod session;
pub mod signature;
pub mod value;

pub use client::StatementClient;
pub use error::ClientError;
pub use executor::QueryExecutor;
pub use http::{
    HttpError, HttpRequest, HttpResponse, HttpTransport, JsonResponse, ReqwestTransport,
    StatusResponse,
};
pub use models::{Column, QueryError, QueryResults, ServerInfo, StatementStats};
pub use session::ClientSession;
pub use signature::{TypeSignature, TypeSignatureParameter};
pub use value::Value;
