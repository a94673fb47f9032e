use thiserror::Error;

use crate::http::HttpError;

/// Errors surfaced by the statement client and its supporting pieces.
#[derive(Error, Debug)]
pub enum ClientError {
    /// A type signature string could not be parsed.
    #[error("invalid type signature '{signature}': {message}")]
    InvalidTypeSignature { signature: String, message: String },

    /// A JSON value was incompatible with its declared type signature.
    #[error("cannot coerce value {value} to type {signature}")]
    ValueCoercion {
        signature: String,
        value: serde_json::Value,
    },

    /// The server answered with a status or body the protocol refuses.
    #[error("error {task} at {uri} returned HTTP {status}: {message}")]
    Protocol {
        task: &'static str,
        uri: String,
        status: u16,
        message: String,
        /// Raw response body, retained for error reporting.
        body: String,
    },

    /// A transport-level failure that persisted beyond the retry deadline,
    /// or the client was closed while retrying. Carries the last transient
    /// cause when one was observed.
    #[error("error {task}")]
    Transport {
        task: &'static str,
        #[source]
        cause: Option<HttpError>,
    },
}
