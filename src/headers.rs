//! Names of the custom headers that carry query context to the coordinator
//! and session mutations back from it, plus the wire encoding helpers for
//! prepared-statement headers.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

pub const PRESTO_USER: &str = "X-Presto-User";
pub const PRESTO_SOURCE: &str = "X-Presto-Source";
pub const PRESTO_CATALOG: &str = "X-Presto-Catalog";
pub const PRESTO_SCHEMA: &str = "X-Presto-Schema";
pub const PRESTO_TIME_ZONE: &str = "X-Presto-Time-Zone";
pub const PRESTO_LANGUAGE: &str = "X-Presto-Language";
pub const PRESTO_SESSION: &str = "X-Presto-Session";
pub const PRESTO_PREPARED_STATEMENT: &str = "X-Presto-Prepared-Statement";
pub const PRESTO_TRANSACTION_ID: &str = "X-Presto-Transaction-Id";

pub const PRESTO_SET_SESSION: &str = "X-Presto-Set-Session";
pub const PRESTO_CLEAR_SESSION: &str = "X-Presto-Clear-Session";
pub const PRESTO_ADDED_PREPARE: &str = "X-Presto-Added-Prepare";
pub const PRESTO_DEALLOCATED_PREPARE: &str = "X-Presto-Deallocated-Prepare";
pub const PRESTO_STARTED_TRANSACTION_ID: &str = "X-Presto-Started-Transaction-Id";
pub const PRESTO_CLEAR_TRANSACTION_ID: &str = "X-Presto-Clear-Transaction-Id";

pub const USER_AGENT: &str = "User-Agent";
pub const CONTENT_TYPE: &str = "Content-Type";

pub const USER_AGENT_VALUE: &str = concat!("StatementClient/", env!("CARGO_PKG_VERSION"));

/// Splits a `key=value` session header on the first `=`, trimming both sides.
/// Returns `None` when the separator is missing; such entries are dropped.
pub fn split_session_header(value: &str) -> Option<(String, String)> {
    let (key, val) = value.split_once('=')?;
    Some((key.trim().to_string(), val.trim().to_string()))
}

// Everything outside [a-zA-Z0-9._*-] is escaped, matching the form encoding
// the coordinator decodes these headers with.
const FORM_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'.')
    .remove(b'-')
    .remove(b'_')
    .remove(b'*');

/// Percent-encodes one side of a prepared-statement header.
pub fn url_encode(value: &str) -> String {
    utf8_percent_encode(value, FORM_ENCODE).to_string()
}

/// Decodes one side of a prepared-statement header. `+` is treated as a
/// space. Fails when the decoded bytes are not valid UTF-8.
pub fn url_decode(value: &str) -> Result<String, std::str::Utf8Error> {
    let folded = value.replace('+', " ");
    percent_decode_str(&folded)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
}
