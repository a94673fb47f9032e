//! Wire DTOs for the coordinator's JSON responses.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;
use url::Url;

use crate::signature::TypeSignature;
use crate::value::{fix_value, Value};

/// One result column: the wire name, the raw signature text, and the parsed
/// signature (parsed once per page).
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    /// Raw signature text as sent by the server, e.g. `array(bigint)`.
    pub type_name: String,
    pub type_signature: TypeSignature,
}

#[derive(Deserialize)]
struct RawColumn {
    name: String,
    #[serde(rename = "type")]
    type_name: String,
}

impl<'de> Deserialize<'de> for Column {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = RawColumn::deserialize(deserializer)?;
        let type_signature = TypeSignature::parse(&raw.type_name).map_err(D::Error::custom)?;
        Ok(Column {
            name: raw.name,
            type_name: raw.type_name,
            type_signature,
        })
    }
}

/// One page of query results.
///
/// Deserialization materializes `data` eagerly and fixes every cell against
/// its column signature, so a page that decodes successfully is fully typed.
#[derive(Debug, Clone)]
pub struct QueryResults {
    pub id: String,
    pub info_uri: Url,
    pub partial_cancel_uri: Option<Url>,
    /// Absent on the terminal page.
    pub next_uri: Option<Url>,
    pub columns: Option<Vec<Column>>,
    pub data: Option<Vec<Vec<Value>>>,
    pub stats: StatementStats,
    pub error: Option<QueryError>,
    pub update_type: Option<String>,
    pub update_count: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQueryResults {
    id: String,
    info_uri: Url,
    #[serde(default)]
    partial_cancel_uri: Option<Url>,
    #[serde(default)]
    next_uri: Option<Url>,
    #[serde(default)]
    columns: Option<Vec<Column>>,
    #[serde(default)]
    data: Option<Vec<Vec<JsonValue>>>,
    stats: StatementStats,
    #[serde(default)]
    error: Option<QueryError>,
    #[serde(default)]
    update_type: Option<String>,
    #[serde(default)]
    update_count: Option<i64>,
}

impl<'de> Deserialize<'de> for QueryResults {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = RawQueryResults::deserialize(deserializer)?;

        let data = match raw.data {
            None => None,
            Some(rows) => {
                let columns = raw
                    .columns
                    .as_ref()
                    .ok_or_else(|| D::Error::custom("data present without columns"))?;
                let mut fixed_rows = Vec::with_capacity(rows.len());
                for row in rows {
                    if row.len() != columns.len() {
                        return Err(D::Error::custom(format!(
                            "row/column size mismatch: {} values, {} columns",
                            row.len(),
                            columns.len()
                        )));
                    }
                    let mut fixed = Vec::with_capacity(row.len());
                    for (column, value) in columns.iter().zip(row) {
                        fixed.push(
                            fix_value(&column.type_signature, value).map_err(D::Error::custom)?,
                        );
                    }
                    fixed_rows.push(fixed);
                }
                Some(fixed_rows)
            }
        };

        Ok(QueryResults {
            id: raw.id,
            info_uri: raw.info_uri,
            partial_cancel_uri: raw.partial_cancel_uri,
            next_uri: raw.next_uri,
            columns: raw.columns,
            data,
            stats: raw.stats,
            error: raw.error,
            update_type: raw.update_type,
            update_count: raw.update_count,
        })
    }
}

/// Progress counters for the whole query.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatementStats {
    /// Examples: "QUEUED", "RUNNING", "FINISHED", "FAILED"
    pub state: String,
    pub queued: bool,
    pub scheduled: bool,
    pub nodes: u64,
    pub total_splits: u64,
    pub queued_splits: u64,
    pub running_splits: u64,
    pub completed_splits: u64,
    pub user_time_millis: u64,
    pub cpu_time_millis: u64,
    pub wall_time_millis: u64,
    pub processed_rows: u64,
    pub processed_bytes: u64,
    pub root_stage: Option<StageStats>,
}

/// Per-stage progress counters, nested through `sub_stages`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StageStats {
    pub stage_id: Option<String>,
    pub state: String,
    pub done: bool,
    pub nodes: u64,
    pub total_splits: u64,
    pub queued_splits: u64,
    pub running_splits: u64,
    pub completed_splits: u64,
    pub user_time_millis: u64,
    pub cpu_time_millis: u64,
    pub wall_time_millis: u64,
    pub processed_rows: u64,
    pub processed_bytes: u64,
    pub sub_stages: Vec<StageStats>,
}

/// The failure a terminal page may carry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryError {
    pub message: String,
    pub sql_state: Option<String>,
    pub error_code: i32,
    pub error_name: Option<String>,
    pub error_type: Option<String>,
    pub error_location: Option<ErrorLocation>,
    pub failure_info: Option<FailureInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ErrorLocation {
    pub line_number: i32,
    pub column_number: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FailureInfo {
    #[serde(rename = "type")]
    pub error_type: Option<String>,
    pub message: Option<String>,
    pub cause: Option<Box<FailureInfo>>,
    pub suppressed: Vec<FailureInfo>,
    pub stack: Vec<String>,
    pub error_location: Option<ErrorLocation>,
}

/// Answer of `GET /v1/info`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub node_version: NodeVersion,
    pub environment: String,
    pub coordinator: bool,
    #[serde(default)]
    pub uptime: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeVersion {
    pub version: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn page_with_typed_data_decodes_and_fixes() {
        let page = json!({
            "id": "20160128_214710_00012_rk68b",
            "infoUri": "http://localhost:8080/query.html?20160128",
            "partialCancelUri": "http://localhost:8080/v1/stage/20160128.0",
            "nextUri": "http://localhost:8080/v1/statement/20160128/1",
            "columns": [
                {"name": "_col0", "type": "bigint"},
                {"name": "_col1", "type": "array(varchar)"}
            ],
            "data": [[123, ["a", "b"]], [null, null]],
            "stats": {"state": "RUNNING", "totalSplits": 100},
            "updateType": "CREATE TABLE",
            "updateCount": 12
        });

        let results: QueryResults = serde_json::from_value(page).unwrap();
        assert_eq!(results.id, "20160128_214710_00012_rk68b");
        assert!(results.partial_cancel_uri.is_some());
        assert!(results.next_uri.is_some());
        assert_eq!(results.stats.state, "RUNNING");
        assert_eq!(results.stats.total_splits, 100);
        assert_eq!(results.update_type.as_deref(), Some("CREATE TABLE"));
        assert_eq!(results.update_count, Some(12));

        let columns = results.columns.as_ref().unwrap();
        assert_eq!(columns[1].type_name, "array(varchar)");
        assert_eq!(columns[1].type_signature.base(), "array");

        let data = results.data.as_ref().unwrap();
        assert_eq!(data[0][0], Value::BigInt(123));
        assert_eq!(
            data[0][1],
            Value::Array(vec![
                Value::String("a".to_string()),
                Value::String("b".to_string())
            ])
        );
        assert_eq!(data[1], vec![Value::Null, Value::Null]);
    }

    #[test]
    fn terminal_page_has_no_data_or_next_uri() {
        let page = json!({
            "id": "q1",
            "infoUri": "http://localhost:8080/query.html?q1",
            "stats": {"state": "FINISHED"}
        });
        let results: QueryResults = serde_json::from_value(page).unwrap();
        assert!(results.next_uri.is_none());
        assert!(results.data.is_none());
        assert!(results.error.is_none());
        assert_eq!(results.stats.state, "FINISHED");
    }

    #[test]
    fn data_without_columns_is_rejected() {
        let page = json!({
            "id": "q1",
            "infoUri": "http://localhost:8080/q1",
            "data": [[1]],
            "stats": {"state": "RUNNING"}
        });
        assert!(serde_json::from_value::<QueryResults>(page).is_err());
    }

    #[test]
    fn row_column_size_mismatch_is_rejected() {
        let page = json!({
            "id": "q1",
            "infoUri": "http://localhost:8080/q1",
            "columns": [{"name": "_col0", "type": "bigint"}],
            "data": [[1, 2]],
            "stats": {"state": "RUNNING"}
        });
        assert!(serde_json::from_value::<QueryResults>(page).is_err());
    }

    #[test]
    fn unparseable_column_type_is_rejected() {
        let page = json!({
            "id": "q1",
            "infoUri": "http://localhost:8080/q1",
            "columns": [{"name": "_col0", "type": "array("}],
            "data": [[1]],
            "stats": {"state": "RUNNING"}
        });
        assert!(serde_json::from_value::<QueryResults>(page).is_err());
    }

    #[test]
    fn error_page_decodes_failure_details() {
        let page = json!({
            "id": "q1",
            "infoUri": "http://localhost:8080/q1",
            "stats": {"state": "FAILED"},
            "error": {
                "message": "line 1:1: Table nope does not exist",
                "errorCode": 46,
                "errorName": "TABLE_NOT_FOUND",
                "errorType": "USER_ERROR",
                "errorLocation": {"lineNumber": 1, "columnNumber": 1},
                "failureInfo": {
                    "type": "com.facebook.presto.sql.analyzer.SemanticException",
                    "message": "Table nope does not exist",
                    "suppressed": [],
                    "stack": ["frame one", "frame two"]
                }
            }
        });
        let results: QueryResults = serde_json::from_value(page).unwrap();
        let error = results.error.unwrap();
        assert_eq!(error.error_name.as_deref(), Some("TABLE_NOT_FOUND"));
        assert_eq!(error.error_location.unwrap().line_number, 1);
        assert_eq!(error.failure_info.unwrap().stack.len(), 2);
    }

    #[test]
    fn server_info_decodes() {
        let info = json!({
            "nodeVersion": {"version": "0.152"},
            "environment": "test",
            "coordinator": true,
            "uptime": "3d 2h"
        });
        let info: ServerInfo = serde_json::from_value(info).unwrap();
        assert_eq!(info.node_version.version, "0.152");
        assert!(info.coordinator);
    }
}
