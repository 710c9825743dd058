//! HTTP client for the spreadsheet endpoint.
//!
//! One URL serves every sheet. Requests carry `action` and `sheet` as query
//! parameters; reads are `GET`, mutations are `POST` with a JSON body.
//! Every response is an envelope: `{"success": bool, "data"?: .., "error"?: ".."}`.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::error::RemoteError;
use crate::model::{RemoteId, RemoteRecord, Sheet};
use crate::sync::remote::{RemoteResult, SheetsRemote};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Response envelope returned by every action.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Spreadsheet endpoint client.
#[derive(Debug, Clone)]
pub struct SheetsClient {
    client: reqwest::Client,
    endpoint: Option<String>,
    timeout: Duration,
}

impl SheetsClient {
    /// Create a client. With no endpoint every call fails as unreachable and
    /// `ping` reports offline.
    #[must_use]
    pub fn new(endpoint: Option<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.filter(|e| !e.trim().is_empty()),
            timeout,
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    fn url(&self) -> RemoteResult<&str> {
        self.endpoint
            .as_deref()
            .ok_or_else(|| RemoteError::Unreachable("endpoint not configured".to_string()))
    }

    async fn get(&self, action: &str, sheet: Sheet) -> RemoteResult<Option<Value>> {
        trace!(action, %sheet, "GET");
        let response = self
            .client
            .get(self.url()?)
            .query(&[("action", action), ("sheet", sheet.as_str())])
            .header("Accept", "application/json")
            .timeout(self.timeout)
            .send()
            .await?;
        read_envelope(response).await
    }

    async fn post(
        &self,
        action: &str,
        sheet: Sheet,
        body: &Map<String, Value>,
    ) -> RemoteResult<Option<Value>> {
        trace!(action, %sheet, "POST");
        let response = self
            .client
            .post(self.url()?)
            .query(&[("action", action), ("sheet", sheet.as_str())])
            .header("Accept", "application/json")
            .json(body)
            .timeout(self.timeout)
            .send()
            .await?;
        let data = read_envelope(response).await?;
        debug!(action, %sheet, "Remote request succeeded");
        Ok(data)
    }
}

async fn read_envelope(response: reqwest::Response) -> RemoteResult<Option<Value>> {
    let status = response.status();
    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(RemoteError::Unreachable(format!("HTTP {status}")));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RemoteError::Rejected(format!("HTTP {status}: {}", body.trim())));
    }

    let envelope: Envelope = response.json().await?;
    if envelope.success {
        Ok(envelope.data)
    } else {
        Err(RemoteError::Rejected(
            envelope
                .error
                .unwrap_or_else(|| "request failed".to_string()),
        ))
    }
}

fn with_id(id: &RemoteId, data: &Map<String, Value>) -> Map<String, Value> {
    let mut body = data.clone();
    body.insert("id".to_string(), Value::String(id.to_string()));
    body
}

impl SheetsRemote for SheetsClient {
    async fn ping(&self) -> bool {
        if self.endpoint.is_none() {
            return false;
        }
        match self.get("ping", Sheet::Dopamine).await {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "Ping failed");
                false
            }
        }
    }

    async fn try_get_all(&self, sheet: Sheet) -> RemoteResult<Vec<RemoteRecord>> {
        let rows = match self.get("getAll", sheet).await? {
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(Value::Array(rows)) => rows,
            Some(other) => {
                return Err(RemoteError::Rejected(format!(
                    "getAll returned non-array data: {other}"
                )));
            }
        };

        let total = rows.len();
        let records: Vec<RemoteRecord> = rows.into_iter().filter_map(RemoteRecord::from_value).collect();
        if records.len() < total {
            debug!(%sheet, skipped = total - records.len(), "Skipped rows without an id");
        }
        Ok(records)
    }

    async fn add(&self, sheet: Sheet, data: &Map<String, Value>) -> RemoteResult<RemoteId> {
        let returned = self.post("add", sheet, data).await?;
        let id = match &returned {
            Some(Value::Object(obj)) => obj.get("id").and_then(RemoteId::from_value),
            Some(value) => RemoteId::from_value(value),
            None => None,
        };
        id.ok_or_else(|| RemoteError::Rejected("add response carried no id".to_string()))
    }

    async fn update(
        &self,
        sheet: Sheet,
        id: &RemoteId,
        data: &Map<String, Value>,
    ) -> RemoteResult<()> {
        self.post("update", sheet, &with_id(id, data)).await?;
        Ok(())
    }

    async fn delete(&self, sheet: Sheet, id: &RemoteId) -> RemoteResult<()> {
        self.post("delete", sheet, &with_id(id, &Map::new())).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::{GET, POST};
    use httpmock::MockServer;
    use serde_json::json;

    fn client(server: &MockServer) -> SheetsClient {
        SheetsClient::new(Some(server.url("/exec")), Duration::from_secs(5))
    }

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_ping() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/exec")
                    .query_param("action", "ping")
                    .query_param("sheet", "Dopamine");
                then.status(200).json_body(json!({"success": true}));
            })
            .await;

        assert!(client(&server).ping().await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_ping_without_endpoint() {
        let client = SheetsClient::new(None, DEFAULT_TIMEOUT);
        assert!(!client.ping().await);
        let err = client.try_get_all(Sheet::Mood).await.unwrap_err();
        assert_eq!(err, RemoteError::Unreachable("endpoint not configured".to_string()));
    }

    #[tokio::test]
    async fn test_get_all_parses_rows() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/exec")
                    .query_param("action", "getAll")
                    .query_param("sheet", "Mood");
                then.status(200).json_body(json!({
                    "success": true,
                    "data": [
                        {"id": 1, "date": "2024-01-01", "mood": 4, "energy": 3, "numb": 2},
                        {"id": "2", "date": "2024-01-02", "mood": 2, "energy": 2, "numb": 4},
                        {"date": "2024-01-03"}
                    ]
                }));
            })
            .await;

        let rows = client(&server).try_get_all(Sheet::Mood).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id.as_str(), "1");
        assert_eq!(rows[1].fields["mood"], 2);
        assert!(rows[0].fields.get("id").is_none());
    }

    #[tokio::test]
    async fn test_get_all_fails_soft() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/exec");
                then.status(503);
            })
            .await;

        let client = client(&server);
        let err = client.try_get_all(Sheet::Dopamine).await.unwrap_err();
        assert!(matches!(err, RemoteError::Unreachable(_)));
        assert!(client.get_all(Sheet::Dopamine).await.is_empty());
    }

    #[tokio::test]
    async fn test_add_returns_remote_id() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/exec")
                    .query_param("action", "add")
                    .query_param("sheet", "Mood")
                    .json_body_partial(r#"{"date": "2024-01-01", "mood": 4}"#);
                then.status(200)
                    .json_body(json!({"success": true, "data": {"id": 17}}));
            })
            .await;

        let id = client(&server)
            .add(Sheet::Mood, &fields(json!({"date": "2024-01-01", "mood": 4})))
            .await
            .unwrap();
        assert_eq!(id.as_str(), "17");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_update_and_delete_send_id() {
        let server = MockServer::start_async().await;
        let update = server
            .mock_async(|when, then| {
                when.method(POST)
                    .query_param("action", "update")
                    .json_body_partial(r#"{"id": "9", "mood": 1}"#);
                then.status(200).json_body(json!({"success": true}));
            })
            .await;
        let delete = server
            .mock_async(|when, then| {
                when.method(POST)
                    .query_param("action", "delete")
                    .query_param("sheet", "HygieneHabits")
                    .json_body(json!({"id": "9"}));
                then.status(200).json_body(json!({"success": true}));
            })
            .await;

        let client = client(&server);
        let id = RemoteId::new("9");
        client
            .update(Sheet::Mood, &id, &fields(json!({"mood": 1})))
            .await
            .unwrap();
        client.delete(Sheet::HygieneHabits, &id).await.unwrap();

        update.assert_async().await;
        delete.assert_async().await;
    }

    #[tokio::test]
    async fn test_unsuccessful_envelope_is_rejected() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).query_param("action", "add");
                then.status(200)
                    .json_body(json!({"success": false, "error": "Sheet not found"}));
            })
            .await;

        let err = client(&server)
            .add(Sheet::Mood, &Map::new())
            .await
            .unwrap_err();
        assert_eq!(err, RemoteError::Rejected("Sheet not found".to_string()));
        assert!(err.is_user_visible());
    }

    #[tokio::test]
    async fn test_malformed_body_is_rejected() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200).body("<html>not json</html>");
            })
            .await;

        let err = client(&server)
            .update(Sheet::Mood, &RemoteId::new("1"), &Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_client_error_status_is_rejected() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(404).body("no such deployment");
            })
            .await;

        let err = client(&server)
            .delete(Sheet::Mood, &RemoteId::new("1"))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Rejected(ref m) if m.contains("404")));
    }

    #[tokio::test]
    async fn test_timeout() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET);
                then.status(200)
                    .delay(Duration::from_millis(500))
                    .json_body(json!({"success": true, "data": []}));
            })
            .await;

        let client = SheetsClient::new(Some(server.url("/exec")), Duration::from_millis(50));
        let err = client.try_get_all(Sheet::Mood).await.unwrap_err();
        assert_eq!(err, RemoteError::Timeout);
    }
}
