use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::error::CalendarError;
use super::provider::{BatchSender, TokenProvider};
use super::types::{BatchRequest, BatchRequestBody, BatchResponseBody, ItemResult};

/// Microsoft Graph JSON batching client (`POST {graph}/$batch`).
///
/// A token is requested from the provider for every batch, so a long run
/// picks up refreshed tokens between batches.
pub struct GraphBatchClient {
    batch_url: String,
    token_provider: Arc<Mutex<dyn TokenProvider>>,
    http_client: Client,
}

impl GraphBatchClient {
    pub fn new(graph_base_url: &str, token_provider: Arc<Mutex<dyn TokenProvider>>) -> Self {
        Self {
            batch_url: format!("{}/$batch", graph_base_url.trim_end_matches('/')),
            token_provider,
            http_client: Client::new(),
        }
    }

    async fn bearer_token(&self) -> Result<String, CalendarError> {
        let mut provider = self.token_provider.lock().await;
        let token = provider.access_token().await?;
        Ok(token)
    }
}

#[async_trait]
impl BatchSender for GraphBatchClient {
    async fn send_batch(&self, requests: &[BatchRequest]) -> Result<Vec<ItemResult>, CalendarError> {
        let token = self.bearer_token().await?;

        let resp = self
            .http_client
            .post(&self.batch_url)
            .bearer_auth(&token)
            .json(&BatchRequestBody { requests })
            .send()
            .await
            .map_err(|e| CalendarError::NetworkError(format!("MS Graph batch request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(CalendarError::BatchRejected { status, body });
        }

        let batch_resp: BatchResponseBody = resp.json().await.map_err(|e| {
            CalendarError::DeserializationError(format!("failed to parse MS Graph batch response: {e}"))
        })?;

        debug!(
            requests = requests.len(),
            responses = batch_resp.responses.len(),
            "MS Graph batch completed"
        );

        Ok(order_by_request(requests, batch_resp.responses))
    }
}

/// Graph may answer batch items in any order; put them back in request order.
///
/// Responses whose id matches no request are dropped. Requests without a
/// response are left out, so callers count them as not created.
fn order_by_request(requests: &[BatchRequest], responses: Vec<ItemResult>) -> Vec<ItemResult> {
    let mut by_id: HashMap<String, ItemResult> = responses
        .into_iter()
        .map(|r| (r.id.clone(), r))
        .collect();

    let ordered: Vec<ItemResult> = requests
        .iter()
        .filter_map(|req| by_id.remove(&req.id))
        .collect();

    if ordered.len() != requests.len() {
        warn!(
            expected = requests.len(),
            received = ordered.len(),
            "MS Graph batch response is missing items"
        );
    }
    if !by_id.is_empty() {
        warn!(unknown = by_id.len(), "MS Graph batch response has unknown item ids");
    }

    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{payload::create_event, ReminderEvent, Slot};
    use chrono::{TimeZone, Utc};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct StaticToken(&'static str);

    #[async_trait]
    impl TokenProvider for StaticToken {
        async fn access_token(&mut self) -> Result<String, CalendarError> {
            Ok(self.0.to_string())
        }

        fn account_name(&self) -> &str {
            "static@test.com"
        }
    }

    struct SignedOut;

    #[async_trait]
    impl TokenProvider for SignedOut {
        async fn access_token(&mut self) -> Result<String, CalendarError> {
            Err(CalendarError::NotAuthenticated)
        }

        fn account_name(&self) -> &str {
            "Microsoft Account"
        }
    }

    fn event(hour: u32) -> ReminderEvent {
        let start = Utc.with_ymd_and_hms(2026, 2, 19, hour, 0, 0).unwrap();
        create_event("Napa", &start, "UTC", Slot::Morning)
    }

    fn requests(n: usize) -> Vec<BatchRequest> {
        (1..=n)
            .map(|i| BatchRequest::create_event(i.to_string(), event(9)))
            .collect()
    }

    fn client(server: &MockServer, provider: Arc<Mutex<dyn TokenProvider>>) -> GraphBatchClient {
        GraphBatchClient::new(&format!("{}/v1.0", server.uri()), provider)
    }

    #[test]
    fn batch_url_appends_endpoint() {
        let provider: Arc<Mutex<dyn TokenProvider>> = Arc::new(Mutex::new(StaticToken("t")));
        let client = GraphBatchClient::new("https://graph.microsoft.com/v1.0/", provider);
        assert_eq!(client.batch_url, "https://graph.microsoft.com/v1.0/$batch");
    }

    #[tokio::test]
    async fn posts_batch_with_bearer_token_and_reorders_responses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1.0/$batch"))
            .and(header("Authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "responses": [
                    { "id": "3", "status": 201, "body": { "id": "evt-3" } },
                    { "id": "1", "status": 201, "body": { "id": "evt-1" } },
                    { "id": "2", "status": 400, "body": { "error": { "code": "ErrorInvalidRequest" } } }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server, Arc::new(Mutex::new(StaticToken("test-token"))));
        let results = client.send_batch(&requests(3)).await.unwrap();

        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert_eq!(results[1].status, 400);
    }

    #[tokio::test]
    async fn sends_requests_array_in_graph_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1.0/$batch"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "responses": [{ "id": "1", "status": 201 }]
            })))
            .mount(&server)
            .await;

        let client = client(&server, Arc::new(Mutex::new(StaticToken("t"))));
        client.send_batch(&requests(1)).await.unwrap();

        let received = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
        let first = &body["requests"][0];
        assert_eq!(first["id"], "1");
        assert_eq!(first["method"], "POST");
        assert_eq!(first["url"], "/me/calendar/events");
        assert_eq!(first["body"]["reminderMinutesBeforeStart"], 15);
    }

    #[tokio::test]
    async fn http_error_fails_whole_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1.0/$batch"))
            .respond_with(ResponseTemplate::new(401).set_body_string("InvalidAuthenticationToken"))
            .mount(&server)
            .await;

        let client = client(&server, Arc::new(Mutex::new(StaticToken("expired"))));
        let err = client.send_batch(&requests(2)).await.unwrap_err();

        match err {
            CalendarError::BatchRejected { status, body } => {
                assert_eq!(status, 401);
                assert!(body.contains("InvalidAuthenticationToken"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unparseable_body_fails_whole_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1.0/$batch"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let client = client(&server, Arc::new(Mutex::new(StaticToken("t"))));
        let err = client.send_batch(&requests(1)).await.unwrap_err();
        assert!(matches!(err, CalendarError::DeserializationError(_)));
    }

    #[tokio::test]
    async fn missing_token_fails_before_any_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = client(&server, Arc::new(Mutex::new(SignedOut)));
        let err = client.send_batch(&requests(1)).await.unwrap_err();
        assert!(matches!(err, CalendarError::NotAuthenticated));
    }

    #[test]
    fn order_by_request_drops_unknown_and_missing_items() {
        let responses = vec![
            ItemResult::new("9", 201),
            ItemResult::new("2", 201),
        ];
        let ordered = order_by_request(&requests(2), responses);
        assert_eq!(ordered, vec![ItemResult::new("2", 201)]);
    }
}
