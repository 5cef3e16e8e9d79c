use std::fmt;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::bulk::{BulkRequest, BulkResult};
use crate::query::Query;
use crate::{Error, Result};

const NDJSON: &str = "application/x-ndjson";
const DEFAULT_URL: &str = "http://localhost:9200";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, PartialEq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"*****")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchClientConfig {
    pub url: String,
    pub auth: Option<BasicAuth>,
    pub timeout: Duration,
}

impl Default for SearchClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            auth: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Outcome of a call that reached the engine. Transport failures are reported as [Error] instead,
/// so a non-2xx status shows up here with the raw body in `error_message`.
#[derive(Debug, Clone, PartialEq)]
pub struct Response<T> {
    pub url: String,
    pub status: u16,
    pub error_message: Option<String>,
    pub result: Option<T>,
}

impl<T> Response<T> {
    pub fn is_error(&self) -> bool {
        self.status > 299
    }

    /// Unwraps the decoded body, turning an error status into [Error::UnexpectedStatus].
    pub fn into_result(self) -> Result<T> {
        if self.is_error() {
            return Err(Error::UnexpectedStatus {
                url: self.url,
                status: self.status,
                body: self.error_message.unwrap_or_default(),
            });
        }
        self.result.ok_or_else(|| Error::Decode(format!("empty response body from {}", self.url)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CountResponse {
    pub count: u64,
}

#[derive(Serialize)]
struct CountRequest<'a> {
    query: &'a Query,
}

#[derive(Debug, Clone)]
pub struct SearchClient {
    client: reqwest::Client,
    base_url: String,
    auth: Option<BasicAuth>,
}

impl SearchClient {
    pub fn new(config: SearchClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            auth: config.auth,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Cluster info from the root endpoint. Used as a liveness check at startup.
    pub async fn ping(&self) -> Result<Response<Value>> {
        let url = format!("{}/", self.base_url);
        self.send(self.request(Method::GET, &url), url).await
    }

    pub async fn bulk(&self, index: &str, request: &BulkRequest) -> Result<Response<BulkResult>> {
        if request.is_empty() {
            return Err(Error::InvalidRequest(
                "bulk request has no operations".to_string(),
            ));
        }
        let url = format!("{}/{index}/_bulk", self.base_url);
        let body = request.to_ndjson()?;
        debug!(index, operations = request.len(), "Sending bulk request");

        let builder = self
            .request(Method::POST, &url)
            .header(CONTENT_TYPE, NDJSON)
            .body(body);
        self.send(builder, url).await
    }

    pub async fn count(&self, index: &str, query: &Query) -> Result<Response<CountResponse>> {
        let url = format!("{}/{index}/_count", self.base_url);
        let builder = self
            .request(Method::POST, &url)
            .json(&CountRequest { query });
        self.send(builder, url).await
    }

    pub async fn index_exists(&self, index: &str) -> Result<bool> {
        let url = format!("{}/{index}", self.base_url);
        let resp = self
            .request(Method::HEAD, &url)
            .send()
            .await
            .map_err(|e| Error::Request {
                url: url.clone(),
                error: e.to_string(),
            })?;

        match resp.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(Error::UnexpectedStatus {
                url,
                status: status.as_u16(),
                body: String::new(),
            }),
        }
    }

    /// Creates `index`, optionally with a settings/mappings body.
    pub async fn create_index(
        &self,
        index: &str,
        settings: Option<&Value>,
    ) -> Result<Response<Value>> {
        let url = format!("{}/{index}", self.base_url);
        let mut builder = self.request(Method::PUT, &url);
        if let Some(settings) = settings {
            builder = builder.json(settings);
        }
        self.send(builder, url).await
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.auth {
            Some(auth) => builder.basic_auth(&auth.username, Some(&auth.password)),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        url: String,
    ) -> Result<Response<T>> {
        let resp = builder.send().await.map_err(|e| Error::Request {
            url: url.clone(),
            error: e.to_string(),
        })?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(|e| Error::Request {
            url: url.clone(),
            error: e.to_string(),
        })?;

        if status > 299 {
            return Ok(Response {
                url,
                status,
                error_message: Some(body),
                result: None,
            });
        }

        let result = if body.trim().is_empty() {
            None
        } else {
            Some(serde_json::from_str(&body).map_err(|e| Error::Decode(e.to_string()))?)
        };
        Ok(Response {
            url,
            status,
            error_message: None,
            result,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk::BulkOperation;
    use axum::Json;
    use axum::Router;
    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::routing::{get, head, post};
    use serde_json::json;

    const GOOD_AUTH: &str = "Basic ZWxhc3RpYzpjaGFuZ2VtZQ==";

    async fn root(headers: HeaderMap) -> (AxumStatus, Json<Value>) {
        match headers.get("authorization").and_then(|v| v.to_str().ok()) {
            Some(value) if value != GOOD_AUTH => {
                (AxumStatus::UNAUTHORIZED, Json(json!({"error": "unauthorized"})))
            }
            _ => (AxumStatus::OK, Json(json!({"cluster_name": "mock"}))),
        }
    }

    async fn index_head(Path(index): Path<String>) -> AxumStatus {
        if index == "item_index_en" {
            AxumStatus::OK
        } else {
            AxumStatus::NOT_FOUND
        }
    }

    async fn index_put(Path(index): Path<String>, body: String) -> (AxumStatus, Json<Value>) {
        if index == "item_index_en" {
            return (
                AxumStatus::BAD_REQUEST,
                Json(json!({"error": {"type": "resource_already_exists_exception"}})),
            );
        }
        let has_settings = !body.is_empty();
        (
            AxumStatus::OK,
            Json(json!({"acknowledged": true, "index": index, "with_settings": has_settings})),
        )
    }

    // Index operations whose document carries `"title": "bad"` fail with 400.
    async fn bulk(
        Path(index): Path<String>,
        headers: HeaderMap,
        body: String,
    ) -> (AxumStatus, Json<Value>) {
        if headers.get("content-type").and_then(|v| v.to_str().ok()) != Some(NDJSON) {
            return (AxumStatus::BAD_REQUEST, Json(json!({"error": "content type"})));
        }

        let mut lines = body.lines();
        let mut items = Vec::new();
        let mut errors = false;
        while let Some(line) = lines.next() {
            let action: Value = serde_json::from_str(line).unwrap();
            if let Some(meta) = action.get("index") {
                let doc: Value = serde_json::from_str(lines.next().unwrap()).unwrap();
                let id = meta["_id"].clone();
                if doc["title"] == "bad" {
                    errors = true;
                    items.push(json!({"index": {"_index": index, "_id": id, "status": 400,
                        "error": {"type": "mapper_parsing_exception", "reason": "bad title"}}}));
                } else {
                    items.push(json!({"index": {"_index": index, "_id": id, "status": 201,
                        "result": "created"}}));
                }
            } else if let Some(meta) = action.get("delete") {
                items.push(json!({"delete": {"_index": index, "_id": meta["_id"], "status": 200,
                    "result": "deleted"}}));
            }
        }
        (
            AxumStatus::OK,
            Json(json!({"took": 1, "errors": errors, "items": items})),
        )
    }

    // Every should-term whose value does not start with "missing" counts as a hit.
    async fn count(Json(body): Json<Value>) -> Json<Value> {
        let hits = body["query"]["bool"]["should"]
            .as_array()
            .map(|terms| {
                terms
                    .iter()
                    .filter(|t| {
                        !t["term"]["_id"]["value"]
                            .as_str()
                            .unwrap_or_default()
                            .starts_with("missing")
                    })
                    .count()
            })
            .unwrap_or_default();
        Json(json!({"count": hits, "_shards": {"total": 1}}))
    }

    async fn start_mock_engine() -> String {
        let app = Router::new()
            .route("/", get(root))
            .route("/{index}", head(index_head).put(index_put))
            .route("/{index}/_bulk", post(bulk))
            .route("/{index}/_count", post(count));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client(url: String, auth: Option<BasicAuth>) -> SearchClient {
        SearchClient::new(SearchClientConfig {
            url,
            auth,
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_bulk_partial_failure() {
        let client = client(start_mock_engine().await, None);

        let request: BulkRequest = vec![
            BulkOperation::index("sku-1", &json!({"title": "shoe"})).unwrap(),
            BulkOperation::index("sku-2", &json!({"title": "bad"})).unwrap(),
            BulkOperation::delete("sku-3"),
        ]
        .into();

        let resp = client.bulk("item_index_en", &request).await.unwrap();
        assert!(!resp.is_error());
        let result = resp.into_result().unwrap();
        assert!(result.errors);
        assert_eq!(result.items.len(), 3);
        assert_eq!(result.succeeded().len(), 2);
        assert_eq!(result.failed()[0].id, "sku-2");
        assert_eq!(result.deleted()[0].index, "item_index_en");
    }

    #[tokio::test]
    async fn test_empty_bulk_rejected() {
        let client = client(start_mock_engine().await, None);
        let err = client
            .bulk("item_index_en", &BulkRequest::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_count() {
        let client = client(start_mock_engine().await, None);
        let query: Query = Query::bool()
            .should(
                ["sku-1", "sku-2", "missing-1"]
                    .into_iter()
                    .map(|id| Query::term("_id", id)),
            )
            .into();

        let resp = client.count("item_index_en", &query).await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.into_result().unwrap().count, 2);
    }

    #[tokio::test]
    async fn test_index_provisioning() {
        let client = client(start_mock_engine().await, None);

        assert!(client.index_exists("item_index_en").await.unwrap());
        assert!(!client.index_exists("item_index_ja").await.unwrap());

        let settings = json!({"settings": {"number_of_shards": 1}});
        let created = client
            .create_index("item_index_ja", Some(&settings))
            .await
            .unwrap()
            .into_result()
            .unwrap();
        assert_eq!(created["acknowledged"], true);
        assert_eq!(created["with_settings"], true);

        let exists = client.create_index("item_index_en", None).await.unwrap();
        assert!(exists.is_error());
        assert_eq!(exists.status, 400);
        assert!(
            exists
                .error_message
                .as_deref()
                .unwrap()
                .contains("resource_already_exists_exception")
        );
        assert!(matches!(
            exists.into_result(),
            Err(Error::UnexpectedStatus { status: 400, .. })
        ));
    }

    #[tokio::test]
    async fn test_ping_with_basic_auth() {
        let url = start_mock_engine().await;

        let good = client(
            url.clone(),
            Some(BasicAuth {
                username: "elastic".to_string(),
                password: "changeme".to_string(),
            }),
        );
        let resp = good.ping().await.unwrap();
        assert_eq!(resp.result.unwrap()["cluster_name"], "mock");

        let bad = client(
            url,
            Some(BasicAuth {
                username: "elastic".to_string(),
                password: "wrong".to_string(),
            }),
        );
        let resp = bad.ping().await.unwrap();
        assert!(resp.is_error());
        assert_eq!(resp.status, 401);
    }

    #[test]
    fn test_auth_debug_masks_password() {
        let auth = BasicAuth {
            username: "elastic".to_string(),
            password: "changeme".to_string(),
        };
        let rendered = format!("{auth:?}");
        assert!(rendered.contains("elastic"));
        assert!(!rendered.contains("changeme"));
    }

    #[tokio::test]
    async fn test_unreachable_engine() {
        let client = client("http://127.0.0.1:1".to_string(), None);
        let err = client.ping().await.unwrap_err();
        assert!(matches!(err, Error::Request { .. }));
    }
}
