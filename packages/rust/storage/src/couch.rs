//! CouchDB-compatible HTTP document store.
//!
//! Documents live at `{endpoint}/{database}/{id}` with a `_rev` field.
//! A stale `_rev` is answered with 409, which maps to a sink conflict.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use flashnotes_shared::{Document, FlashnotesError, HttpConfig, Result, SinkConfig, parse_url};

use crate::{DocumentStore, Revision};

#[derive(Debug, Deserialize)]
struct WriteReply {
    rev: String,
}

pub struct CouchStore {
    client: Client,
    database_url: Url,
    username: Option<String>,
    password: Option<String>,
}

impl CouchStore {
    /// Build a client for `[sink]`. `password` is the resolved credential, if any.
    pub fn new(config: &SinkConfig, password: Option<String>, http: &HttpConfig) -> Result<Self> {
        let mut database_url = parse_url("sink.endpoint", &config.endpoint)?;
        database_url
            .path_segments_mut()
            .map_err(|_| FlashnotesError::config("sink.endpoint cannot be a base URL"))?
            .pop_if_empty()
            .push(&config.database);

        let client = Client::builder()
            .timeout(Duration::from_secs(http.timeout_secs))
            .build()
            .map_err(|e| FlashnotesError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            database_url,
            username: config.username.clone(),
            password,
        })
    }

    fn doc_url(&self, id: &str) -> Result<Url> {
        let mut url = self.database_url.clone();
        url.path_segments_mut()
            .map_err(|_| FlashnotesError::Storage("database URL cannot be a base".into()))?
            .push(id);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.username {
            Some(user) => request.basic_auth(user, self.password.as_deref()),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| FlashnotesError::SinkUnavailable(e.without_url().to_string()))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(FlashnotesError::SinkUnavailable(format!(
                    "document store rejected credentials (HTTP {})",
                    response.status()
                )))
            }
            _ => Ok(response),
        }
    }
}

async fn unexpected(response: Response) -> FlashnotesError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    FlashnotesError::Storage(format!(
        "document store returned HTTP {status}: {}",
        body.chars().take(200).collect::<String>()
    ))
}

#[async_trait]
impl DocumentStore for CouchStore {
    #[instrument(skip_all, fields(database = %self.database_url))]
    async fn ping(&self) -> Result<()> {
        let response = self
            .send(self.client.get(self.database_url.clone()))
            .await?;
        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(FlashnotesError::SinkUnavailable(format!(
                "database {} does not exist",
                self.database_url
            ))),
            s => Err(FlashnotesError::SinkUnavailable(format!(
                "document store returned HTTP {s}"
            ))),
        }
    }

    async fn get(&self, id: &str) -> Result<Option<(Document, Revision)>> {
        let response = self.send(self.client.get(self.doc_url(id)?)).await?;
        match response.status() {
            StatusCode::NOT_FOUND => return Ok(None),
            s if s.is_success() => {}
            _ => return Err(unexpected(response).await),
        }

        let mut body: Value = response
            .json()
            .await
            .map_err(|e| FlashnotesError::Storage(format!("document {id} is unreadable: {e}")))?;
        let rev = body
            .get("_rev")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| FlashnotesError::Storage(format!("document {id} has no _rev")))?;
        if let Some(fields) = body.as_object_mut() {
            fields.remove("_id");
            fields.remove("_rev");
        }
        let doc: Document = serde_json::from_value(body)
            .map_err(|e| FlashnotesError::Storage(format!("document {id} is unreadable: {e}")))?;
        Ok(Some((doc, rev)))
    }

    async fn put(&self, doc: &Document, rev: Option<&str>) -> Result<Revision> {
        let id = doc.id();
        let mut body =
            serde_json::to_value(doc).map_err(|e| FlashnotesError::Storage(e.to_string()))?;
        if let Some(fields) = body.as_object_mut() {
            fields.insert("_id".into(), Value::String(id.to_string()));
            if let Some(rev) = rev {
                fields.insert("_rev".into(), Value::String(rev.to_string()));
            }
        }

        let response = self
            .send(self.client.put(self.doc_url(id)?).json(&body))
            .await?;
        match response.status() {
            StatusCode::CONFLICT => {
                debug!(id, "revision mismatch");
                Err(FlashnotesError::SinkConflict { key: id.to_string() })
            }
            s if s.is_success() => {
                let reply: WriteReply = response
                    .json()
                    .await
                    .map_err(|e| FlashnotesError::Storage(format!("malformed write reply: {e}")))?;
                Ok(reply.rev)
            }
            _ => Err(unexpected(response).await),
        }
    }

    async fn delete(&self, id: &str, rev: &str) -> Result<()> {
        let request = self.client.delete(self.doc_url(id)?).query(&[("rev", rev)]);
        let response = self.send(request).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(()),
            StatusCode::CONFLICT => Err(FlashnotesError::SinkConflict { key: id.to_string() }),
            s if s.is_success() => Ok(()),
            _ => Err(unexpected(response).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flashnotes_shared::ContentLeaf;
    use wiremock::matchers::{body_partial_json, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_for(server: &MockServer, username: Option<&str>) -> CouchStore {
        let config = SinkConfig {
            endpoint: server.uri(),
            database: "notes".into(),
            username: username.map(str::to_string),
            ..SinkConfig::default()
        };
        CouchStore::new(&config, Some("pw".into()), &HttpConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn ping_checks_database() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/notes"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "db_name": "notes"
            })))
            .mount(&server)
            .await;

        store_for(&server, Some("admin")).ping().await.unwrap();
    }

    #[tokio::test]
    async fn rejected_credentials_are_unavailable() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/notes"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = store_for(&server, Some("admin")).ping().await.unwrap_err();
        assert!(matches!(err, FlashnotesError::SinkUnavailable(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn get_strips_couch_fields() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/notes/my%20title.md"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "_id": "my title.md",
                "_rev": "3-abc",
                "type": "markdown",
                "path": "my title.md",
                "children": ["leaf:1"],
                "ctime": 1_700_000_000_000_i64,
                "mtime": 1_700_000_100_000_i64,
                "size": 12
            })))
            .mount(&server)
            .await;

        let (doc, rev) = store_for(&server, None)
            .get("my title.md")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rev, "3-abc");
        match doc {
            Document::Markdown(entry) => {
                assert_eq!(entry.children, vec!["leaf:1"]);
                assert_eq!(entry.byte_size, 12);
            }
            other => panic!("expected entry, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_document_is_none() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/notes/absent.md"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": "not_found",
                "reason": "missing"
            })))
            .mount(&server)
            .await;

        assert!(store_for(&server, None).get("absent.md").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_sends_revision_and_returns_new_one() {
        let server = MockServer::start().await;
        let leaf = ContentLeaf::new("# Summary");

        Mock::given(method("PUT"))
            .and(path(format!("/notes/{}", leaf.leaf_id)))
            .and(body_partial_json(serde_json::json!({
                "_id": leaf.leaf_id,
                "_rev": "1-a",
                "type": "leaf",
                "data": "# Summary"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "ok": true,
                "id": leaf.leaf_id,
                "rev": "2-b"
            })))
            .mount(&server)
            .await;

        let rev = store_for(&server, None)
            .put(&Document::Leaf(leaf), Some("1-a"))
            .await
            .unwrap();
        assert_eq!(rev, "2-b");
    }

    #[tokio::test]
    async fn stale_revision_is_conflict() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/notes/a.md"))
            .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
                "error": "conflict",
                "reason": "Document update conflict."
            })))
            .mount(&server)
            .await;

        let doc = Document::Markdown(flashnotes_shared::IndexEntry::new("a.md", chrono::Utc::now()));
        let err = store_for(&server, None).put(&doc, Some("1-a")).await.unwrap_err();
        assert!(matches!(err, FlashnotesError::SinkConflict { .. }));
    }

    #[tokio::test]
    async fn delete_passes_revision() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/notes/leaf:1"))
            .and(query_param("rev", "2-b"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "id": "leaf:1",
                "rev": "3-c"
            })))
            .mount(&server)
            .await;

        store_for(&server, None).delete("leaf:1", "2-b").await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_server_is_unavailable() {
        let config = SinkConfig {
            endpoint: "http://127.0.0.1:9".into(),
            ..SinkConfig::default()
        };
        let store = CouchStore::new(&config, None, &HttpConfig { timeout_secs: 2 }).unwrap();
        let err = store.ping().await.unwrap_err();
        assert!(matches!(err, FlashnotesError::SinkUnavailable(_)));
    }
}
