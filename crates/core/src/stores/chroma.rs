use crate::error::SearchError;
use crate::models::PaperChunk;
use crate::traits::{StoreMatch, VectorStore};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::warn;
use url::Url;

const ADD_MAX_ATTEMPTS: usize = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

pub struct ChromaStore {
    endpoint: String,
    collection_id: String,
    client: Client,
}

impl ChromaStore {
    /// Resolves (get-or-create) the named collection and returns a
    /// client bound to it. The embedding model name is pinned in the
    /// collection metadata; connecting with a different model than the
    /// one the collection was built with is refused, since distances
    /// across embedding spaces are not comparable.
    pub async fn connect(
        endpoint: &str,
        collection: &str,
        embedding_model: &str,
        timeout: Duration,
    ) -> Result<Self, SearchError> {
        let parsed = Url::parse(endpoint)?;
        let endpoint = parsed.as_str().trim_end_matches('/').to_string();
        let client = Client::builder().timeout(timeout).build()?;

        let response = client
            .post(format!("{endpoint}/api/v1/collections"))
            .json(&json!({
                "name": collection,
                "metadata": { "embedding_model": embedding_model },
                "get_or_create": true,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "chroma".to_string(),
                details: response.status().to_string(),
            });
        }

        let payload: Value = response.json().await?;

        if let Some(existing) = payload
            .pointer("/metadata/embedding_model")
            .and_then(Value::as_str)
        {
            if existing != embedding_model {
                return Err(SearchError::Request(format!(
                    "collection '{collection}' was embedded with '{existing}' but '{embedding_model}' is configured"
                )));
            }
        }

        let collection_id = payload
            .pointer("/id")
            .and_then(Value::as_str)
            .ok_or_else(|| SearchError::BackendResponse {
                backend: "chroma".to_string(),
                details: "collection response missing id".to_string(),
            })?
            .to_string();

        Ok(Self {
            endpoint,
            collection_id,
            client,
        })
    }

    fn collection_url(&self, operation: &str) -> String {
        format!(
            "{}/api/v1/collections/{}/{operation}",
            self.endpoint, self.collection_id
        )
    }
}

#[async_trait]
impl VectorStore for ChromaStore {
    async fn add(&self, chunks: &[PaperChunk]) -> Result<(), SearchError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let ids: Vec<&str> = chunks.iter().map(|chunk| chunk.chunk_id.as_str()).collect();
        let documents: Vec<&str> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        let metadatas: Vec<Value> = chunks
            .iter()
            .map(|chunk| {
                json!({
                    "source": chunk.source_document,
                    "page": chunk.page_number,
                    "chunk": chunk.chunk_index,
                })
            })
            .collect();

        let body = json!({
            "ids": ids,
            "documents": documents,
            "metadatas": metadatas,
        });

        // Each batch commit retries transient failures on its own; the
        // caller decides what a persistently failing batch means.
        let mut attempt = 1;
        loop {
            let outcome = self
                .client
                .post(self.collection_url("upsert"))
                .json(&body)
                .send()
                .await;

            match outcome {
                Ok(response) if response.status().is_success() => return Ok(()),
                Ok(response) => {
                    let status = response.status();
                    let transient = status.as_u16() == 429 || status.is_server_error();
                    if !transient || attempt >= ADD_MAX_ATTEMPTS {
                        return Err(SearchError::BackendResponse {
                            backend: "chroma".to_string(),
                            details: status.to_string(),
                        });
                    }
                    warn!(attempt, status = %status, "retrying chroma upsert");
                }
                Err(error) => {
                    if attempt >= ADD_MAX_ATTEMPTS {
                        return Err(SearchError::Http(error));
                    }
                    warn!(attempt, error = %error, "retrying chroma upsert");
                }
            }

            tokio::time::sleep(RETRY_BACKOFF).await;
            attempt += 1;
        }
    }

    async fn query(&self, text: &str, top_k: usize) -> Result<Vec<StoreMatch>, SearchError> {
        let response = self
            .client
            .post(self.collection_url("query"))
            .json(&json!({
                "query_texts": [text],
                "n_results": top_k,
                "include": ["documents", "metadatas", "distances"],
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "chroma".to_string(),
                details: response.status().to_string(),
            });
        }

        let payload: Value = response.json().await?;
        parse_query_response(&payload)
    }

    async fn count(&self) -> Result<u64, SearchError> {
        let response = self.client.get(self.collection_url("count")).send().await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "chroma".to_string(),
                details: response.status().to_string(),
            });
        }

        let payload: Value = response.json().await?;
        payload
            .as_u64()
            .ok_or_else(|| SearchError::BackendResponse {
                backend: "chroma".to_string(),
                details: "count response was not an integer".to_string(),
            })
    }
}

/// Chroma answers queries as parallel per-field arrays, one inner array
/// per query text. This core always sends a single query, so only the
/// first inner array of each field is read.
fn parse_query_response(payload: &Value) -> Result<Vec<StoreMatch>, SearchError> {
    let ids = payload
        .pointer("/ids/0")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let documents = payload
        .pointer("/documents/0")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let metadatas = payload
        .pointer("/metadatas/0")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let distances = payload
        .pointer("/distances/0")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut matches = Vec::new();
    for (index, id) in ids.iter().enumerate() {
        let chunk_id = id.as_str().unwrap_or_default().to_string();
        let text = documents
            .get(index)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let metadata = metadatas.get(index).cloned().unwrap_or(Value::Null);
        let distance = distances
            .get(index)
            .and_then(Value::as_f64)
            .unwrap_or_default();

        matches.push(StoreMatch {
            chunk: PaperChunk {
                chunk_id,
                source_document: metadata
                    .pointer("/source")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                page_number: metadata
                    .pointer("/page")
                    .and_then(Value::as_u64)
                    .unwrap_or_default() as u32,
                chunk_index: metadata
                    .pointer("/chunk")
                    .and_then(Value::as_u64)
                    .unwrap_or_default() as u32,
                text,
            },
            distance,
        });
    }

    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn sample_chunk(index: u32) -> PaperChunk {
        PaperChunk {
            chunk_id: PaperChunk::derive_id("paper", 1, index),
            source_document: "paper.pdf".to_string(),
            page_number: 1,
            chunk_index: index,
            text: format!("chunk body {index}"),
        }
    }

    async fn connected_store(server: &MockServer) -> ChromaStore {
        let create = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v1/collections");
                then.status(200).json_body(serde_json::json!({
                    "id": "col-1",
                    "name": "scientific_papers",
                    "metadata": { "embedding_model": "text-embedding-3-small" },
                }));
            })
            .await;

        let store = ChromaStore::connect(
            &server.base_url(),
            "scientific_papers",
            "text-embedding-3-small",
            Duration::from_secs(5),
        )
        .await
        .expect("connect should succeed");

        create.assert_async().await;
        store
    }

    #[tokio::test]
    async fn connect_refuses_mismatched_embedding_model() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v1/collections");
                then.status(200).json_body(serde_json::json!({
                    "id": "col-1",
                    "name": "scientific_papers",
                    "metadata": { "embedding_model": "text-embedding-ada-002" },
                }));
            })
            .await;

        let result = ChromaStore::connect(
            &server.base_url(),
            "scientific_papers",
            "text-embedding-3-small",
            Duration::from_secs(5),
        )
        .await;

        assert!(matches!(result, Err(SearchError::Request(_))));
    }

    #[tokio::test]
    async fn add_upserts_parallel_arrays() {
        let server = MockServer::start_async().await;
        let store = connected_store(&server).await;

        let upsert = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/v1/collections/col-1/upsert")
                    .json_body_partial(
                        serde_json::json!({
                            "ids": ["paper_p1_c0", "paper_p1_c1"],
                        })
                        .to_string(),
                    );
                then.status(201).json_body(serde_json::json!(true));
            })
            .await;

        store
            .add(&[sample_chunk(0), sample_chunk(1)])
            .await
            .expect("upsert should succeed");

        upsert.assert_async().await;
    }

    #[tokio::test]
    async fn add_gives_up_after_bounded_retries() {
        let server = MockServer::start_async().await;
        let store = connected_store(&server).await;

        let upsert = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v1/collections/col-1/upsert");
                then.status(500);
            })
            .await;

        let result = store.add(&[sample_chunk(0)]).await;

        assert!(matches!(result, Err(SearchError::BackendResponse { .. })));
        upsert.assert_hits_async(3).await;
    }

    #[tokio::test]
    async fn add_does_not_retry_client_errors() {
        let server = MockServer::start_async().await;
        let store = connected_store(&server).await;

        let upsert = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v1/collections/col-1/upsert");
                then.status(422);
            })
            .await;

        let result = store.add(&[sample_chunk(0)]).await;

        assert!(result.is_err());
        upsert.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn query_unpacks_matches_in_store_order() {
        let server = MockServer::start_async().await;
        let store = connected_store(&server).await;

        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v1/collections/col-1/query");
                then.status(200).json_body(serde_json::json!({
                    "ids": [["paper_p1_c0", "other_p3_c2"]],
                    "documents": [["first body", "second body"]],
                    "metadatas": [[
                        { "source": "paper.pdf", "page": 1, "chunk": 0 },
                        { "source": "other.pdf", "page": 3, "chunk": 2 },
                    ]],
                    "distances": [[0.12, 0.48]],
                }));
            })
            .await;

        let matches = store.query("collagen", 5).await.expect("query should succeed");

        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].chunk.chunk_id, "paper_p1_c0");
        assert_eq!(matches[0].chunk.source_document, "paper.pdf");
        assert_eq!(matches[0].chunk.page_number, 1);
        assert!((matches[0].distance - 0.12).abs() < 1e-9);
        assert_eq!(matches[1].chunk.chunk_index, 2);
    }

    #[tokio::test]
    async fn query_against_empty_collection_returns_no_matches() {
        let server = MockServer::start_async().await;
        let store = connected_store(&server).await;

        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v1/collections/col-1/query");
                then.status(200).json_body(serde_json::json!({
                    "ids": [[]],
                    "documents": [[]],
                    "metadatas": [[]],
                    "distances": [[]],
                }));
            })
            .await;

        let matches = store.query("anything", 5).await.expect("query should succeed");
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn count_reads_bare_integer() {
        let server = MockServer::start_async().await;
        let store = connected_store(&server).await;

        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/collections/col-1/count");
                then.status(200).json_body(serde_json::json!(1284));
            })
            .await;

        assert_eq!(store.count().await.expect("count should succeed"), 1284);
    }
}
