use crate::error::SearchError;
use crate::models::QueryHit;
use crate::traits::VectorStore;

/// Runs a semantic query and converts each match's distance into a
/// relevance score. The store's own distance ordering is trusted as
/// the ranking; nothing is re-sorted here.
pub async fn search(
    store: &dyn VectorStore,
    query: &str,
    top_k: usize,
) -> Result<Vec<QueryHit>, SearchError> {
    if query.trim().is_empty() {
        return Err(SearchError::Request("query is empty".to_string()));
    }

    let matches = store.query(query, top_k).await?;

    Ok(matches
        .into_iter()
        .map(|found| QueryHit {
            relevance: 1.0 - found.distance,
            distance: found.distance,
            chunk: found.chunk,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PaperChunk;
    use crate::traits::StoreMatch;
    use async_trait::async_trait;

    struct FixedStore {
        matches: Vec<StoreMatch>,
    }

    #[async_trait]
    impl VectorStore for FixedStore {
        async fn add(&self, _chunks: &[PaperChunk]) -> Result<(), SearchError> {
            Ok(())
        }

        async fn query(&self, _text: &str, top_k: usize) -> Result<Vec<StoreMatch>, SearchError> {
            Ok(self.matches.iter().take(top_k).cloned().collect())
        }

        async fn count(&self) -> Result<u64, SearchError> {
            Ok(self.matches.len() as u64)
        }
    }

    fn stored(chunk_id: &str, distance: f64) -> StoreMatch {
        StoreMatch {
            chunk: PaperChunk {
                chunk_id: chunk_id.to_string(),
                source_document: "paper.pdf".to_string(),
                page_number: 1,
                chunk_index: 0,
                text: "body".to_string(),
            },
            distance,
        }
    }

    #[tokio::test]
    async fn relevance_is_one_minus_distance_unclamped() {
        let store = FixedStore {
            matches: vec![stored("a", 0.25), stored("b", 1.40)],
        };

        let hits = search(&store, "crosslinking", 5).await.unwrap();

        assert_eq!(hits.len(), 2);
        assert!((hits[0].relevance - 0.75).abs() < 1e-9);
        assert!(hits[1].relevance < 0.0, "large distances may go negative");
        assert_eq!(hits[0].chunk.chunk_id, "a");
    }

    #[tokio::test]
    async fn empty_store_returns_empty_results() {
        let store = FixedStore { matches: Vec::new() };
        let hits = search(&store, "anything", 5).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn small_corpus_returns_fewer_than_top_k() {
        let store = FixedStore {
            matches: vec![stored("a", 0.1)],
        };
        let hits = search(&store, "anything", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn blank_query_is_rejected() {
        let store = FixedStore { matches: Vec::new() };
        let result = search(&store, "   ", 5).await;
        assert!(matches!(result, Err(SearchError::Request(_))));
    }
}
