//! Full-Text Index Manager
//!
//! Case-insensitive fuzzy token index over a declared set of node
//! properties. Indexes are built wholesale from gateway data and swapped in
//! atomically: readers always query a complete snapshot, never a half-built
//! index. The analyzer keeps every token (no stopwords) so all case
//! variants of a query produce identical ranked results.

mod query;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

use crate::error::{GatewayError, IndexError};
use crate::gateway::GraphGateway;

pub use query::{parse_expression, TermQuery};

/// One indexed node: its identifier, the concatenated indexed field text,
/// and the generation timestamp of the build that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullTextDocument {
    pub node_id: String,
    pub text: String,
    pub built_at: DateTime<Utc>,
    /// Analyzer output in original token order, for phrase matching.
    tokens: Vec<String>,
}

impl FullTextDocument {
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }
}

/// A ranked index hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub node_id: String,
    pub score: f64,
}

/// Immutable, fully-built index generation.
#[derive(Debug)]
pub struct SearchIndex {
    pub name: String,
    pub label: String,
    pub fields: Vec<String>,
    pub built_at: DateTime<Utc>,
    /// token -> node id -> term frequency
    postings: HashMap<String, HashMap<String, u32>>,
    docs: HashMap<String, FullTextDocument>,
}

impl SearchIndex {
    fn build(
        name: &str,
        label: &str,
        fields: &[String],
        sources: Vec<(String, String)>,
    ) -> Self {
        let built_at = Utc::now();
        let mut postings: HashMap<String, HashMap<String, u32>> = HashMap::new();
        let mut docs = HashMap::new();

        for (node_id, text) in sources {
            let tokens = tokenize(&text);
            for token in &tokens {
                *postings
                    .entry(token.clone())
                    .or_default()
                    .entry(node_id.clone())
                    .or_insert(0) += 1;
            }
            docs.insert(
                node_id.clone(),
                FullTextDocument {
                    node_id,
                    text,
                    built_at,
                    tokens,
                },
            );
        }

        Self {
            name: name.to_string(),
            label: label.to_string(),
            fields: fields.to_vec(),
            built_at,
            postings,
            docs,
        }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.docs.contains_key(node_id)
    }

    pub fn document(&self, node_id: &str) -> Option<&FullTextDocument> {
        self.docs.get(node_id)
    }

    /// Rank documents for a parsed search expression.
    ///
    /// Score is normalized term frequency summed over matched terms; fuzzy
    /// matches are down-weighted by edit distance. Ties break on node id so
    /// the ordering is fully deterministic.
    pub fn query(&self, expression: &str, top_k: usize) -> Vec<SearchHit> {
        let terms = parse_expression(expression);
        let mut scores: HashMap<&str, f64> = HashMap::new();

        for term in &terms {
            match term {
                TermQuery::Phrase(phrase_tokens) => {
                    for doc in self.docs.values() {
                        let occurrences = count_phrase(&doc.tokens, phrase_tokens);
                        if occurrences > 0 {
                            *scores.entry(doc.node_id.as_str()).or_default() +=
                                occurrences as f64 / doc.tokens.len().max(1) as f64;
                        }
                    }
                }
                _ => {
                    for (token, postings) in &self.postings {
                        let Some(weight) = term.match_weight(token) else {
                            continue;
                        };
                        for (node_id, tf) in postings {
                            let doc_len = self
                                .docs
                                .get(node_id)
                                .map(|d| d.tokens.len().max(1))
                                .unwrap_or(1);
                            *scores.entry(node_id.as_str()).or_default() +=
                                weight * *tf as f64 / doc_len as f64;
                        }
                    }
                }
            }
        }

        let mut hits: Vec<SearchHit> = scores
            .into_iter()
            .map(|(node_id, score)| SearchHit {
                node_id: node_id.to_string(),
                score,
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.node_id.cmp(&b.node_id))
        });
        hits.truncate(top_k);
        hits
    }
}

/// Case-fold and split on non-alphanumeric boundaries. Every token is kept.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn count_phrase(doc_tokens: &[String], phrase: &[String]) -> usize {
    if phrase.is_empty() || doc_tokens.len() < phrase.len() {
        return 0;
    }
    doc_tokens
        .windows(phrase.len())
        .filter(|window| window.iter().zip(phrase).all(|(a, b)| a == b))
        .count()
}

/// Query template for fetching index documents; shared with test doubles so
/// both sides agree on the exact statement text.
pub fn document_fetch_query(label: &str, fields: &[String]) -> String {
    let projections = fields
        .iter()
        .enumerate()
        .map(|(i, field)| format!("n.`{field}` AS field_{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("MATCH (n:`{label}`) RETURN elementId(n) AS node_id, {projections}")
}

/// Owns every built index generation and serves atomic snapshots.
///
/// Shared across sessions; rebuilds never block or corrupt concurrent
/// queries because readers operate on an `Arc` snapshot taken under a
/// short-lived read lock.
#[derive(Default)]
pub struct IndexManager {
    indexes: RwLock<HashMap<String, Arc<SearchIndex>>>,
}

impl IndexManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build (or rebuild) an index over the declared fields of a label.
    ///
    /// Idempotent: identical parameters over identical data produce an index
    /// with identical query semantics. The swap is atomic from the reader's
    /// point of view.
    pub async fn build(
        &self,
        gateway: &dyn GraphGateway,
        name: &str,
        label: &str,
        fields: &[String],
    ) -> Result<usize, IndexError> {
        let query = document_fetch_query(label, fields);
        let records = gateway
            .execute(&query, serde_json::json!({}))
            .await
            .map_err(|e: GatewayError| IndexError::Build {
                name: name.to_string(),
                message: e.to_string(),
            })?;

        let mut sources = Vec::with_capacity(records.len());
        for record in &records {
            let Some(node_id) = record.get_str("node_id") else {
                continue;
            };
            let text = (0..fields.len())
                .filter_map(|i| record.get_str(&format!("field_{i}")))
                .collect::<Vec<_>>()
                .join(" ");
            sources.push((node_id.to_string(), text));
        }

        let index = SearchIndex::build(name, label, fields, sources);
        let documents = index.len();
        debug!(name, label, documents, "built full-text index generation");

        let mut guard = self
            .indexes
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.insert(name.to_string(), Arc::new(index));
        drop(guard);

        info!(name, documents, "full-text index ready");
        Ok(documents)
    }

    /// Take a consistent snapshot of a built index.
    pub fn snapshot(&self, name: &str) -> Result<Arc<SearchIndex>, IndexError> {
        self.indexes
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| IndexError::NotFound(name.to_string()))
    }

    pub fn is_ready(&self, name: &str) -> bool {
        self.snapshot(name).is_ok()
    }

    /// Query a built index; fails with `IndexError::NotFound` before the
    /// first successful build. Never falls back to an unscored scan.
    pub fn query(
        &self,
        name: &str,
        expression: &str,
        top_k: usize,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let snapshot = self.snapshot(name)?;
        Ok(snapshot.query(expression, top_k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> SearchIndex {
        SearchIndex::build(
            "supply_names",
            "Entity",
            &["name".to_string()],
            vec![
                ("n1".to_string(), "Dilip Chemicals Pvt Ltd".to_string()),
                ("n2".to_string(), "Dilip Distribution GmbH".to_string()),
                ("n3".to_string(), "Sunrise Pharma".to_string()),
                ("n4".to_string(), "Paracetamol API".to_string()),
            ],
        )
    }

    #[test]
    fn tokenizer_case_folds_and_splits() {
        assert_eq!(
            tokenize("Dilip-Chemicals (Pvt) LTD"),
            vec!["dilip", "chemicals", "pvt", "ltd"]
        );
    }

    #[test]
    fn prefix_query_is_case_invariant() {
        let index = sample_index();
        let lower = index.query("dilip*", 10);
        let title = index.query("Dilip*", 10);
        let upper = index.query("DILIP*", 10);
        assert_eq!(lower, title);
        assert_eq!(title, upper);
        let ids: Vec<&str> = lower.iter().map(|h| h.node_id.as_str()).collect();
        assert_eq!(ids, vec!["n1", "n2"]);
    }

    #[test]
    fn fuzzy_query_tolerates_typos() {
        let index = sample_index();
        let hits = index.query("dillip~", 10);
        assert!(hits.iter().any(|h| h.node_id == "n1"));
        assert!(hits.iter().any(|h| h.node_id == "n2"));
        assert!(!hits.iter().any(|h| h.node_id == "n3"));
    }

    #[test]
    fn phrase_query_preserves_token_order() {
        let index = sample_index();
        let hits = index.query("\"dilip chemicals\"", 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].node_id, "n1");
        assert!(index.query("\"chemicals dilip\"", 10).is_empty());
    }

    #[test]
    fn single_char_wildcard_matches_one_character() {
        let index = sample_index();
        let hits = index.query("?ilip", 10);
        let ids: Vec<&str> = hits.iter().map(|h| h.node_id.as_str()).collect();
        assert_eq!(ids, vec!["n1", "n2"]);
        assert!(index.query("?dilip", 10).is_empty());
    }

    #[test]
    fn query_before_build_is_an_error() {
        let manager = IndexManager::new();
        let result = manager.query("supply_names", "dilip*", 5);
        assert!(matches!(result, Err(IndexError::NotFound(_))));
    }
}
