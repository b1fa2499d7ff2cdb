use super::client::{IndexClient, Namespace};
use super::tokenizer::{normalize_prefix, tokenize_query, tokenize_text};
use crate::catalog::types::RecordId;
use crate::error::IndexError;

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Default)]
struct BucketIndex {
    objects: HashMap<String, IndexedObject>,
    /// term -> object ids holding it
    postings: HashMap<String, HashSet<String>>,
}

struct IndexedObject {
    terms: HashSet<String>,
    /// First-ingest order, breaks relevance ties.
    seq: u64,
}

/// In-process full-text engine.
///
/// Used when no external engine is configured and as the reference engine in tests.
/// Relevance is the number of distinct query terms an object matches.
pub struct MemoryIndex {
    buckets: DashMap<(String, String), BucketIndex>,
    sequence: AtomicU64,
    closed: AtomicBool,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
            sequence: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Number of objects currently indexed in the namespace.
    pub fn object_count(&self, ns: &Namespace) -> usize {
        self.buckets
            .get(&bucket_key(ns))
            .map(|bucket| bucket.objects.len())
            .unwrap_or(0)
    }

    fn ensure_open(&self) -> Result<(), IndexError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(IndexError::Unavailable("index client closed".to_string()));
        }
        Ok(())
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn bucket_key(ns: &Namespace) -> (String, String) {
    (ns.collection.clone(), ns.bucket.clone())
}

#[async_trait]
impl IndexClient for MemoryIndex {
    async fn ingest(&self, ns: &Namespace, id: &RecordId, text: &str) -> Result<(), IndexError> {
        self.ensure_open()?;
        let terms = tokenize_text(text);

        let mut bucket = self.buckets.entry(bucket_key(ns)).or_default();
        for term in &terms {
            bucket
                .postings
                .entry(term.clone())
                .or_default()
                .insert(id.0.clone());
        }
        let object = bucket
            .objects
            .entry(id.0.clone())
            .or_insert_with(|| IndexedObject {
                terms: HashSet::new(),
                seq: self.sequence.fetch_add(1, Ordering::SeqCst),
            });
        object.terms.extend(terms);
        Ok(())
    }

    async fn query(
        &self,
        ns: &Namespace,
        text: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<RecordId>, IndexError> {
        self.ensure_open()?;
        let Some(bucket) = self.buckets.get(&bucket_key(ns)) else {
            return Ok(Vec::new());
        };

        let mut query_terms = tokenize_query(text);
        query_terms.sort();
        query_terms.dedup();

        let mut scores: HashMap<&str, usize> = HashMap::new();
        for term in &query_terms {
            if let Some(ids) = bucket.postings.get(term) {
                for id in ids {
                    *scores.entry(id.as_str()).or_insert(0) += 1;
                }
            }
        }

        let mut ranked: Vec<(&str, usize, u64)> = scores
            .into_iter()
            .map(|(id, score)| {
                let seq = bucket.objects.get(id).map(|o| o.seq).unwrap_or(u64::MAX);
                (id, score, seq)
            })
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

        Ok(ranked
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(id, _, _)| RecordId::from(id))
            .collect())
    }

    async fn suggest(
        &self,
        ns: &Namespace,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<String>, IndexError> {
        self.ensure_open()?;
        let prefix = normalize_prefix(prefix);
        let Some(bucket) = self.buckets.get(&bucket_key(ns)) else {
            return Ok(Vec::new());
        };

        let mut words: Vec<String> = bucket
            .postings
            .keys()
            .filter(|term| term.starts_with(&prefix))
            .cloned()
            .collect();
        words.sort();
        words.truncate(limit);
        Ok(words)
    }

    async fn count(&self, ns: &Namespace, id: &RecordId) -> Result<u64, IndexError> {
        self.ensure_open()?;
        Ok(self
            .buckets
            .get(&bucket_key(ns))
            .and_then(|bucket| bucket.objects.get(&id.0).map(|o| o.terms.len() as u64))
            .unwrap_or(0))
    }

    async fn remove(&self, ns: &Namespace, id: &RecordId) -> Result<(), IndexError> {
        self.ensure_open()?;
        let Some(mut bucket) = self.buckets.get_mut(&bucket_key(ns)) else {
            return Err(IndexError::NotFound(id.0.clone()));
        };
        let Some(object) = bucket.objects.remove(&id.0) else {
            return Err(IndexError::NotFound(id.0.clone()));
        };

        for term in object.terms {
            if let Some(ids) = bucket.postings.get_mut(&term) {
                ids.remove(&id.0);
                if ids.is_empty() {
                    bucket.postings.remove(&term);
                }
            }
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), IndexError> {
        self.closed.store(true, Ordering::SeqCst);
        tracing::info!("In-memory index closed");
        Ok(())
    }
}
