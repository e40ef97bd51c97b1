//! Embedding cache implementations.
//!
//! [`PrefixCache`] keys entries on the first N characters of the input so
//! key size stays bounded. Two inputs sharing that prefix share a vector;
//! this is accepted because the cache is an optimisation only.

use agentmem_core::EmbeddingCache;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Process-lifetime cache keyed on a fixed-length character prefix.
///
/// Once `max_entries` is reached new inputs are simply not cached. Nothing
/// is ever evicted.
pub struct PrefixCache {
    prefix_chars: usize,
    max_entries: usize,
    entries: Mutex<HashMap<String, Vec<f32>>>,
}

impl PrefixCache {
    pub fn new(prefix_chars: usize, max_entries: usize) -> Self {
        Self {
            prefix_chars: prefix_chars.max(1),
            max_entries,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn key(&self, text: &str) -> String {
        text.chars().take(self.prefix_chars).collect()
    }
}

impl EmbeddingCache for PrefixCache {
    fn get(&self, text: &str) -> Option<Vec<f32>> {
        let key = self.key(text);
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    fn put(&self, text: &str, embedding: Vec<f32>) {
        let key = self.key(text);
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.len() < self.max_entries || entries.contains_key(&key) {
            entries.insert(key, embedding);
        }
    }

    fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// A cache that never stores anything.
pub struct NoopCache;

impl EmbeddingCache for NoopCache {
    fn get(&self, _text: &str) -> Option<Vec<f32>> {
        None
    }

    fn put(&self, _text: &str, _embedding: Vec<f32>) {}

    fn len(&self) -> usize {
        0
    }
}
